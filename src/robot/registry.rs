// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the registry mapping configuration type tags to driver builders.
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::config::{RobotConfig, RobotVariant, TaggedRobotConfig};
use crate::exception::{create_configuration_exception, BestmanException, BestmanResult};
use crate::robot::Robot;

/// Constructs a disconnected driver from a validated configuration.
pub type RobotBuilder = Box<dyn Fn(RobotConfig) -> BestmanResult<Box<dyn Robot>> + Send + Sync>;

struct Registration {
    variant: RobotVariant,
    builder: RobotBuilder,
}

/// Dispatch table from type tag to driver family.
///
/// The registry is an explicit value: build it once at startup, register the driver families
/// you need and share it by reference afterwards. Lookups only need `&self`.
///
/// ```no_run
/// # use bestman::{RobotRegistry, XArmSdk, SdkResult, VendorParameters};
/// # fn open_xarm(parameters: &VendorParameters) -> SdkResult<Box<dyn XArmSdk>> { unimplemented!() }
/// # fn main() -> bestman::BestmanResult<()> {
/// let mut registry = RobotRegistry::new();
/// bestman::xarm::register(&mut registry, open_xarm);
/// let config = registry.configure_json(
///     r#"{"type": "xarm", "initial_joint_positions": [0, 0, 0, 0, 0, 0],
///         "vendor_parameters": {"port": "192.168.1.208"}}"#,
/// )?;
/// let mut robot = registry.make_robot(config)?;
/// robot.connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RobotRegistry {
    drivers: BTreeMap<&'static str, Registration>,
}

impl RobotRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        RobotRegistry {
            drivers: BTreeMap::new(),
        }
    }

    /// Maps `variant` to `builder`.
    ///
    /// Registering a type tag a second time replaces the earlier registration.
    pub fn register<B>(&mut self, variant: RobotVariant, builder: B)
    where
        B: Fn(RobotConfig) -> BestmanResult<Box<dyn Robot>> + Send + Sync + 'static,
    {
        let registration = Registration {
            variant,
            builder: Box::new(builder),
        };
        if self
            .drivers
            .insert(variant.type_tag, registration)
            .is_some()
        {
            warn!(
                type_tag = variant.type_tag,
                "driver registration replaced an earlier one"
            );
        } else {
            debug!(type_tag = variant.type_tag, "driver registered");
        }
    }

    /// All registered type tags in ascending order.
    pub fn registered_types(&self) -> Vec<&'static str> {
        self.drivers.keys().copied().collect()
    }

    pub fn variant(&self, type_tag: &str) -> Option<&RobotVariant> {
        self.drivers
            .get(type_tag)
            .map(|registration| &registration.variant)
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.drivers.contains_key(type_tag)
    }

    /// Validates a tagged configuration against the variant registered for its type.
    /// # Errors
    /// * [`UnsupportedConfigurationException`](`crate::exception::BestmanException::UnsupportedConfigurationException`)
    /// if no driver is registered for the type.
    /// * [`ConfigurationException`](`crate::exception::BestmanException::ConfigurationException`)
    /// if validation fails.
    pub fn configure(&self, tagged: TaggedRobotConfig) -> BestmanResult<RobotConfig> {
        let variant = self
            .variant(&tagged.type_tag)
            .ok_or_else(|| self.unsupported(&tagged.type_tag))?;
        RobotConfig::new(variant, tagged.fields)
    }

    /// Parses a JSON object with a `"type"` field and validates it, see [`configure`](`Self::configure`).
    pub fn configure_json(&self, json: &str) -> BestmanResult<RobotConfig> {
        let tagged: TaggedRobotConfig = serde_json::from_str(json).map_err(|error| {
            create_configuration_exception(format!("cannot parse robot configuration: {}", error))
        })?;
        self.configure(tagged)
    }

    /// Constructs the driver registered for the type of `config`.
    ///
    /// The returned robot is disconnected.
    /// # Errors
    /// * [`UnsupportedConfigurationException`](`crate::exception::BestmanException::UnsupportedConfigurationException`)
    /// listing all registered types if the type of `config` is unknown.
    pub fn make_robot(&self, config: RobotConfig) -> BestmanResult<Box<dyn Robot>> {
        let registration = self
            .drivers
            .get(config.type_tag())
            .ok_or_else(|| self.unsupported(config.type_tag()))?;
        debug!(
            robot = config.label(),
            type_tag = config.type_tag(),
            "building driver"
        );
        (registration.builder)(config)
    }

    fn unsupported(&self, type_tag: &str) -> BestmanException {
        BestmanException::UnsupportedConfigurationException {
            type_tag: type_tag.to_string(),
            registered: self
                .registered_types()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl fmt::Debug for RobotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotRegistry")
            .field("registered", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RobotConfigFields, VendorParameters};
    use crate::robot::fake::{build_fake, mock_config, FakeArm, MOCK};
    use crate::robot::ControlMode;
    use serde_json::json;

    const MOCK_ARM: RobotVariant = RobotVariant {
        type_tag: "mock_arm",
        required_vendor_parameters: &["can_interface"],
        default_dof: 6,
    };

    fn registry() -> RobotRegistry {
        let mut registry = RobotRegistry::new();
        registry.register(MOCK, build_fake);
        registry
    }

    #[test]
    fn make_robot_returns_registered_driver() {
        let registry = registry();
        let robot = registry.make_robot(mock_config()).unwrap();
        assert!(!robot.is_connected());
        assert_eq!(robot.mode(), None);
        assert_eq!(robot.type_tag(), "mock");
        assert!(robot.as_any().downcast_ref::<FakeArm>().is_some());
    }

    #[test]
    fn unknown_type_lists_registered_types() {
        let registry = registry();
        let config = RobotConfig::new(
            &MOCK_ARM,
            RobotConfigFields {
                initial_joint_positions: vec![0.; 6],
                vendor_parameters: VendorParameters::from([(
                    "can_interface".to_string(),
                    json!("can0"),
                )]),
                ..Default::default()
            },
        )
        .unwrap();
        match registry.make_robot(config) {
            Err(error @ BestmanException::UnsupportedConfigurationException { .. }) => {
                let message = error.to_string();
                assert!(message.contains("mock_arm"), "{}", message);
                assert!(message.contains("\"mock\""), "{}", message);
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = registry();
        registry.register(MOCK, |_| -> BestmanResult<Box<dyn Robot>> {
            Err(create_configuration_exception("replacement builder"))
        });
        assert_eq!(registry.registered_types(), vec!["mock"]);
        assert!(registry.make_robot(mock_config()).is_err());
    }

    #[test]
    fn configure_from_json() {
        let mut registry = registry();
        registry.register(MOCK_ARM, build_fake);
        assert_eq!(registry.registered_types(), vec!["mock", "mock_arm"]);
        assert!(registry.is_registered("mock_arm"));
        assert_eq!(registry.variant("mock_arm"), Some(&MOCK_ARM));

        let config = registry
            .configure_json(
                r#"{"type": "mock_arm", "id": "left", "initial_joint_positions": [0, 0, 0, 0, 0, 0],
                    "vendor_parameters": {"can_interface": "can0"}}"#,
            )
            .unwrap();
        assert_eq!(config.type_tag(), "mock_arm");
        assert_eq!(config.label(), "left");

        let missing = registry.configure_json(r#"{"type": "mock_arm", "initial_joint_positions": [0, 0, 0, 0, 0, 0]}"#);
        assert!(matches!(
            missing,
            Err(BestmanException::ConfigurationException { .. })
        ));
        let unknown = registry.configure_json(r#"{"type": "xram"}"#);
        assert!(matches!(
            unknown,
            Err(BestmanException::UnsupportedConfigurationException { .. })
        ));
        let garbage = registry.configure_json("{type: mock}");
        assert!(matches!(
            garbage,
            Err(BestmanException::ConfigurationException { .. })
        ));
    }

    #[test]
    fn end_to_end_with_fake_arm() {
        let mut registry = RobotRegistry::new();
        registry.register(MOCK_ARM, build_fake);
        let config = RobotConfig::new(
            &MOCK_ARM,
            RobotConfigFields {
                dof: Some(6),
                initial_joint_positions: vec![0.; 6],
                vendor_parameters: VendorParameters::from([(
                    "can_interface".to_string(),
                    json!("can0"),
                )]),
                ..Default::default()
            },
        )
        .unwrap();
        let mut robot = registry.make_robot(config).unwrap();
        robot.connect().unwrap();
        assert_eq!(robot.mode(), Some(ControlMode::Position));
        assert!(robot.go_home().unwrap());
        let joints = robot.get_joint_positions().unwrap();
        assert_eq!(joints, vec![0.; 6]);
        robot.disconnect().unwrap();
        robot.disconnect().unwrap();
        assert_eq!(
            robot.as_any().downcast_ref::<FakeArm>().unwrap().teardowns,
            1
        );
        assert!(matches!(
            robot.get_joint_positions(),
            Err(BestmanException::PreconditionException { .. })
        ));
    }
}
