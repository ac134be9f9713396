// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the validated description of one physical robot instance.
//!
//! A [`RobotConfig`] can only be obtained through [`RobotConfig::new`], which checks the raw
//! [`RobotConfigFields`] against the [`RobotVariant`] of the driver family. Once constructed a
//! configuration is immutable.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exception::{create_configuration_exception, BestmanResult};

/// Free-form key/value parameters handed uninterpreted to the vendor SDK connector.
pub type VendorParameters = BTreeMap<String, Value>;

/// Static descriptor of one driver family.
///
/// Every driver module exports one of these, e.g. [`XARM`](`crate::robot::xarm::XARM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotVariant {
    /// Discriminator selecting the driver, e.g. `"xarm"`.
    pub type_tag: &'static str,
    /// Keys which have to be present in the vendor parameters.
    pub required_vendor_parameters: &'static [&'static str],
    /// Degrees of freedom used when the raw fields do not state them.
    pub default_dof: usize,
}

/// Physical finger range of a gripper mounted on the arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperConfig {
    /// Fully closed width in device units.
    pub min_width: f64,
    /// Fully opened width in device units.
    pub max_width: f64,
}

/// Robot mounted camera.
///
/// All of `width`, `height` and `fps` have to be given, otherwise the robot configuration is
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Passed uninterpreted to the camera backend.
    pub vendor_parameters: VendorParameters,
}

/// Raw, unvalidated fields of a robot configuration as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfigFields {
    /// Label used in log messages.
    pub id: Option<String>,
    /// Degrees of freedom. Falls back to [`RobotVariant::default_dof`].
    #[serde(alias = "degrees_of_freedom")]
    pub dof: Option<usize>,
    /// Home pose in \[rad\].
    #[serde(alias = "initial_joints")]
    pub initial_joint_positions: Vec<f64>,
    #[serde(alias = "sdk_kwargs")]
    pub vendor_parameters: VendorParameters,
    /// Flange to tool tip transformation `[x, y, z, roll, pitch, yaw]` in \[m\] and \[rad\].
    pub tcp_offset: Option<[f64; 6]>,
    pub gripper: Option<GripperConfig>,
    pub cameras: BTreeMap<String, CameraConfig>,
}

/// Configuration whose driver family is selected by its `"type"` field.
///
/// ```
/// use bestman::TaggedRobotConfig;
/// let tagged: TaggedRobotConfig = serde_json::from_str(
///     r#"{"type": "xarm", "initial_joint_positions": [0, 0, 0, 0, 0, 0],
///         "vendor_parameters": {"port": "192.168.1.208"}}"#,
/// )
/// .unwrap();
/// assert_eq!(tagged.type_tag, "xarm");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRobotConfig {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(flatten)]
    pub fields: RobotConfigFields,
}

/// Validated description of one physical robot instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotConfig {
    id: Option<String>,
    variant: RobotVariant,
    dof: usize,
    initial_joint_positions: Vec<f64>,
    vendor_parameters: VendorParameters,
    tcp_offset: Option<[f64; 6]>,
    gripper: Option<GripperConfig>,
    cameras: BTreeMap<String, CameraConfig>,
}

impl RobotConfig {
    /// Validates raw fields against a driver family.
    ///
    /// Checks are performed in this order and the first failing one is reported:
    /// 1. all required vendor parameters are present
    /// 2. the degrees of freedom are positive
    /// 3. `initial_joint_positions` has exactly `dof` entries
    /// 4. every camera states width, height and fps
    /// 5. the gripper range is finite and not empty
    /// 6. the tcp offset is finite
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::BestmanException::ConfigurationException`)
    /// naming the offending keys or lengths.
    pub fn new(variant: &RobotVariant, fields: RobotConfigFields) -> BestmanResult<Self> {
        let missing: Vec<&str> = variant
            .required_vendor_parameters
            .iter()
            .copied()
            .filter(|key| !fields.vendor_parameters.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            let supplied: Vec<&str> = fields.vendor_parameters.keys().map(String::as_str).collect();
            let mut missing = missing;
            missing.sort_unstable();
            return Err(create_configuration_exception(format!(
                "{} configuration is missing vendor parameters {:?} (required: {:?}, supplied: {:?})",
                variant.type_tag, missing, variant.required_vendor_parameters, supplied
            )));
        }

        let dof = fields.dof.unwrap_or(variant.default_dof);
        if dof == 0 {
            return Err(create_configuration_exception(format!(
                "{} configuration needs at least one degree of freedom",
                variant.type_tag
            )));
        }
        if fields.initial_joint_positions.len() != dof {
            return Err(create_configuration_exception(format!(
                "initial_joint_positions has {} entries but the robot has {} degrees of freedom",
                fields.initial_joint_positions.len(),
                dof
            )));
        }

        for (name, camera) in fields.cameras.iter() {
            let absent = [
                ("width", camera.width.is_none()),
                ("height", camera.height.is_none()),
                ("fps", camera.fps.is_none()),
            ];
            if let Some((field, _)) = absent.iter().find(|(_, missing)| *missing) {
                return Err(create_configuration_exception(format!(
                    "camera {:?} does not specify {}",
                    name, field
                )));
            }
        }

        if let Some(gripper) = fields.gripper {
            let valid = gripper.min_width.is_finite()
                && gripper.max_width.is_finite()
                && gripper.min_width < gripper.max_width;
            if !valid {
                return Err(create_configuration_exception(format!(
                    "gripper range [{}, {}] is empty",
                    gripper.min_width, gripper.max_width
                )));
            }
        }

        if let Some(offset) = fields.tcp_offset {
            if offset.iter().any(|value| !value.is_finite()) {
                return Err(create_configuration_exception(format!(
                    "tcp_offset {:?} contains non finite values",
                    offset
                )));
            }
        }

        Ok(RobotConfig {
            id: fields.id,
            variant: *variant,
            dof,
            initial_joint_positions: fields.initial_joint_positions,
            vendor_parameters: fields.vendor_parameters,
            tcp_offset: fields.tcp_offset,
            gripper: fields.gripper,
            cameras: fields.cameras,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the id if present and the type tag otherwise. Used in log messages.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(self.variant.type_tag)
    }

    pub fn type_tag(&self) -> &'static str {
        self.variant.type_tag
    }

    pub fn variant(&self) -> &RobotVariant {
        &self.variant
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Home pose in \[rad\].
    pub fn initial_joint_positions(&self) -> &[f64] {
        &self.initial_joint_positions
    }

    pub fn vendor_parameters(&self) -> &VendorParameters {
        &self.vendor_parameters
    }

    pub fn vendor_parameter(&self, key: &str) -> Option<&Value> {
        self.vendor_parameters.get(key)
    }

    pub fn tcp_offset(&self) -> Option<&[f64; 6]> {
        self.tcp_offset.as_ref()
    }

    pub fn gripper(&self) -> Option<&GripperConfig> {
        self.gripper.as_ref()
    }

    pub fn cameras(&self) -> &BTreeMap<String, CameraConfig> {
        &self.cameras
    }
}
