// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the driver for Startouch arms attached over CAN.
//!
//! The native controller plans every timed motion itself and blocks until the planning horizon
//! has passed, so the `wait` flag of the position operations has no effect. It has no mode
//! register either; the driver tracks the mode on its own.
use std::any::Any;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::config::{RobotConfig, RobotVariant, VendorParameters};
use crate::exception::{create_configuration_exception, BestmanException, BestmanResult, SdkResult};
use crate::robot::registry::RobotRegistry;
use crate::robot::{
    check_dof, check_gripper_command, check_mode, not_connected, truncate_to_dof, ControlMode,
    EeVelocity, Robot,
};

/// Driver family of Startouch arms. Requires the CAN interface name in `"can_interface"`.
pub const STARTOUCH: RobotVariant = RobotVariant {
    type_tag: "startouch",
    required_vendor_parameters: &["can_interface"],
    default_dof: 6,
};

/// Planning horizon of position moves. \[s\]
pub const STARTOUCH_MOVE_DURATION: f64 = 2.;
/// Planning horizon of the move to the home pose. \[s\]
pub const STARTOUCH_HOME_DURATION: f64 = 3.;
/// Rate at which the controller interpolates planned joint motions. \[Hz\]
pub const STARTOUCH_CONTROL_RATE: f64 = 400.;

/// Functions of the native Startouch arm controller used by [`StartouchDriver`].
///
/// The gripper position of the controller is 0 for closed and 1 for open fingers.
#[cfg_attr(test, automock)]
pub trait StartouchSdk: Send {
    /// Polynomial joint motion reaching `positions` after `duration` seconds.
    fn set_joint(&mut self, positions: &[f64], duration: f64, control_rate: f64)
        -> SdkResult<()>;
    /// Forwards the target to the joint controllers without planning.
    fn set_joint_raw(&mut self, positions: &[f64], velocities: &[f64]) -> SdkResult<()>;
    fn set_end_effector_pose(
        &mut self,
        position: [f64; 3],
        euler: [f64; 3],
        duration: f64,
    ) -> SdkResult<()>;
    fn set_end_effector_pose_raw(&mut self, position: [f64; 3], euler: [f64; 3])
        -> SdkResult<()>;
    fn get_joint_positions(&mut self) -> SdkResult<Vec<f64>>;
    fn get_joint_velocities(&mut self) -> SdkResult<Vec<f64>>;
    /// Position in \[m\] and (roll, pitch, yaw) in \[rad\].
    fn get_end_effector_pose(&mut self) -> SdkResult<([f64; 3], [f64; 3])>;
    fn set_gripper_position(&mut self, position: f64) -> SdkResult<()>;
    fn get_gripper_position(&mut self) -> SdkResult<f64>;
    fn gravity_compensation(&mut self) -> SdkResult<()>;
    fn cleanup(&mut self) -> SdkResult<()>;
}

/// Opens the native controller from the vendor parameters of a configuration.
pub type StartouchConnector =
    Arc<dyn Fn(&VendorParameters) -> SdkResult<Box<dyn StartouchSdk>> + Send + Sync>;

/// Registers the Startouch driver family using `connector` to open controller handles.
pub fn register<C>(registry: &mut RobotRegistry, connector: C)
where
    C: Fn(&VendorParameters) -> SdkResult<Box<dyn StartouchSdk>> + Send + Sync + 'static,
{
    let connector: StartouchConnector = Arc::new(connector);
    registry.register(STARTOUCH, move |config| {
        let driver = StartouchDriver::new(config, connector.clone())?;
        Ok(Box::new(driver) as Box<dyn Robot>)
    });
}

/// [`Robot`] implementation for Startouch arms.
pub struct StartouchDriver {
    config: RobotConfig,
    connector: StartouchConnector,
    arm: Option<Box<dyn StartouchSdk>>,
    mode: ControlMode,
}

impl StartouchDriver {
    /// Creates a disconnected driver.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::BestmanException::ConfigurationException`)
    /// if `config` was not built for [`STARTOUCH`].
    pub fn new(config: RobotConfig, connector: StartouchConnector) -> BestmanResult<Self> {
        if config.type_tag() != STARTOUCH.type_tag {
            return Err(create_configuration_exception(format!(
                "Startouch driver cannot be built from a {} configuration",
                config.type_tag()
            )));
        }
        Ok(StartouchDriver {
            config,
            connector,
            arm: None,
            mode: ControlMode::Position,
        })
    }

    /// Direct access to the native controller. `None` while disconnected.
    pub fn raw_handle_mut(&mut self) -> Option<&mut (dyn StartouchSdk + 'static)> {
        self.arm.as_deref_mut()
    }

    /// Switches the arm into gravity compensation, the arm can be moved by hand afterwards.
    pub fn gravity_compensation(&mut self) -> BestmanResult<()> {
        self.arm("gravity_compensation")?.gravity_compensation()?;
        Ok(())
    }

    fn arm(&mut self, operation: &str) -> BestmanResult<&mut (dyn StartouchSdk + 'static)> {
        match self.arm.as_deref_mut() {
            Some(arm) => Ok(arm),
            None => Err(not_connected(&self.config, operation)),
        }
    }

    fn require_mode(&self, required: ControlMode, operation: &str) -> BestmanResult<()> {
        if self.arm.is_none() {
            return Err(not_connected(&self.config, operation));
        }
        check_mode(self.mode, required, operation)
    }
}

fn split_pose(pose: &[f64; 6]) -> ([f64; 3], [f64; 3]) {
    ([pose[0], pose[1], pose[2]], [pose[3], pose[4], pose[5]])
}

impl Robot for StartouchDriver {
    fn config(&self) -> &RobotConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.arm.is_some()
    }

    fn mode(&self) -> Option<ControlMode> {
        self.arm.as_ref().map(|_| self.mode)
    }

    fn connect(&mut self) -> BestmanResult<()> {
        if self.arm.is_some() {
            return Ok(());
        }
        let label = self.config.label();
        let arm = (self.connector)(self.config.vendor_parameters()).map_err(|error| {
            BestmanException::ConnectionException {
                message: format!("failed to open {}: {}", label, error),
                source: Some(error),
            }
        })?;
        self.arm = Some(arm);
        self.mode = ControlMode::Position;
        info!(robot = self.config.label(), "connected");
        Ok(())
    }

    fn disconnect(&mut self) -> BestmanResult<()> {
        match self.arm.take() {
            Some(mut arm) => {
                let result = arm.cleanup();
                drop(arm);
                info!(robot = self.config.label(), "disconnected");
                result.map_err(BestmanException::from)
            }
            None => Ok(()),
        }
    }

    fn set_mode(&mut self, mode: ControlMode) -> BestmanResult<ControlMode> {
        self.arm("set_mode")?;
        self.mode = mode;
        debug!(robot = self.config.label(), mode = ?mode, "mode switched");
        Ok(mode)
    }

    fn move_to_joint_positions(&mut self, positions: &[f64], _wait: bool) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Position, "move_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        self.arm("move_to_joint_positions")?.set_joint(
            positions,
            STARTOUCH_MOVE_DURATION,
            STARTOUCH_CONTROL_RATE,
        )?;
        Ok(true)
    }

    fn move_to_ee_pose(&mut self, pose: &[f64; 6], _wait: bool) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Position, "move_to_ee_pose")?;
        let (position, euler) = split_pose(pose);
        self.arm("move_to_ee_pose")?
            .set_end_effector_pose(position, euler, STARTOUCH_MOVE_DURATION)?;
        Ok(true)
    }

    fn go_home(&mut self) -> BestmanResult<bool> {
        self.set_mode(ControlMode::Position)?;
        let home = self.config.initial_joint_positions().to_vec();
        self.arm("go_home")?
            .set_joint(&home, STARTOUCH_HOME_DURATION, STARTOUCH_CONTROL_RATE)?;
        Ok(true)
    }

    fn servo_to_joint_positions(&mut self, positions: &[f64]) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Servo, "servo_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        let velocities = vec![0.; positions.len()];
        self.arm("servo_to_joint_positions")?
            .set_joint_raw(positions, &velocities)?;
        Ok(true)
    }

    fn servo_to_ee_pose(&mut self, pose: &[f64; 6]) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Servo, "servo_to_ee_pose")?;
        let (position, euler) = split_pose(pose);
        self.arm("servo_to_ee_pose")?
            .set_end_effector_pose_raw(position, euler)?;
        Ok(true)
    }

    fn get_joint_positions(&mut self) -> BestmanResult<Vec<f64>> {
        let positions = self.arm("get_joint_positions")?.get_joint_positions()?;
        truncate_to_dof(&self.config, positions, "joint positions")
    }

    fn get_joint_velocities(&mut self) -> BestmanResult<Vec<f64>> {
        let velocities = self.arm("get_joint_velocities")?.get_joint_velocities()?;
        truncate_to_dof(&self.config, velocities, "joint velocities")
    }

    fn get_ee_pose(&mut self) -> BestmanResult<[f64; 6]> {
        let (position, euler) = self.arm("get_ee_pose")?.get_end_effector_pose()?;
        Ok([
            position[0],
            position[1],
            position[2],
            euler[0],
            euler[1],
            euler[2],
        ])
    }

    fn get_ee_velocity(&mut self) -> BestmanResult<EeVelocity> {
        Err(BestmanException::NotImplementedException {
            operation: "get_ee_velocity",
            type_tag: STARTOUCH.type_tag.to_string(),
        })
    }

    fn get_gripper_position(&mut self) -> BestmanResult<f64> {
        let opening = self.arm("get_gripper_position")?.get_gripper_position()?;
        Ok((1. - opening).clamp(0., 1.))
    }

    fn move_gripper(&mut self, command: f64) -> BestmanResult<bool> {
        check_gripper_command(command)?;
        self.arm("move_gripper")?.set_gripper_position(1. - command)?;
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for StartouchDriver {
    fn drop(&mut self) {
        if let Err(error) = self.disconnect() {
            warn!(robot = self.config.label(), error = %error, "disconnect on drop failed");
        }
    }
}
