// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the driver for UFactory xArm robots.
//!
//! The xArm controller works in millimeters, the driver converts every position from and to
//! meters. Angles are always exchanged in radians.
use std::any::Any;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use num_traits::{FromPrimitive, ToPrimitive};
use tracing::{debug, info, warn};

use crate::config::{RobotConfig, RobotVariant, VendorParameters};
use crate::exception::{
    create_configuration_exception, create_precondition_exception, BestmanException,
    BestmanResult, SdkResult,
};
use crate::robot::registry::RobotRegistry;
use crate::robot::{
    check_dof, check_gripper_command, check_mode, not_connected, truncate_to_dof, ControlMode,
    EeVelocity, Robot,
};

/// Driver family of xArm robots. Requires the controller address in `"port"`.
pub const XARM: RobotVariant = RobotVariant {
    type_tag: "xarm",
    required_vendor_parameters: &["port"],
    default_dof: 6,
};

/// Gripper position reported by the SDK for fully opened fingers. 0 is closed.
pub const XARM_GRIPPER_OPEN: f64 = 850.;

/// Subset of the xArm SDK used by [`XArmDriver`].
///
/// Calls returning an `i32` report the controller code, where 0 means success.
/// Cartesian values are in \[mm\].
#[cfg_attr(test, automock)]
pub trait XArmSdk: Send {
    fn clean_warn(&mut self) -> SdkResult<i32>;
    fn clean_error(&mut self) -> SdkResult<i32>;
    fn motion_enable(&mut self, enable: bool) -> SdkResult<i32>;
    fn set_mode(&mut self, mode: i32) -> SdkResult<i32>;
    fn set_state(&mut self, state: i32) -> SdkResult<i32>;
    /// Mode the controller currently runs in.
    fn mode(&self) -> i32;
    fn set_tcp_offset(&mut self, offset: [f64; 6], is_radian: bool) -> SdkResult<i32>;
    fn set_servo_angle(&mut self, angles: &[f64], is_radian: bool, wait: bool) -> SdkResult<i32>;
    fn set_position(&mut self, pose: [f64; 6], is_radian: bool, wait: bool) -> SdkResult<i32>;
    fn set_servo_angle_j(&mut self, angles: &[f64], is_radian: bool) -> SdkResult<i32>;
    fn set_servo_cartesian(&mut self, pose: [f64; 6], is_radian: bool) -> SdkResult<i32>;
    /// Joint angles of all joints of the controller, which may be more than the arm has.
    fn get_servo_angle(&mut self, is_radian: bool) -> SdkResult<Vec<f64>>;
    /// \[rad/s\]
    fn get_joint_speeds(&mut self) -> SdkResult<Vec<f64>>;
    fn get_position(&mut self, is_radian: bool) -> SdkResult<[f64; 6]>;
    fn set_gripper_enable(&mut self, enable: bool) -> SdkResult<i32>;
    fn get_gripper_position(&mut self) -> SdkResult<f64>;
    fn set_gripper_position(&mut self, position: f64, wait: bool) -> SdkResult<i32>;
    fn disconnect(&mut self) -> SdkResult<()>;
}

/// Opens a connection to an xArm controller from the vendor parameters of a configuration.
pub type XArmConnector =
    Arc<dyn Fn(&VendorParameters) -> SdkResult<Box<dyn XArmSdk>> + Send + Sync>;

/// Registers the xArm driver family using `connector` to open SDK handles.
pub fn register<C>(registry: &mut RobotRegistry, connector: C)
where
    C: Fn(&VendorParameters) -> SdkResult<Box<dyn XArmSdk>> + Send + Sync + 'static,
{
    let connector: XArmConnector = Arc::new(connector);
    registry.register(XARM, move |config| {
        let driver = XArmDriver::new(config, connector.clone())?;
        Ok(Box::new(driver) as Box<dyn Robot>)
    });
}

/// [`Robot`] implementation for xArm controllers.
pub struct XArmDriver {
    config: RobotConfig,
    connector: XArmConnector,
    arm: Option<Box<dyn XArmSdk>>,
    mode: ControlMode,
}

impl XArmDriver {
    /// Creates a disconnected driver.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::BestmanException::ConfigurationException`)
    /// if `config` was not built for [`XARM`].
    pub fn new(config: RobotConfig, connector: XArmConnector) -> BestmanResult<Self> {
        if config.type_tag() != XARM.type_tag {
            return Err(create_configuration_exception(format!(
                "xArm driver cannot be built from a {} configuration",
                config.type_tag()
            )));
        }
        Ok(XArmDriver {
            config,
            connector,
            arm: None,
            mode: ControlMode::Position,
        })
    }

    /// Direct access to the SDK handle for features outside of the [`Robot`] contract.
    ///
    /// `None` while disconnected.
    pub fn raw_handle_mut(&mut self) -> Option<&mut (dyn XArmSdk + 'static)> {
        self.arm.as_deref_mut()
    }

    fn arm(&mut self, operation: &str) -> BestmanResult<&mut (dyn XArmSdk + 'static)> {
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

    fn initialize(&self, arm: &mut dyn XArmSdk) -> BestmanResult<()> {
        let label = self.config.label();
        expect_success(label, "clean_warn", arm.clean_warn())?;
        expect_success(label, "clean_error", arm.clean_error())?;
        if let Some(offset) = self.config.tcp_offset() {
            expect_success(
                label,
                "set_tcp_offset",
                arm.set_tcp_offset(to_sdk_pose(offset), true),
            )?;
        }
        expect_success(label, "motion_enable", arm.motion_enable(true))?;
        expect_success(label, "set_mode", arm.set_mode(0))?;
        expect_success(label, "set_state", arm.set_state(0))?;
        if self.config.gripper().is_some() {
            expect_success(label, "set_gripper_enable", arm.set_gripper_enable(true))?;
        }
        Ok(())
    }
}

fn expect_success(label: &str, call: &str, result: SdkResult<i32>) -> BestmanResult<()> {
    match result {
        Ok(0) => Ok(()),
        Ok(code) => Err(BestmanException::ConnectionException {
            message: format!(
                "{} rejected {} with code {} while connecting",
                label, call, code
            ),
            source: None,
        }),
        Err(error) => Err(BestmanException::ConnectionException {
            message: format!("{} failed {} while connecting: {}", label, call, error),
            source: Some(error),
        }),
    }
}

fn to_sdk_pose(pose: &[f64; 6]) -> [f64; 6] {
    [
        pose[0] * 1000.,
        pose[1] * 1000.,
        pose[2] * 1000.,
        pose[3],
        pose[4],
        pose[5],
    ]
}

fn from_sdk_pose(pose: &[f64; 6]) -> [f64; 6] {
    [
        pose[0] / 1000.,
        pose[1] / 1000.,
        pose[2] / 1000.,
        pose[3],
        pose[4],
        pose[5],
    ]
}

impl Robot for XArmDriver {
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
        let mut arm = (self.connector)(self.config.vendor_parameters()).map_err(|error| {
            BestmanException::ConnectionException {
                message: format!("failed to connect to {}: {}", label, error),
                source: Some(error),
            }
        })?;
        if let Err(error) = self.initialize(&mut *arm) {
            if let Err(teardown) = arm.disconnect() {
                warn!(robot = label, error = %teardown, "releasing half open connection failed");
            }
            return Err(error);
        }
        self.arm = Some(arm);
        self.mode = ControlMode::Position;
        info!(robot = self.config.label(), "connected");
        Ok(())
    }

    fn disconnect(&mut self) -> BestmanResult<()> {
        match self.arm.take() {
            Some(mut arm) => {
                let result = arm.disconnect();
                drop(arm);
                info!(robot = self.config.label(), "disconnected");
                result.map_err(BestmanException::from)
            }
            None => Ok(()),
        }
    }

    fn set_mode(&mut self, mode: ControlMode) -> BestmanResult<ControlMode> {
        let code = mode.to_i32().ok_or_else(|| {
            create_precondition_exception(format!("{:?} has no xArm mode code", mode))
        })?;
        let arm = self.arm("set_mode")?;
        let result = arm.set_mode(code)?;
        arm.set_state(0)?;
        let reported = arm.mode();
        let applied = ControlMode::from_i32(reported).ok_or_else(|| {
            BestmanException::HardwareException(
                format!("xArm reports mode {} which is not supported", reported).into(),
            )
        })?;
        self.mode = applied;
        debug!(
            robot = self.config.label(),
            requested = ?mode,
            applied = ?applied,
            code = result,
            "mode switched"
        );
        Ok(applied)
    }

    fn move_to_joint_positions(&mut self, positions: &[f64], wait: bool) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Position, "move_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        let code = self
            .arm("move_to_joint_positions")?
            .set_servo_angle(positions, true, wait)?;
        Ok(code == 0)
    }

    fn move_to_ee_pose(&mut self, pose: &[f64; 6], wait: bool) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Position, "move_to_ee_pose")?;
        let code = self
            .arm("move_to_ee_pose")?
            .set_position(to_sdk_pose(pose), true, wait)?;
        Ok(code == 0)
    }

    fn go_home(&mut self) -> BestmanResult<bool> {
        self.set_mode(ControlMode::Position)?;
        let home = self.config.initial_joint_positions().to_vec();
        self.move_to_joint_positions(&home, true)
    }

    fn servo_to_joint_positions(&mut self, positions: &[f64]) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Servo, "servo_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        let code = self
            .arm("servo_to_joint_positions")?
            .set_servo_angle_j(positions, true)?;
        Ok(code == 0)
    }

    fn servo_to_ee_pose(&mut self, pose: &[f64; 6]) -> BestmanResult<bool> {
        self.require_mode(ControlMode::Servo, "servo_to_ee_pose")?;
        let code = self
            .arm("servo_to_ee_pose")?
            .set_servo_cartesian(to_sdk_pose(pose), true)?;
        Ok(code == 0)
    }

    fn get_joint_positions(&mut self) -> BestmanResult<Vec<f64>> {
        let angles = self.arm("get_joint_positions")?.get_servo_angle(true)?;
        truncate_to_dof(&self.config, angles, "joint angles")
    }

    fn get_joint_velocities(&mut self) -> BestmanResult<Vec<f64>> {
        let speeds = self.arm("get_joint_velocities")?.get_joint_speeds()?;
        truncate_to_dof(&self.config, speeds, "joint speeds")
    }

    fn get_ee_pose(&mut self) -> BestmanResult<[f64; 6]> {
        let pose = self.arm("get_ee_pose")?.get_position(true)?;
        Ok(from_sdk_pose(&pose))
    }

    /// The xArm SDK only reports the scalar tcp speed.
    fn get_ee_velocity(&mut self) -> BestmanResult<EeVelocity> {
        Err(BestmanException::NotImplementedException {
            operation: "get_ee_velocity",
            type_tag: XARM.type_tag.to_string(),
        })
    }

    fn get_gripper_position(&mut self) -> BestmanResult<f64> {
        let position = self.arm("get_gripper_position")?.get_gripper_position()?;
        Ok((1. - position / XARM_GRIPPER_OPEN).clamp(0., 1.))
    }

    fn move_gripper(&mut self, command: f64) -> BestmanResult<bool> {
        check_gripper_command(command)?;
        let code = self
            .arm("move_gripper")?
            .set_gripper_position((1. - command) * XARM_GRIPPER_OPEN, true)?;
        Ok(code == 0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for XArmDriver {
    fn drop(&mut self) {
        if let Err(error) = self.disconnect() {
            warn!(robot = self.config.label(), error = %error, "disconnect on drop failed");
        }
    }
}
