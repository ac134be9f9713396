// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the uniform control contract every vendor driver implements.
//!
//! A driver goes through the states
//! `DISCONNECTED → CONNECTED(Position) ⇄ CONNECTED(Servo) → DISCONNECTED`.
//! Planned motions are only accepted in [`ControlMode::Position`], streaming targets only in
//! [`ControlMode::Servo`]. Nothing switches the mode implicitly except [`Robot::go_home`].
use std::any::Any;

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RobotConfig;
use crate::exception::{create_precondition_exception, BestmanException, BestmanResult};
use crate::utils::{quaternion_to_euler, QuaternionOrder};

#[cfg(test)]
pub(crate) mod fake;
pub mod registry;
pub mod startouch;
pub mod xarm;

/// Operating mode of a connected robot.
///
/// The discriminants are the mode codes of the vendor controllers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Planned point to point motions executed by the vendor controller.
    Position = 0,
    /// One immediate target per call, sent at 100 to 500 Hz by the caller.
    Servo = 1,
}

/// Cartesian velocity of the end effector in the base frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EeVelocity {
    /// \[m/s\]
    pub linear: [f64; 3],
    /// \[rad/s\]
    pub angular: [f64; 3],
}

/// Uniform control contract over vendor robot SDKs.
///
/// Units are fixed for every operation: joint angles in \[rad\], positions in \[m\], Euler angles
/// as (roll, pitch, yaw) in \[rad\], quaternions in `[x, y, z, w]` order and gripper positions
/// normalized to \[0, 1\] with 0 meaning open and 1 meaning closed.
///
/// All operations except the connection management return a
/// [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
/// while the robot is disconnected.
///
/// ```no_run
/// use bestman::{with_connection, BestmanResult, ControlMode, Robot};
/// fn wave(robot: &mut dyn Robot) -> BestmanResult<()> {
///     with_connection(robot, |robot| {
///         robot.go_home()?;
///         robot.set_mode(ControlMode::Servo)?;
///         let mut pose = robot.get_ee_pose()?;
///         for _ in 0..200 {
///             pose[1] += 0.0005;
///             robot.servo_to_ee_pose(&pose)?;
///             std::thread::sleep(std::time::Duration::from_millis(5));
///         }
///         Ok(())
///     })
/// }
/// ```
pub trait Robot: Send {
    /// Configuration the driver was built from.
    fn config(&self) -> &RobotConfig;

    /// Type tag of the driver family.
    fn type_tag(&self) -> &'static str {
        self.config().type_tag()
    }

    fn is_connected(&self) -> bool;

    /// Mode the vendor controller applied, `None` while disconnected.
    fn mode(&self) -> Option<ControlMode>;

    /// Creates the vendor handle and prepares the robot for motion in
    /// [`Position`](`ControlMode::Position`) mode.
    ///
    /// Calling connect on a connected robot does nothing.
    /// # Errors
    /// * [`ConnectionException`](`crate::exception::BestmanException::ConnectionException`) if
    /// the vendor handle cannot be created or initialized. The robot is disconnected afterwards.
    fn connect(&mut self) -> BestmanResult<()>;

    /// Releases the vendor handle. Safe to call on a disconnected robot.
    /// # Errors
    /// * [`HardwareException`](`crate::exception::BestmanException::HardwareException`) if the
    /// vendor teardown fails. The handle is released nonetheless.
    fn disconnect(&mut self) -> BestmanResult<()>;

    /// Switches the operating mode.
    /// # Return
    /// The mode reported by the vendor afterwards, which may differ from the requested one.
    fn set_mode(&mut self, mode: ControlMode) -> BestmanResult<ControlMode>;

    /// Plans and executes a joint space motion.
    /// # Arguments
    /// * `positions` - Target joint positions, exactly `dof` entries. \[rad\]
    /// * `wait` - Block until the motion finished.
    /// # Errors
    /// * [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
    /// on a length mismatch or in [`Servo`](`ControlMode::Servo`) mode.
    fn move_to_joint_positions(&mut self, positions: &[f64], wait: bool) -> BestmanResult<bool>;

    /// Plans and executes a cartesian motion to `[x, y, z, roll, pitch, yaw]`.
    fn move_to_ee_pose(&mut self, pose: &[f64; 6], wait: bool) -> BestmanResult<bool>;

    fn move_to_ee_pose_rpy(
        &mut self,
        position: &[f64; 3],
        rpy: &[f64; 3],
        wait: bool,
    ) -> BestmanResult<bool> {
        self.move_to_ee_pose(&join_pose(position, rpy), wait)
    }

    /// Like [`move_to_ee_pose`](`Self::move_to_ee_pose`) with the orientation as `[x, y, z, w]`.
    fn move_to_ee_pose_quat(
        &mut self,
        position: &[f64; 3],
        orientation: &[f64; 4],
        wait: bool,
    ) -> BestmanResult<bool> {
        self.move_to_ee_pose(&quaternion_pose(position, orientation), wait)
    }

    /// Selects [`Position`](`ControlMode::Position`) mode and moves to the configured initial
    /// joint positions.
    fn go_home(&mut self) -> BestmanResult<bool>;

    /// Sends one immediate joint target.
    /// # Errors
    /// * [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
    /// on a length mismatch or in [`Position`](`ControlMode::Position`) mode. The vendor SDK is
    /// not contacted in that case.
    fn servo_to_joint_positions(&mut self, positions: &[f64]) -> BestmanResult<bool>;

    /// Sends one immediate cartesian target `[x, y, z, roll, pitch, yaw]`.
    fn servo_to_ee_pose(&mut self, pose: &[f64; 6]) -> BestmanResult<bool>;

    fn servo_to_ee_pose_rpy(&mut self, position: &[f64; 3], rpy: &[f64; 3]) -> BestmanResult<bool> {
        self.servo_to_ee_pose(&join_pose(position, rpy))
    }

    fn servo_to_ee_pose_quat(
        &mut self,
        position: &[f64; 3],
        orientation: &[f64; 4],
    ) -> BestmanResult<bool> {
        self.servo_to_ee_pose(&quaternion_pose(position, orientation))
    }

    /// \[rad\]
    fn get_joint_positions(&mut self) -> BestmanResult<Vec<f64>>;

    /// \[rad/s\]
    fn get_joint_velocities(&mut self) -> BestmanResult<Vec<f64>>;

    /// Current end effector pose `[x, y, z, roll, pitch, yaw]` in the base frame.
    fn get_ee_pose(&mut self) -> BestmanResult<[f64; 6]>;

    fn get_ee_velocity(&mut self) -> BestmanResult<EeVelocity>;

    /// Normalized gripper position, 0 is open and 1 is closed.
    fn get_gripper_position(&mut self) -> BestmanResult<f64>;

    /// Moves the gripper to a normalized position, 0 is open and 1 is closed.
    fn move_gripper(&mut self, command: f64) -> BestmanResult<bool>;

    /// Allows downcasting a `dyn Robot` to the concrete driver.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Connects `robot`, runs `f` and disconnects again on every exit path.
///
/// An error of `f` takes precedence over a failing disconnect, which is only logged then.
pub fn with_connection<R, T, F>(robot: &mut R, f: F) -> BestmanResult<T>
where
    R: Robot + ?Sized,
    F: FnOnce(&mut R) -> BestmanResult<T>,
{
    robot.connect()?;
    let result = f(robot);
    let disconnected = robot.disconnect();
    match (result, disconnected) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(disconnect_error)) => {
            warn!(
                robot = robot.config().label(),
                error = %disconnect_error,
                "disconnect after failed operation failed as well"
            );
            Err(error)
        }
    }
}

pub(crate) fn join_pose(position: &[f64; 3], rpy: &[f64; 3]) -> [f64; 6] {
    [position[0], position[1], position[2], rpy[0], rpy[1], rpy[2]]
}

fn quaternion_pose(position: &[f64; 3], orientation: &[f64; 4]) -> [f64; 6] {
    let rpy = quaternion_to_euler(&QuaternionOrder::Xyzw.to_quaternion(orientation));
    join_pose(position, &rpy)
}

pub(crate) fn check_dof(config: &RobotConfig, positions: &[f64]) -> BestmanResult<()> {
    if positions.len() != config.dof() {
        return Err(create_precondition_exception(format!(
            "expected {} joint positions for {}, got {}",
            config.dof(),
            config.label(),
            positions.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_mode(
    current: ControlMode,
    required: ControlMode,
    operation: &str,
) -> BestmanResult<()> {
    if current != required {
        return Err(create_precondition_exception(format!(
            "{} requires {:?} mode but the robot is in {:?} mode, call set_mode first",
            operation, required, current
        )));
    }
    Ok(())
}

pub(crate) fn check_gripper_command(command: f64) -> BestmanResult<()> {
    if !(0. ..=1.).contains(&command) {
        return Err(create_precondition_exception(format!(
            "gripper command {} is outside of [0, 1]",
            command
        )));
    }
    Ok(())
}

/// Cuts a joint space reading down to `dof` entries.
///
/// Controllers may report more joints than the configured arm has. Fewer entries are reported
/// as a hardware fault.
pub(crate) fn truncate_to_dof(
    config: &RobotConfig,
    mut values: Vec<f64>,
    quantity: &str,
) -> BestmanResult<Vec<f64>> {
    if values.len() < config.dof() {
        return Err(BestmanException::HardwareException(
            format!(
                "{} reported {} {} for {} degrees of freedom",
                config.label(),
                values.len(),
                quantity,
                config.dof()
            )
            .into(),
        ));
    }
    values.truncate(config.dof());
    Ok(values)
}

pub(crate) fn not_connected(config: &RobotConfig, operation: &str) -> BestmanException {
    create_precondition_exception(format!(
        "{} cannot {} while disconnected",
        config.label(),
        operation
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::fake::{mock_config, FakeArm};
    use num_traits::{FromPrimitive, ToPrimitive};

    #[test]
    fn mode_codes() {
        assert_eq!(ControlMode::Position.to_i32(), Some(0));
        assert_eq!(ControlMode::Servo.to_i32(), Some(1));
        assert_eq!(ControlMode::from_i32(1), Some(ControlMode::Servo));
        assert_eq!(ControlMode::from_i32(4), None);
    }

    #[test]
    fn orientation_variants_delegate_to_pose() {
        let mut robot = FakeArm::new(mock_config());
        robot.connect().unwrap();
        robot
            .move_to_ee_pose_rpy(&[0.1, 0.2, 0.3], &[0.4, 0.5, 0.6], true)
            .unwrap();
        // 180 degrees about x in [x, y, z, w]
        robot
            .move_to_ee_pose_quat(&[0.1, 0.2, 0.3], &[1., 0., 0., 0.], true)
            .unwrap();
        assert_eq!(robot.moves[0], [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let quat_pose = robot.moves[1];
        assert_eq!(&quat_pose[..3], &[0.1, 0.2, 0.3]);
        assert!((quat_pose[3].abs() - std::f64::consts::PI).abs() < 1e-9);
        assert!(quat_pose[4].abs() < 1e-9);
        assert!(quat_pose[5].abs() < 1e-9);

        robot.set_mode(ControlMode::Servo).unwrap();
        robot
            .servo_to_ee_pose_rpy(&[0.1, 0.2, 0.3], &[0., 0., 0.5])
            .unwrap();
        assert_eq!(robot.servo_calls[0].1, [0.1, 0.2, 0.3, 0., 0., 0.5]);
    }

    #[test]
    fn with_connection_disconnects_on_error() {
        let mut robot = FakeArm::new(mock_config());
        let result: BestmanResult<()> = with_connection(&mut robot, |robot| {
            robot.move_to_joint_positions(&[0.; 2], true)?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(BestmanException::PreconditionException { .. })
        ));
        assert_eq!(robot.connects, 1);
        assert_eq!(robot.teardowns, 1);
        assert!(!robot.is_connected());
    }

    #[test]
    fn with_connection_returns_value() {
        let mut robot = FakeArm::new(mock_config());
        let boxed: &mut dyn Robot = &mut robot;
        let joints = with_connection(boxed, |robot| robot.get_joint_positions()).unwrap();
        assert_eq!(joints.len(), 6);
        assert!(!boxed.is_connected());
        assert!(boxed.as_any().downcast_ref::<FakeArm>().is_some());
    }

    #[test]
    fn length_and_mode_checks() {
        let config = mock_config();
        assert!(check_dof(&config, &[0.; 6]).is_ok());
        let message = check_dof(&config, &[0.; 5]).unwrap_err().to_string();
        assert!(message.contains('5') && message.contains('6'), "{}", message);
        assert!(check_mode(ControlMode::Servo, ControlMode::Servo, "servo").is_ok());
        assert!(check_mode(ControlMode::Position, ControlMode::Servo, "servo").is_err());
        assert!(check_gripper_command(1.).is_ok());
        assert!(check_gripper_command(1.5).is_err());
        assert!(check_gripper_command(f64::NAN).is_err());
    }

    #[test]
    fn readings_are_truncated_to_dof() {
        let config = mock_config();
        assert_eq!(
            truncate_to_dof(&config, vec![1.; 7], "angles").unwrap(),
            vec![1.; 6]
        );
        assert!(matches!(
            truncate_to_dof(&config, vec![1.; 5], "angles"),
            Err(BestmanException::HardwareException(_))
        ));
    }

    #[test]
    fn disconnected_robot_rejects_reads() {
        let mut robot = FakeArm::new(mock_config());
        assert_eq!(robot.mode(), None);
        assert!(matches!(
            robot.get_ee_pose(),
            Err(BestmanException::PreconditionException { .. })
        ));
    }
}
