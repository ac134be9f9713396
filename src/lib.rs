// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! # bestman-rs
//! bestman-rs is a library to control robotic arms of different vendors through one interface.
//! Drivers exist for [UFACTORY xArm](https://www.ufactory.cc) arms and Startouch arms.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//!
//! ## Design
//! The library does not talk to the hardware itself. Every driver wraps the vendor SDK behind a
//! small capability trait ([`XArmSdk`], [`StartouchSdk`]) and translates it to the common
//! [`Robot`] contract, which fixes units, orientation conventions and the gripper scale.
//! The application provides a connector which opens the vendor SDK.
//!
//! The library is divided into these modules:
//! * [config](`crate::config`) - robot configurations and their validation.
//! * [robot](`crate::robot`) - the [`Robot`] contract, the [`RobotRegistry`] and the drivers.
//! * [replayer](`crate::replayer`) - time synchronized replay of recorded trajectories.
//! * [utils](`crate::utils`) - conversions between orientation representations and frames.
//!
//! # Example:
//!```no_run
//! use bestman::{
//!     xarm, BestmanResult, ControlMode, Robot, RobotRegistry, SdkResult, VendorParameters,
//!     XArmSdk,
//! };
//! # fn open_xarm(parameters: &VendorParameters) -> SdkResult<Box<dyn XArmSdk>> { unimplemented!() }
//! fn main() -> BestmanResult<()> {
//!     let mut registry = RobotRegistry::new();
//!     xarm::register(&mut registry, open_xarm);
//!     let config = registry.configure_json(
//!         r#"{"type": "xarm", "id": "left_arm",
//!             "initial_joint_positions": [0, 0, 0, 1.57, 0, 1.57],
//!             "vendor_parameters": {"port": "192.168.1.208"}}"#,
//!     )?;
//!     let mut robot = registry.make_robot(config)?;
//!     robot.connect()?;
//!     robot.go_home()?;
//!     let mut pose = robot.get_ee_pose()?;
//!     pose[2] += 0.05;
//!     robot.move_to_ee_pose(&pose, true)?;
//!     robot.set_mode(ControlMode::Servo)?;
//!     robot.move_gripper(1.)?;
//!     robot.disconnect()
//! }
//!   ```
//!
//! The main function returns a BestmanResult<()> which means that it returns either Ok(())
//! or an Error of type BestmanException.
//!
//! ```ignore
//! let config = registry.configure_json(...)?;
//! ```
//! validates the configuration against the driver family named by its `"type"` field. Missing
//! vendor parameters or initial joint positions which do not match the degrees of freedom are
//! reported here, before any hardware is contacted.
//!
//! ```ignore
//! robot.move_to_ee_pose(&pose, true)?;
//! ```
//! Planned motions like this one are only accepted in [`ControlMode::Position`]. After switching
//! to [`ControlMode::Servo`] targets have to be streamed with
//! [`servo_to_ee_pose`](`crate::Robot::servo_to_ee_pose`) instead, which is what the
//! [`TrajectoryReplayer`] does.
pub mod config;
pub mod exception;
pub mod replayer;
pub mod robot;
pub mod utils;

pub use config::{
    CameraConfig, GripperConfig, RobotConfig, RobotConfigFields, RobotVariant, TaggedRobotConfig,
    VendorParameters,
};
pub use exception::{BestmanException, BestmanResult, SdkError, SdkResult};
pub use replayer::cancellation::CancellationToken;
pub use replayer::trajectory::Trajectory;
pub use replayer::{ReplayOptions, ReplayReport, TrajectoryReplayer};
pub use robot::registry::RobotRegistry;
pub use robot::startouch::{self, StartouchDriver, StartouchSdk};
pub use robot::xarm::{self, XArmDriver, XArmSdk};
pub use robot::{with_connection, ControlMode, EeVelocity, Robot};
pub use utils::QuaternionOrder;
