// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! In-memory robot for unit tests. Moves are instantaneous and every command is recorded.
use std::any::Any;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::config::{RobotConfig, RobotConfigFields, RobotVariant};
use crate::exception::{BestmanException, BestmanResult};
use crate::robot::{
    check_dof, check_gripper_command, check_mode, not_connected, ControlMode, EeVelocity, Robot,
};

pub(crate) const MOCK: RobotVariant = RobotVariant {
    type_tag: "mock",
    required_vendor_parameters: &[],
    default_dof: 6,
};

pub(crate) fn mock_config() -> RobotConfig {
    RobotConfig::new(
        &MOCK,
        RobotConfigFields {
            initial_joint_positions: vec![0.; 6],
            ..Default::default()
        },
    )
    .unwrap()
}

pub(crate) fn build_fake(config: RobotConfig) -> BestmanResult<Box<dyn Robot>> {
    Ok(Box::new(FakeArm::new(config)))
}

pub(crate) struct FakeArm {
    config: RobotConfig,
    connected: bool,
    mode: ControlMode,
    joints: Vec<f64>,
    pub(crate) ee_pose: [f64; 6],
    pub(crate) connects: usize,
    pub(crate) teardowns: usize,
    /// Targets of planned cartesian moves.
    pub(crate) moves: Vec<[f64; 6]>,
    /// Servo targets with the instant the call arrived.
    pub(crate) servo_calls: Vec<(Instant, [f64; 6])>,
    pub(crate) gripper_commands: Vec<f64>,
    /// Time every servo call blocks.
    pub(crate) servo_delay: Duration,
    /// Number of servo calls after which the next one fails.
    pub(crate) servo_failure_at: Option<usize>,
}

impl FakeArm {
    pub(crate) fn new(config: RobotConfig) -> Self {
        let joints = vec![0.1; config.dof()];
        FakeArm {
            config,
            connected: false,
            mode: ControlMode::Position,
            joints,
            ee_pose: [0.3, 0., 0.2, std::f64::consts::PI, 0., 0.],
            connects: 0,
            teardowns: 0,
            moves: Vec::new(),
            servo_calls: Vec::new(),
            gripper_commands: Vec::new(),
            servo_delay: Duration::ZERO,
            servo_failure_at: None,
        }
    }

    /// Connected fake in servo mode.
    pub(crate) fn servoing() -> Self {
        let mut arm = FakeArm::new(mock_config());
        arm.connect().unwrap();
        arm.set_mode(ControlMode::Servo).unwrap();
        arm
    }

    fn ensure_connected(&self, operation: &str) -> BestmanResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(not_connected(&self.config, operation))
        }
    }
}

impl Robot for FakeArm {
    fn config(&self) -> &RobotConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn mode(&self) -> Option<ControlMode> {
        self.connected.then(|| self.mode)
    }

    fn connect(&mut self) -> BestmanResult<()> {
        if !self.connected {
            self.connects += 1;
            self.connected = true;
            self.mode = ControlMode::Position;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> BestmanResult<()> {
        if self.connected {
            self.teardowns += 1;
            self.connected = false;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: ControlMode) -> BestmanResult<ControlMode> {
        self.ensure_connected("set_mode")?;
        self.mode = mode;
        Ok(mode)
    }

    fn move_to_joint_positions(&mut self, positions: &[f64], _: bool) -> BestmanResult<bool> {
        self.ensure_connected("move_to_joint_positions")?;
        check_mode(self.mode, ControlMode::Position, "move_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        self.joints = positions.to_vec();
        Ok(true)
    }

    fn move_to_ee_pose(&mut self, pose: &[f64; 6], _: bool) -> BestmanResult<bool> {
        self.ensure_connected("move_to_ee_pose")?;
        check_mode(self.mode, ControlMode::Position, "move_to_ee_pose")?;
        self.moves.push(*pose);
        self.ee_pose = *pose;
        Ok(true)
    }

    fn go_home(&mut self) -> BestmanResult<bool> {
        self.set_mode(ControlMode::Position)?;
        let home = self.config.initial_joint_positions().to_vec();
        self.move_to_joint_positions(&home, true)
    }

    fn servo_to_joint_positions(&mut self, positions: &[f64]) -> BestmanResult<bool> {
        self.ensure_connected("servo_to_joint_positions")?;
        check_mode(self.mode, ControlMode::Servo, "servo_to_joint_positions")?;
        check_dof(&self.config, positions)?;
        self.joints = positions.to_vec();
        Ok(true)
    }

    fn servo_to_ee_pose(&mut self, pose: &[f64; 6]) -> BestmanResult<bool> {
        self.ensure_connected("servo_to_ee_pose")?;
        check_mode(self.mode, ControlMode::Servo, "servo_to_ee_pose")?;
        if self.servo_failure_at == Some(self.servo_calls.len()) {
            return Err(BestmanException::HardwareException(
                "servo target out of reach".into(),
            ));
        }
        self.servo_calls.push((Instant::now(), *pose));
        self.ee_pose = *pose;
        sleep(self.servo_delay);
        Ok(true)
    }

    fn get_joint_positions(&mut self) -> BestmanResult<Vec<f64>> {
        self.ensure_connected("get_joint_positions")?;
        Ok(self.joints.clone())
    }

    fn get_joint_velocities(&mut self) -> BestmanResult<Vec<f64>> {
        self.ensure_connected("get_joint_velocities")?;
        Ok(vec![0.; self.config.dof()])
    }

    fn get_ee_pose(&mut self) -> BestmanResult<[f64; 6]> {
        self.ensure_connected("get_ee_pose")?;
        Ok(self.ee_pose)
    }

    fn get_ee_velocity(&mut self) -> BestmanResult<EeVelocity> {
        self.ensure_connected("get_ee_velocity")?;
        Ok(EeVelocity::default())
    }

    fn get_gripper_position(&mut self) -> BestmanResult<f64> {
        self.ensure_connected("get_gripper_position")?;
        Ok(self.gripper_commands.last().copied().unwrap_or(0.))
    }

    fn move_gripper(&mut self, command: f64) -> BestmanResult<bool> {
        check_gripper_command(command)?;
        self.ensure_connected("move_gripper")?;
        self.gripper_commands.push(command);
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
