// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains the time synchronized replay of recorded end effector trajectories.
//!
//! Recorded poses are relative to the start of the recording sensor. Before replaying they are
//! mapped into the robot base frame with
//! `T_target = T_robot_init · T_sensor` where `T_robot_init` is the end effector pose of the
//! robot when the replay starts. The targets are then streamed with [`servo_to_ee_pose`]
//! on the recorded time base, optionally scaled by a speed rate.
//!
//! [`servo_to_ee_pose`]: crate::robot::Robot::servo_to_ee_pose
use std::time::{Duration, Instant};

use nalgebra::Matrix4;
use tracing::{debug, info, warn};

use crate::config::GripperConfig;
use crate::exception::{create_precondition_exception, BestmanResult};
use crate::robot::{ControlMode, Robot};
use crate::utils::{map_sensor_to_robot, rpy_pose_to_homogeneous};

pub mod cancellation;
pub mod trajectory;

use cancellation::CancellationToken;
use trajectory::Trajectory;

/// Replay settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayOptions {
    /// Only every `interval`-th recorded sample is replayed. Has to be at least 1.
    pub interval: usize,
    /// Playback speed relative to the recording, 2.0 replays twice as fast.
    pub speed_rate: f64,
    /// Lateness above which a sample is reported as lagging.
    pub lag_tolerance: Duration,
    /// Width range of the recording gripper, recorded widths are clamped into it.
    pub gripper_range: GripperConfig,
    /// Forward the recorded gripper width on every `n`-th replayed sample.
    /// `None` replays the arm motion only.
    pub gripper_stride: Option<usize>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            interval: 1,
            speed_rate: 1.,
            lag_tolerance: Duration::from_millis(10),
            gripper_range: GripperConfig {
                min_width: 0.,
                max_width: 88.,
            },
            gripper_stride: None,
        }
    }
}

/// One pose to be streamed to the robot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayTarget {
    /// Recorded timestamp. \[s\]
    pub timestamp: f64,
    /// `[x, y, z, roll, pitch, yaw]` in the robot base frame. \[m\], \[rad\]
    pub pose: [f64; 6],
    /// Recorded gripper width clamped into the gripper range, if the recording has one.
    pub gripper_width: Option<f64>,
}

/// Summary of a finished replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Number of servo commands issued.
    pub sent: usize,
    /// Number of samples which were issued later than the lag tolerance allows.
    pub lagged: usize,
    pub max_lag: Duration,
    /// True if the replay stopped because its cancellation token was triggered.
    pub cancelled: bool,
}

/// Streams recorded trajectories to a robot in servo mode.
#[derive(Debug, Clone)]
pub struct TrajectoryReplayer {
    options: ReplayOptions,
    token: CancellationToken,
}

impl TrajectoryReplayer {
    /// # Errors
    /// * [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
    /// if `interval` or `gripper_stride` is zero, `speed_rate` is not a positive number or the
    /// gripper range is empty.
    pub fn new(options: ReplayOptions) -> BestmanResult<Self> {
        if options.interval == 0 {
            return Err(create_precondition_exception(
                "replay interval has to be at least 1",
            ));
        }
        if !options.speed_rate.is_finite() || options.speed_rate <= 0. {
            return Err(create_precondition_exception(format!(
                "replay speed rate has to be a positive number, got {}",
                options.speed_rate
            )));
        }
        if options.gripper_stride == Some(0) {
            return Err(create_precondition_exception(
                "gripper stride has to be at least 1",
            ));
        }
        let range = options.gripper_range;
        if !(range.max_width > range.min_width) {
            return Err(create_precondition_exception(format!(
                "gripper range {}..{} is empty",
                range.min_width, range.max_width
            )));
        }
        Ok(TrajectoryReplayer {
            options,
            token: CancellationToken::new(),
        })
    }

    /// Uses `token` instead of the replayer's own cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token which stops a running replay when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Maps the decimated samples of `trajectory` into the robot base frame.
    /// # Arguments
    /// * `robot_init` - Homogeneous end effector pose the recording is anchored at.
    /// # Errors
    /// * [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
    /// if the trajectory contains no samples.
    pub fn plan(
        &self,
        trajectory: &Trajectory,
        robot_init: &Matrix4<f64>,
    ) -> BestmanResult<Vec<ReplayTarget>> {
        if trajectory.is_empty() {
            return Err(create_precondition_exception(
                "cannot replay an empty trajectory",
            ));
        }
        let range = self.options.gripper_range;
        let targets: Vec<ReplayTarget> = trajectory
            .points()
            .iter()
            .step_by(self.options.interval)
            .map(|point| ReplayTarget {
                timestamp: point.timestamp,
                pose: map_sensor_to_robot(&point.position, &point.orientation, robot_init),
                gripper_width: trajectory
                    .gripper_width_at(point.timestamp)
                    .map(|width| width.clamp(range.min_width, range.max_width)),
            })
            .collect();
        debug!(
            samples = trajectory.len(),
            targets = targets.len(),
            interval = self.options.interval,
            "replay planned"
        );
        Ok(targets)
    }

    /// Streams `targets` to `robot` on their recorded time base.
    ///
    /// Samples are never skipped. If the robot cannot keep up, later samples are sent as soon
    /// as possible and counted as lagging. The replay stops before the next command once the
    /// cancellation token is triggered.
    /// # Errors
    /// * [`PreconditionException`](`crate::exception::BestmanException::PreconditionException`)
    /// if `targets` is empty or the robot is not connected in [`Servo`](`ControlMode::Servo`)
    /// mode.
    /// * Every error of the robot is returned immediately.
    pub fn replay(
        &self,
        robot: &mut dyn Robot,
        targets: &[ReplayTarget],
    ) -> BestmanResult<ReplayReport> {
        if robot.mode() != Some(ControlMode::Servo) {
            return Err(create_precondition_exception(format!(
                "replaying on {} requires servo mode, robot is in {:?}",
                robot.config().label(),
                robot.mode()
            )));
        }
        let first = match targets.first() {
            Some(first) => first.timestamp,
            None => {
                return Err(create_precondition_exception(
                    "cannot replay an empty trajectory",
                ))
            }
        };
        let schedule = targets
            .iter()
            .map(|target| {
                let offset = ((target.timestamp - first) / self.options.speed_rate).max(0.);
                Duration::try_from_secs_f64(offset).map_err(|_| {
                    create_precondition_exception(format!(
                        "sample at {} s cannot be scheduled at speed rate {}",
                        target.timestamp, self.options.speed_rate
                    ))
                })
            })
            .collect::<BestmanResult<Vec<Duration>>>()?;
        let range = self.options.gripper_range;
        let mut report = ReplayReport::default();
        info!(
            robot = %robot.config().label(),
            targets = targets.len(),
            speed_rate = self.options.speed_rate,
            "replay started"
        );
        let start = Instant::now();
        for (index, (target, &scheduled)) in targets.iter().zip(&schedule).enumerate() {
            let elapsed = start.elapsed();
            if scheduled > elapsed {
                if self.token.sleep(scheduled - elapsed) {
                    report.cancelled = true;
                    break;
                }
            } else {
                let lag = elapsed - scheduled;
                if lag > self.options.lag_tolerance {
                    report.lagged += 1;
                    report.max_lag = report.max_lag.max(lag);
                    warn!(
                        sample = index,
                        lag_ms = lag.as_secs_f64() * 1000.,
                        "replay is behind schedule"
                    );
                }
            }
            if self.token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            robot.servo_to_ee_pose(&target.pose)?;
            report.sent += 1;
            if let (Some(stride), Some(width)) = (self.options.gripper_stride, target.gripper_width)
            {
                if index % stride == 0 {
                    let opening = (width - range.min_width) / (range.max_width - range.min_width);
                    robot.move_gripper((1. - opening).clamp(0., 1.))?;
                }
            }
        }
        info!(
            sent = report.sent,
            lagged = report.lagged,
            max_lag_ms = report.max_lag.as_secs_f64() * 1000.,
            cancelled = report.cancelled,
            elapsed_s = start.elapsed().as_secs_f64(),
            "replay finished"
        );
        Ok(report)
    }

    /// Anchors `trajectory` at the current end effector pose of `robot` and replays it.
    pub fn replay_trajectory(
        &self,
        robot: &mut dyn Robot,
        trajectory: &Trajectory,
    ) -> BestmanResult<ReplayReport> {
        let robot_init = rpy_pose_to_homogeneous(&robot.get_ee_pose()?);
        let targets = self.plan(trajectory, &robot_init)?;
        self.replay(robot, &targets)
    }
}
