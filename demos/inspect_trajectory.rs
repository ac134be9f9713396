// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

use std::path::PathBuf;

use clap::{CommandFactory, ErrorKind, Parser};
use nalgebra::Matrix4;

use bestman::replayer::trajectory::latest_session;
use bestman::utils::rpy_pose_to_homogeneous;
use bestman::{BestmanResult, QuaternionOrder, ReplayOptions, Trajectory, TrajectoryReplayer};

/// Loads a recorded session and prints the targets a replay would send to the robot.
#[derive(Parser, Debug)]
#[clap(author, version, name = "inspect_trajectory")]
struct CommandLineArguments {
    /// Session directory, or a recording root when used with --latest
    path: PathBuf,

    /// Use the last session of the newest recording run below PATH
    #[clap(short, long, action)]
    latest: bool,

    /// Quaternions in the pose table are stored as w x y z instead of x y z w
    #[clap(long, action)]
    wxyz: bool,

    /// Replay only every n-th sample
    #[clap(short, long, default_value_t = 1)]
    interval: usize,

    /// Playback speed relative to the recording
    #[clap(short, long, default_value_t = 1.0)]
    speed_rate: f64,

    /// End effector pose the recording is anchored at: x y z roll pitch yaw (given once)
    #[clap(long, number_of_values = 6, allow_hyphen_values = true)]
    start_pose: Option<Vec<f64>>,
}

fn main() -> BestmanResult<()> {
    tracing_subscriber::fmt::init();
    let args: CommandLineArguments = CommandLineArguments::parse();
    let session = match args.latest {
        true => latest_session(&args.path)?,
        false => args.path,
    };
    let order = match args.wxyz {
        true => QuaternionOrder::Wxyz,
        false => QuaternionOrder::Xyzw,
    };
    let trajectory = Trajectory::load_session(&session, order)?;
    let replayer = TrajectoryReplayer::new(ReplayOptions {
        interval: args.interval,
        speed_rate: args.speed_rate,
        ..Default::default()
    })?;
    let robot_init = match args.start_pose {
        Some(pose) => match <[f64; 6]>::try_from(pose.as_slice()) {
            Ok(start) => rpy_pose_to_homogeneous(&start),
            Err(_) => CommandLineArguments::command()
                .error(
                    ErrorKind::WrongNumberOfValues,
                    format!("--start-pose takes 6 values once, got {}", pose.len()),
                )
                .exit(),
        },
        None => Matrix4::identity(),
    };
    let targets = replayer.plan(&trajectory, &robot_init)?;
    println!(
        "{}: {} samples over {:.2} s, {} targets",
        session.display(),
        trajectory.len(),
        trajectory.duration(),
        targets.len()
    );
    let first = targets[0].timestamp;
    for target in &targets {
        let pose = target.pose;
        print!(
            "{:8.3} s  [{:7.4} {:7.4} {:7.4}] [{:7.4} {:7.4} {:7.4}]",
            (target.timestamp - first) / args.speed_rate,
            pose[0],
            pose[1],
            pose[2],
            pose[3],
            pose[4],
            pose[5]
        );
        match target.gripper_width {
            Some(width) => println!("  gripper {:5.1}", width),
            None => println!(),
        }
    }
    Ok(())
}
