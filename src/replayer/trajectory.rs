// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains recorded trajectories and the loaders for the recorder's on-disk layout.
//!
//! A recording root contains one directory per recording run,
//! `multi_sessions_YYYYMMDD_HHMMSS`, each holding numbered `session_NNN` directories:
//! ```text
//! session_001/
//! ├── Merged_Trajectory/merged_trajectory.txt   timestamp x y z qx qy qz qw
//! └── Clamp_Data/clamp_data_tum.txt             timestamp ... width
//! ```
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nalgebra::UnitQuaternion;
use tracing::{debug, warn};

use crate::exception::{BestmanException, BestmanResult};
use crate::utils::{normalize_quaternion, QuaternionOrder};

/// Prefix of recording run directories.
pub const MULTI_SESSION_PREFIX: &str = "multi_sessions";
/// Prefix of session directories inside a recording run.
pub const SESSION_PREFIX: &str = "session_";
/// Location of the pose table inside a session directory.
pub const POSE_TABLE: [&str; 2] = ["Merged_Trajectory", "merged_trajectory.txt"];
/// Location of the gripper width table inside a session directory.
pub const GRIPPER_TABLE: [&str; 2] = ["Clamp_Data", "clamp_data_tum.txt"];

const POSE_COLUMNS: usize = 8;

/// One recorded pose sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    /// \[s\]
    pub timestamp: f64,
    /// \[m\]
    pub position: [f64; 3],
    pub orientation: UnitQuaternion<f64>,
}

/// One recorded gripper opening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperWidthSample {
    /// \[s\]
    pub timestamp: f64,
    /// Opening in device units, \[mm\] for the recorder.
    pub width: f64,
}

/// Recorded pose samples and an independently sampled gripper width sequence.
///
/// Both sequences are ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
    gripper: Option<Vec<GripperWidthSample>>,
}

impl Trajectory {
    /// Creates a trajectory from samples ordered by timestamp.
    /// # Errors
    /// * [`TrajectoryException`](`crate::exception::BestmanException::TrajectoryException`)
    /// if a sequence is not ordered by finite timestamps or a sample is not finite.
    pub fn new(
        points: Vec<TrajectoryPoint>,
        gripper: Option<Vec<GripperWidthSample>>,
    ) -> BestmanResult<Self> {
        if !is_ordered(points.iter().map(|point| point.timestamp)) {
            return Err(create_trajectory_exception(
                "pose samples are not ordered by finite timestamps",
            ));
        }
        if let Some(point) = points.iter().find(|point| {
            !point.position.iter().all(|value| value.is_finite())
                || !point.orientation.coords.iter().all(|value| value.is_finite())
        }) {
            return Err(create_trajectory_exception(format!(
                "pose sample at {} s is not finite",
                point.timestamp
            )));
        }
        if let Some(samples) = gripper.as_ref() {
            if !is_ordered(samples.iter().map(|sample| sample.timestamp)) {
                return Err(create_trajectory_exception(
                    "gripper samples are not ordered by finite timestamps",
                ));
            }
            if samples.iter().any(|sample| !sample.width.is_finite()) {
                return Err(create_trajectory_exception("gripper width is not finite"));
            }
        }
        Ok(Trajectory { points, gripper })
    }

    /// Reads a pose table and an optional gripper table.
    ///
    /// A gripper table which does not exist is reported as a warning and the trajectory is
    /// pose only.
    /// # Errors
    /// * [`TrajectoryException`](`crate::exception::BestmanException::TrajectoryException`)
    /// if a file cannot be read.
    pub fn from_files(
        pose_table: &Path,
        gripper_table: Option<&Path>,
        order: QuaternionOrder,
    ) -> BestmanResult<Self> {
        let points = parse_pose_table(&read_table(pose_table)?, order);
        let gripper = match gripper_table {
            Some(path) if path.exists() => Some(parse_gripper_table(&read_table(path)?)),
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "gripper table not found, replaying poses only"
                );
                None
            }
            None => None,
        };
        debug!(
            path = %pose_table.display(),
            points = points.len(),
            gripper_samples = gripper.as_ref().map(Vec::len),
            "trajectory loaded"
        );
        Ok(Trajectory { points, gripper })
    }

    /// Reads the pose and gripper tables of a session directory.
    pub fn load_session(session: &Path, order: QuaternionOrder) -> BestmanResult<Self> {
        let pose_table: PathBuf = POSE_TABLE.iter().fold(session.to_path_buf(), |p, c| p.join(c));
        let gripper_table: PathBuf =
            GRIPPER_TABLE.iter().fold(session.to_path_buf(), |p, c| p.join(c));
        Trajectory::from_files(&pose_table, Some(&gripper_table), order)
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn gripper(&self) -> Option<&[GripperWidthSample]> {
        self.gripper.as_deref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Duration between the first and the last pose sample. \[s\]
    pub fn duration(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.,
        }
    }

    /// Width of the gripper sample closest in time to `timestamp`.
    ///
    /// If two samples are equally close the earlier one is used.
    /// Returns `None` for pose only trajectories.
    pub fn gripper_width_at(&self, timestamp: f64) -> Option<f64> {
        let samples = self.gripper.as_deref()?;
        let after = samples.partition_point(|sample| sample.timestamp < timestamp);
        let nearest = match (after.checked_sub(1), samples.get(after)) {
            (None, Some(next)) => next,
            (Some(before), None) => &samples[before],
            (Some(before), Some(next)) => {
                let before = &samples[before];
                if next.timestamp - timestamp < timestamp - before.timestamp {
                    next
                } else {
                    before
                }
            }
            (None, None) => return None,
        };
        Some(nearest.width)
    }
}

/// True if all timestamps are finite and non decreasing.
fn is_ordered(mut timestamps: impl Iterator<Item = f64>) -> bool {
    let mut previous = f64::NEG_INFINITY;
    timestamps.all(|timestamp| {
        let ordered = timestamp.is_finite() && timestamp >= previous;
        previous = timestamp;
        ordered
    })
}

fn create_trajectory_exception(message: impl Into<String>) -> BestmanException {
    BestmanException::TrajectoryException {
        message: message.into(),
    }
}

fn read_table(path: &Path) -> BestmanResult<String> {
    fs::read_to_string(path).map_err(|error| {
        create_trajectory_exception(format!("cannot read {}: {}", path.display(), error))
    })
}

/// Numeric rows of a whitespace separated table with their line number.
///
/// Blank lines and lines starting with `#` are ignored, rows with non numeric or non finite
/// fields are skipped with a warning.
fn numeric_rows(content: &str) -> impl Iterator<Item = (usize, Vec<f64>)> + '_ {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|(line_number, line)| {
            match line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<f64>, _>>()
            {
                Ok(values) if values.iter().all(|value| value.is_finite()) => {
                    Some((line_number, values))
                }
                Ok(_) => {
                    warn!(line = line_number, "skipping row with non finite values");
                    None
                }
                Err(error) => {
                    warn!(line = line_number, %error, "skipping non numeric row");
                    None
                }
            }
        })
}

/// Keeps a row only if its timestamp does not go back in time.
fn monotonic(previous: &mut Option<f64>, line_number: usize, timestamp: f64) -> bool {
    if matches!(*previous, Some(last) if timestamp < last) || !timestamp.is_finite() {
        warn!(line = line_number, timestamp, "skipping row out of time order");
        return false;
    }
    *previous = Some(timestamp);
    true
}

/// Parses rows of `timestamp x y z q0 q1 q2 q3` with the quaternion in `order`.
///
/// Malformed rows are skipped with a warning.
pub fn parse_pose_table(content: &str, order: QuaternionOrder) -> Vec<TrajectoryPoint> {
    let mut previous = None;
    numeric_rows(content)
        .filter_map(|(line_number, values)| {
            if values.len() != POSE_COLUMNS {
                warn!(
                    line = line_number,
                    fields = values.len(),
                    "skipping pose row without {} fields",
                    POSE_COLUMNS
                );
                return None;
            }
            if !monotonic(&mut previous, line_number, values[0]) {
                return None;
            }
            let quaternion = order.to_quaternion(&[values[4], values[5], values[6], values[7]]);
            Some(TrajectoryPoint {
                timestamp: values[0],
                position: [values[1], values[2], values[3]],
                orientation: normalize_quaternion(&quaternion),
            })
        })
        .collect()
}

/// Parses rows of `timestamp ... width`, the width is taken from the last column.
pub fn parse_gripper_table(content: &str) -> Vec<GripperWidthSample> {
    let mut previous = None;
    numeric_rows(content)
        .filter_map(|(line_number, values)| {
            if values.len() < 2 {
                warn!(line = line_number, "skipping gripper row without width");
                return None;
            }
            if !monotonic(&mut previous, line_number, values[0]) {
                return None;
            }
            Some(GripperWidthSample {
                timestamp: values[0],
                width: values[values.len() - 1],
            })
        })
        .collect()
}

fn subdirectories(parent: &Path, prefix: &str) -> BestmanResult<Vec<PathBuf>> {
    let entries = fs::read_dir(parent).map_err(|error| {
        create_trajectory_exception(format!("cannot list {}: {}", parent.display(), error))
    })?;
    let mut directories = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error: io::Error| {
            create_trajectory_exception(format!("cannot list {}: {}", parent.display(), error))
        })?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with(prefix));
        if matches && path.is_dir() {
            directories.push(path);
        }
    }
    Ok(directories)
}

fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}

/// Extracts `YYYYMMDDHHMMSS` from a `multi_sessions_YYYYMMDD_HHMMSS` directory name.
fn recording_time(name: &str) -> Option<String> {
    let stamp = name.strip_prefix(MULTI_SESSION_PREFIX)?.strip_prefix('_')?;
    let (date, time) = stamp.get(..15)?.split_once('_')?;
    let digits = |part: &str, len: usize| part.len() == len && part.bytes().all(|b| b.is_ascii_digit());
    if digits(date, 8) && digits(time, 6) {
        Some(format!("{}{}", date, time))
    } else {
        None
    }
}

/// Lists the recording run directories below `root`, newest first.
///
/// Directories without a parsable time stamp in their name come last.
/// # Errors
/// * [`TrajectoryException`](`crate::exception::BestmanException::TrajectoryException`)
/// if `root` cannot be read or contains no recording run.
pub fn list_multi_sessions(root: &Path) -> BestmanResult<Vec<PathBuf>> {
    let mut runs = subdirectories(root, MULTI_SESSION_PREFIX)?;
    if runs.is_empty() {
        return Err(create_trajectory_exception(format!(
            "no {}* directory in {}",
            MULTI_SESSION_PREFIX,
            root.display()
        )));
    }
    runs.sort_by(|a, b| {
        let key_a = (recording_time(file_name(a)), file_name(a));
        let key_b = (recording_time(file_name(b)), file_name(b));
        key_b.cmp(&key_a)
    });
    Ok(runs)
}

/// Lists the session directories of a recording run in ascending order.
pub fn list_sessions(multi_session: &Path) -> BestmanResult<Vec<PathBuf>> {
    let mut sessions = subdirectories(multi_session, SESSION_PREFIX)?;
    if sessions.is_empty() {
        return Err(create_trajectory_exception(format!(
            "no {}* directory in {}",
            SESSION_PREFIX,
            multi_session.display()
        )));
    }
    sessions.sort();
    Ok(sessions)
}

/// Last session of the newest recording run below `root`.
pub fn latest_session(root: &Path) -> BestmanResult<PathBuf> {
    let runs = list_multi_sessions(root)?;
    let newest = &runs[0];
    let mut sessions = list_sessions(newest)?;
    sessions
        .pop()
        .ok_or_else(|| create_trajectory_exception("recording run without sessions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    const POSES: &str = "\
# timestamp x y z qx qy qz qw
0.0 0.0 0.0 0.0 0 0 0 1
0.1 0.01 0.0 0.0 0 0 0 1

0.2 0.02 0.0 0.0 0 0 0.7071068 0.7071068
0.3 0.03 0.0
0.4 0.04 0.0 0.0 0 0 zero 1
0.15 0.05 0.0 0.0 0 0 0 1
0.5 0.05 0.0 0.0 0 0 0 2
";

    #[test]
    fn malformed_pose_rows_are_skipped() {
        let points = parse_pose_table(POSES, QuaternionOrder::Xyzw);
        let timestamps: Vec<f64> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 0.1, 0.2, 0.5]);
        assert_eq!(points[1].position, [0.01, 0., 0.]);
        assert!((points[2].orientation.euler_angles().2 - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        // unnormalized quaternions are normalized
        assert!((points[3].orientation.w - 1.).abs() < 1e-12);
    }

    #[test]
    fn non_finite_rows_are_skipped() {
        let points = parse_pose_table(
            "0 nan 0 0 0 0 0 1\n0.1 0 0 0 inf 0 0 1\n0.2 0 0 0 0 0 0 infinity\ninf 0 0 0 0 0 0 1\n0.3 0.01 0 0 0 0 0 1\n",
            QuaternionOrder::Xyzw,
        );
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, 0.3);
        assert_eq!(points[0].position, [0.01, 0., 0.]);

        let samples = parse_gripper_table("0.0 NaN\n0.1 40\n");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].width, 40.);
    }

    #[test]
    fn quaternion_order_is_explicit() {
        let row = "0.0 0 0 0 0.7071068 0 0 0.7071068";
        let xyzw = parse_pose_table(row, QuaternionOrder::Xyzw);
        let wxyz = parse_pose_table(row, QuaternionOrder::Wxyz);
        assert!((xyzw[0].orientation.euler_angles().0 - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((wxyz[0].orientation.euler_angles().2 - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn gripper_width_is_last_column() {
        let samples = parse_gripper_table("0.0 1 2 80.5\n0.1 79\n0.2\n");
        assert_eq!(
            samples,
            vec![
                GripperWidthSample {
                    timestamp: 0.0,
                    width: 80.5
                },
                GripperWidthSample {
                    timestamp: 0.1,
                    width: 79.
                },
            ]
        );
    }

    #[test]
    fn nearest_gripper_sample_prefers_earlier_on_tie() {
        let gripper = vec![
            GripperWidthSample {
                timestamp: 0.0,
                width: 10.,
            },
            GripperWidthSample {
                timestamp: 1.0,
                width: 20.,
            },
            GripperWidthSample {
                timestamp: 2.0,
                width: 30.,
            },
        ];
        let trajectory = Trajectory::new(Vec::new(), Some(gripper)).unwrap();
        assert_eq!(trajectory.gripper_width_at(-1.), Some(10.));
        assert_eq!(trajectory.gripper_width_at(0.4), Some(10.));
        assert_eq!(trajectory.gripper_width_at(0.5), Some(10.));
        assert_eq!(trajectory.gripper_width_at(0.6), Some(20.));
        assert_eq!(trajectory.gripper_width_at(1.0), Some(20.));
        assert_eq!(trajectory.gripper_width_at(1.5), Some(20.));
        assert_eq!(trajectory.gripper_width_at(7.0), Some(30.));
        assert_eq!(Trajectory::default().gripper_width_at(1.0), None);
        assert_eq!(
            Trajectory::new(Vec::new(), Some(Vec::new()))
                .unwrap()
                .gripper_width_at(1.0),
            None
        );
    }

    #[test]
    fn unordered_samples_are_rejected() {
        let point = |timestamp| TrajectoryPoint {
            timestamp,
            position: [0.; 3],
            orientation: UnitQuaternion::identity(),
        };
        assert!(Trajectory::new(vec![point(1.), point(0.)], None).is_err());
        assert!(matches!(
            Trajectory::new(vec![point(0.), point(f64::INFINITY)], None),
            Err(BestmanException::TrajectoryException { .. })
        ));
        assert!(Trajectory::new(vec![point(f64::NAN)], None).is_err());
        let mut unreachable = point(0.);
        unreachable.position[1] = f64::NAN;
        assert!(Trajectory::new(vec![unreachable], None).is_err());
        let gripper = vec![GripperWidthSample {
            timestamp: f64::INFINITY,
            width: 10.,
        }];
        assert!(Trajectory::new(Vec::new(), Some(gripper)).is_err());
        let trajectory = Trajectory::new(vec![point(1.), point(1.5)], None).unwrap();
        assert_eq!(trajectory.len(), 2);
        assert!((trajectory.duration() - 0.5).abs() < 1e-12);
    }

    fn write_session(session: &Path, with_gripper: bool) {
        create_dir_all(session.join("Merged_Trajectory")).unwrap();
        write(
            session.join("Merged_Trajectory").join("merged_trajectory.txt"),
            "0.0 0 0 0 0 0 0 1\n0.1 0.01 0 0 0 0 0 1\n",
        )
        .unwrap();
        if with_gripper {
            create_dir_all(session.join("Clamp_Data")).unwrap();
            write(
                session.join("Clamp_Data").join("clamp_data_tum.txt"),
                "0.0 0 0 0 0 0 0 1 40\n",
            )
            .unwrap();
        }
    }

    #[test]
    fn sessions_are_discovered() {
        let root = tempdir().unwrap();
        let old = root.path().join("multi_sessions_20241113_101500");
        let new = root.path().join("multi_sessions_20241114_090000");
        write_session(&old.join("session_001"), true);
        write_session(&new.join("session_001"), true);
        write_session(&new.join("session_002"), false);
        create_dir_all(root.path().join("multi_sessions_unlabelled")).unwrap();
        write(root.path().join("multi_sessions_notes.txt"), "not a directory").unwrap();

        let runs = list_multi_sessions(root.path()).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], new);
        assert_eq!(runs[1], old);
        assert_eq!(
            list_sessions(&new).unwrap(),
            vec![new.join("session_001"), new.join("session_002")]
        );
        assert_eq!(latest_session(root.path()).unwrap(), new.join("session_002"));
    }

    #[test]
    fn session_without_gripper_is_pose_only() {
        let root = tempdir().unwrap();
        let session = root.path().join("session_001");
        write_session(&session, false);
        let trajectory = Trajectory::load_session(&session, QuaternionOrder::Xyzw).unwrap();
        assert_eq!(trajectory.len(), 2);
        assert!(trajectory.gripper().is_none());

        write_session(&session, true);
        let trajectory = Trajectory::load_session(&session, QuaternionOrder::Xyzw).unwrap();
        assert_eq!(trajectory.gripper_width_at(0.1), Some(40.));
    }

    #[test]
    fn missing_files_are_reported() {
        let root = tempdir().unwrap();
        assert!(matches!(
            Trajectory::load_session(root.path(), QuaternionOrder::Xyzw),
            Err(BestmanException::TrajectoryException { .. })
        ));
        assert!(matches!(
            list_multi_sessions(root.path()),
            Err(BestmanException::TrajectoryException { .. })
        ));
    }
}
