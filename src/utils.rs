// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! contains pose representation conversions and frame composition functions.
//!
//! Conventions used throughout this crate:
//! * positions are in meters,
//! * Euler angles are (roll, pitch, yaw) in radians, rotating about the fixed x, y and z axes
//!   in that order (the same convention as [`UnitQuaternion::from_euler_angles`]),
//! * a pose vector is `[x, y, z, roll, pitch, yaw]`,
//! * quaternions stored in plain arrays always travel together with a [`QuaternionOrder`].
use nalgebra::{Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Quaternions with a norm below this value are treated as degenerate.
pub const QUATERNION_NORM_EPSILON: f64 = 1e-9;

/// Order of the four components of a quaternion stored in a plain array.
///
/// Recorders and vendor SDKs disagree on this, so the order is always stated explicitly
/// where an array is turned into a [`Quaternion`] and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuaternionOrder {
    /// `[w, x, y, z]`
    Wxyz,
    /// `[x, y, z, w]`
    Xyzw,
}

impl QuaternionOrder {
    /// Interprets `components` in this order.
    pub fn to_quaternion(self, components: &[f64; 4]) -> Quaternion<f64> {
        match self {
            QuaternionOrder::Wxyz => {
                Quaternion::new(components[0], components[1], components[2], components[3])
            }
            QuaternionOrder::Xyzw => {
                Quaternion::new(components[3], components[0], components[1], components[2])
            }
        }
    }

    /// Writes the components of `quaternion` in this order.
    pub fn to_array(self, quaternion: &Quaternion<f64>) -> [f64; 4] {
        match self {
            QuaternionOrder::Wxyz => [quaternion.w, quaternion.i, quaternion.j, quaternion.k],
            QuaternionOrder::Xyzw => [quaternion.i, quaternion.j, quaternion.k, quaternion.w],
        }
    }
}

/// Divides a quaternion by its norm.
///
/// Degenerate quaternions (norm below [`QUATERNION_NORM_EPSILON`]) fall back to the identity
/// rotation.
pub fn normalize_quaternion(quaternion: &Quaternion<f64>) -> UnitQuaternion<f64> {
    match UnitQuaternion::try_new(*quaternion, QUATERNION_NORM_EPSILON) {
        Some(unit) => unit,
        None => {
            warn!(
                norm = quaternion.norm(),
                "degenerate quaternion replaced by identity rotation"
            );
            UnitQuaternion::identity()
        }
    }
}

/// Converts a quaternion to (roll, pitch, yaw).
///
/// The argument of the arcsine is clamped into \[-1, 1\], so at the gimbal lock singularity
/// the pitch is exactly ±π/2.
///
/// # Arguments
/// * `quaternion` - Rotation, does not need to be normalized.
/// # Return
/// `[roll, pitch, yaw]` in radians.
pub fn quaternion_to_euler(quaternion: &Quaternion<f64>) -> [f64; 3] {
    let q = normalize_quaternion(quaternion);
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);

    let sin_roll_cos_pitch = 2. * (w * x + y * z);
    let cos_roll_cos_pitch = 1. - 2. * (x * x + y * y);
    let roll = f64::atan2(sin_roll_cos_pitch, cos_roll_cos_pitch);

    let sin_pitch = (2. * (w * y - z * x)).clamp(-1., 1.);
    let pitch = sin_pitch.asin();

    let sin_yaw_cos_pitch = 2. * (w * z + x * y);
    let cos_yaw_cos_pitch = 1. - 2. * (y * y + z * z);
    let yaw = f64::atan2(sin_yaw_cos_pitch, cos_yaw_cos_pitch);

    [roll, pitch, yaw]
}

/// Converts (roll, pitch, yaw) in radians to a unit quaternion.
///
/// Inverse of [`quaternion_to_euler`] away from the pitch singularity.
pub fn euler_to_quaternion(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();

    let w = cr * cp * cy + sr * sp * sy;
    let x = sr * cp * cy - cr * sp * sy;
    let y = cr * sp * cy + sr * cp * sy;
    let z = cr * cp * sy - sr * sp * cy;
    UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z))
}

/// creates a 4x4 homogeneous transformation from a position and a quaternion
pub fn quaternion_pose_to_homogeneous(
    position: &[f64; 3],
    orientation: &Quaternion<f64>,
) -> Matrix4<f64> {
    Isometry3::from_parts(
        Translation3::new(position[0], position[1], position[2]),
        normalize_quaternion(orientation),
    )
    .to_homogeneous()
}

/// creates a 4x4 homogeneous transformation from `[x, y, z, roll, pitch, yaw]`
pub fn rpy_pose_to_homogeneous(pose: &[f64; 6]) -> Matrix4<f64> {
    Isometry3::from_parts(
        Translation3::new(pose[0], pose[1], pose[2]),
        euler_to_quaternion(pose[3], pose[4], pose[5]),
    )
    .to_homogeneous()
}

/// Splits a homogeneous transformation into its translation column and rotation block.
pub fn homogeneous_to_quaternion_pose(transform: &Matrix4<f64>) -> ([f64; 3], UnitQuaternion<f64>) {
    let rotation: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rotation));
    (
        [transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]],
        rotation,
    )
}

/// converts a homogeneous transformation to `[x, y, z, roll, pitch, yaw]`
pub fn homogeneous_to_rpy_pose(transform: &Matrix4<f64>) -> [f64; 6] {
    let (position, rotation) = homogeneous_to_quaternion_pose(transform);
    let [roll, pitch, yaw] = quaternion_to_euler(rotation.quaternion());
    [position[0], position[1], position[2], roll, pitch, yaw]
}

/// Inverts a rigid body transformation.
pub fn invert_homogeneous_transform(transform: &Matrix4<f64>) -> Matrix4<f64> {
    let (position, rotation) = homogeneous_to_quaternion_pose(transform);
    Isometry3::from_parts(
        Translation3::new(position[0], position[1], position[2]),
        rotation,
    )
    .inverse()
    .to_homogeneous()
}

/// Composes two frames: the result maps from the frame of `b` into the frame of `a`.
pub fn compose_frames(a: &Matrix4<f64>, b: &Matrix4<f64>) -> Matrix4<f64> {
    a * b
}

/// Maps a pose recorded relative to a moving sensor into the robot base frame.
///
/// `T_target = T_robot_init · T_sensor_relative`
///
/// # Arguments
/// * `position` - Recorded position relative to the sensor start. \[m\]
/// * `orientation` - Recorded orientation relative to the sensor start.
/// * `robot_init` - Pose of the robot end effector when the replay starts.
/// # Return
/// Target pose `[x, y, z, roll, pitch, yaw]` in the robot base frame.
pub fn map_sensor_to_robot(
    position: &[f64; 3],
    orientation: &Quaternion<f64>,
    robot_init: &Matrix4<f64>,
) -> [f64; 6] {
    let sensor_relative = quaternion_pose_to_homogeneous(position, orientation);
    homogeneous_to_rpy_pose(&compose_frames(robot_init, &sensor_relative))
}

/// Rotates `vector` by `quaternion`, computed as `q · (0, v) · q⁻¹`.
pub fn rotate_vector_by_quaternion(
    quaternion: &Quaternion<f64>,
    vector: &Vector3<f64>,
) -> Vector3<f64> {
    let q = normalize_quaternion(quaternion).into_inner();
    let rotated = q * Quaternion::from_imag(*vector) * q.conjugate();
    rotated.imag()
}

/// Shifts a tool center point along the local -Z axis of the end effector.
///
/// Non-parallel grippers move their grasp point along the approach axis while opening
/// and closing.
///
/// # Arguments
/// * `position` - Current end effector position. \[m\]
/// * `orientation` - Current end effector orientation.
/// * `distance` - Offset along the local Z axis, positive values move towards the object. \[m\]
pub fn compensate_tcp_for_gripper(
    position: &[f64; 3],
    orientation: &UnitQuaternion<f64>,
    distance: f64,
) -> [f64; 3] {
    let z_axis = orientation * Vector3::z();
    [
        position[0] - distance * z_axis.x,
        position[1] - distance * z_axis.y,
        position[2] - distance * z_axis.z,
    ]
}
