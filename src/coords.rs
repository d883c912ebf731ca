//! Right-handed native frame to left-handed engine frame conversion.
//!
//! Native APIs use X = right, Y = up, Z = back (right-handed). The engine uses
//! X = right, Y = up, Z = forward (left-handed). The handedness conversions are
//! their own inverse, so the same function maps engine values back to native ones.

use glam::{Mat4, Quat, Vec2, Vec3};

const Z_FLIP: Vec3 = Vec3::new(1.0, 1.0, -1.0);

/// Conjugate a transform by the Z-axis reflection: `F * m * F`, `F = diag(1, 1, -1, 1)`.
pub fn flip_handedness(m: Mat4) -> Mat4 {
    let f = Mat4::from_scale(Z_FLIP);
    f * m * f
}

/// A rigid pose in engine space, derived from a transform matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3 {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose3 {
    /// Decompose an engine-space rigid transform.
    pub fn from_matrix(m: Mat4) -> Self {
        let (_, orientation, position) = m.to_scale_rotation_translation();
        Pose3 {
            position,
            orientation: orientation.normalize(),
        }
    }

    /// Build from a right-handed transform matrix (column-major).
    pub fn from_right_handed(m: Mat4) -> Self {
        Self::from_matrix(flip_handedness(m))
    }

    /// Build from a right-handed position and rotation.
    pub fn from_right_handed_parts(position: Vec3, orientation: Quat) -> Self {
        Self::from_right_handed(Mat4::from_rotation_translation(orientation, position))
    }

    /// Build from a native row-major `float[4][4]` right-handed transform.
    pub fn from_native_row_major(raw: &[f32; 16]) -> Self {
        Self::from_right_handed(Mat4::from_cols_array(raw).transpose())
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }
}

/// Orientation from a raw phone/headset stream: `(x, y, -z, w)`.
pub fn stream_orientation(x: f32, y: f32, z: f32, w: f32) -> Quat {
    Quat::from_xyzw(x, y, -z, w)
}

/// Orientation from the controller API, via the pose-matrix handedness flip.
pub fn controller_orientation(native: Quat) -> Quat {
    Pose3::from_right_handed_parts(Vec3::ZERO, native).orientation
}

/// Angular velocity: `(-x, -y, +z)`.
///
/// Handedness flips the rotational sense of every axis, and the Z axis itself
/// is reversed, so only Z ends up with its native sign.
pub fn angular_velocity(native: Vec3) -> Vec3 {
    Vec3::new(-native.x, -native.y, native.z)
}

/// Linear acceleration: `(x, y, -z)`. No chirality correction for translations.
pub fn acceleration(native: Vec3) -> Vec3 {
    native * Z_FLIP
}

/// Positions follow the same rule as accelerations.
pub fn position(native: Vec3) -> Vec3 {
    native * Z_FLIP
}

/// Touchpad positions are already normalized 2D and need no conversion.
pub fn touch_position(x: f32, y: f32) -> Vec2 {
    Vec2::new(x, y)
}

/// Re-express a phone-frame vector in controller convention.
///
/// A phone held as a controller lies flat, so its Y and Z axes trade places.
/// This is a +90° rotation about X: `(x, y, z) -> (x, -z, y)`.
pub fn phone_to_controller(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

/// Inverse of [`phone_to_controller`].
pub fn controller_to_phone(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Apply [`phone_to_controller`] to a rotation.
pub fn phone_to_controller_orientation(q: Quat) -> Quat {
    let axis = phone_to_controller(Vec3::new(q.x, q.y, q.z));
    Quat::from_xyzw(axis.x, axis.y, axis.z, q.w)
}

/// Yaw (rotation about +Y) of an engine orientation, in radians.
pub fn yaw(q: Quat) -> f32 {
    q.to_euler(glam::EulerRot::YXZ).0
}

/// True when two quaternions describe the same rotation within `eps`.
pub fn same_rotation(a: Quat, b: Quat, eps: f32) -> bool {
    a.dot(b).abs() >= 1.0 - eps
}
