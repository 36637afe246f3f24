//! Rigid transforms, poses and the axis-angle rotation encoding.
//!
//! All transforms are 4×4 homogeneous matrices with an orthonormal rotation
//! block. Lengths are millimeters and angles radians unless stated otherwise.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

/// A 4×4 homogeneous rigid transform.
pub type Transform = Matrix4<f64>;

/// Rotations whose magnitude is below this are reported with the reference axis.
pub const AXIS_ANGLE_EPSILON: f64 = 1e-8;

/// Axis reported for near-identity rotations.
pub const REFERENCE_AXIS: [f64; 3] = [1.0, 0.0, 0.0];

/// Orientation of a [`Pose`].
///
/// Mountings and colliders arrive as rotation vectors, collision geometry
/// initial poses as quaternions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Orientation {
    /// Unit quaternion (normalized on use)
    Quaternion { x: f64, y: f64, z: f64, w: f64 },

    /// Rotation vector: axis scaled by angle in radians
    RotationVector([f64; 3]),
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::RotationVector([0.0; 3])
    }
}

impl Orientation {
    pub fn to_unit_quaternion(&self) -> UnitQuaternion<f64> {
        match *self {
            Orientation::Quaternion { x, y, z, w } => {
                let q = Quaternion::new(w, x, y, z);
                if q.norm() < f64::EPSILON {
                    UnitQuaternion::identity()
                } else {
                    UnitQuaternion::from_quaternion(q)
                }
            }
            Orientation::RotationVector(v) => UnitQuaternion::from_scaled_axis(Vector3::from(v)),
        }
    }
}

/// A position (mm) plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],

    #[serde(default)]
    pub orientation: Orientation,
}

impl Pose {
    pub fn new(position: [f64; 3], orientation: Orientation) -> Self {
        Self { position, orientation }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Pose from a position and a rotation vector.
    pub fn from_rotation_vector(position: [f64; 3], rotation: [f64; 3]) -> Self {
        Self::new(position, Orientation::RotationVector(rotation))
    }

    /// Homogeneous matrix of this pose.
    pub fn to_matrix(&self) -> Transform {
        let translation = Translation3::new(self.position[0], self.position[1], self.position[2]);
        Isometry3::from_parts(translation, self.orientation.to_unit_quaternion()).to_homogeneous()
    }
}

/// Rotation as a unit axis and an angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    pub axis: [f64; 3],
    pub angle: f64,
}

impl AxisAngle {
    pub fn identity() -> Self {
        Self { axis: REFERENCE_AXIS, angle: 0.0 }
    }

    /// Extracts the axis-angle of a rotation matrix.
    ///
    /// Near-identity rotations keep their (tiny) angle but report
    /// [`REFERENCE_AXIS`] instead of dividing by it.
    pub fn from_rotation(m: &Matrix3<f64>) -> Self {
        Self::from_rotation_vector(Rotation3::from_matrix(m).scaled_axis())
    }

    pub fn from_rotation_vector(v: Vector3<f64>) -> Self {
        let angle = v.norm();
        let axis = if angle > AXIS_ANGLE_EPSILON {
            let a = v / angle;
            [a.x, a.y, a.z]
        } else {
            REFERENCE_AXIS
        };
        Self { axis, angle }
    }
}

/// Splits a rigid transform into its translation and axis-angle rotation.
pub fn decompose(t: &Transform) -> ([f64; 3], AxisAngle) {
    let rotation: Matrix3<f64> = t.fixed_view::<3, 3>(0, 0).into();
    ([t[(0, 3)], t[(1, 3)], t[(2, 3)]], AxisAngle::from_rotation(&rotation))
}

/// Builds a transform from row-major rows.
pub fn from_rows(rows: &[[f64; 4]; 4]) -> Transform {
    Matrix4::from_fn(|r, c| rows[r][c])
}

/// Row-major rows of a transform.
pub fn to_rows(t: &Transform) -> [[f64; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = t[(r, c)];
        }
    }
    rows
}

/// Inverse of a rigid transform (transposed rotation, rotated translation).
pub fn rigid_inverse(t: &Transform) -> Transform {
    let rotation: Matrix3<f64> = t.fixed_view::<3, 3>(0, 0).into();
    let translation = Vector3::new(t[(0, 3)], t[(1, 3)], t[(2, 3)]);
    let inv_rotation = rotation.transpose();
    let inv_translation = -(inv_rotation * translation);

    let mut inv = Matrix4::identity();
    inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&inv_rotation);
    inv.fixed_view_mut::<3, 1>(0, 3).copy_from(&inv_translation);
    inv
}

/// Multiplies only the translation column by `scale`, leaving rotation untouched.
pub fn scale_translation(t: &Transform, scale: f64) -> Transform {
    let mut scaled = *t;
    for r in 0..3 {
        scaled[(r, 3)] *= scale;
    }
    scaled
}

/// Rotation about Z as a homogeneous transform.
pub fn rotation_z(angle: f64) -> Transform {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle).to_homogeneous()
}

/// Rotation about X as a homogeneous transform.
pub fn rotation_x(angle: f64) -> Transform {
    Rotation3::from_axis_angle(&Vector3::x_axis(), angle).to_homogeneous()
}

/// Pure translation as a homogeneous transform.
pub fn translation(x: f64, y: f64, z: f64) -> Transform {
    Translation3::new(x, y, z).to_homogeneous()
}

/// Converts right-handed Y-up coordinates (mesh authoring tools) into the
/// right-handed Z-up convention of the kinematic chain.
///
/// `(x, y, z) -> (x, -z, y)`
#[rustfmt::skip]
pub fn y_up_to_z_up() -> Transform {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, -1.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Inverse of [`y_up_to_z_up`].
pub fn z_up_to_y_up() -> Transform {
    y_up_to_z_up().transpose()
}
