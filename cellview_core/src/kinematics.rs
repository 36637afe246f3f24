//! Forward kinematics over a Denavit–Hartenberg chain.
//!
//! # Convention
//!
//! Every joint uses the classic DH composition
//!
//! ```text
//! T_i = RotZ(theta_i + q_i) · TransZ(d_i) · TransX(a_i) · RotX(alpha_i)
//! ```
//!
//! and frames accumulate left to right starting from the mounting pose:
//! `frame[0] = mounting`, `frame[i] = frame[i-1] · T_i`. The mesh binder
//! relies on the same convention for its zero-angle correction.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{CellviewError, Result};
use crate::pose::{self, Pose, Transform};

/// One joint's DH quadruple. Lengths in mm, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DhParameter {
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub d: f64,
    #[serde(default)]
    pub theta: f64,

    /// Joint value is subtracted from `theta` instead of added
    #[serde(default)]
    pub reverse_rotation_direction: bool,
}

impl DhParameter {
    pub fn new(a: f64, alpha: f64, d: f64, theta: f64) -> Self {
        Self {
            a,
            alpha,
            d,
            theta,
            reverse_rotation_direction: false,
        }
    }

    /// Joint angle including the DH offset.
    pub fn joint_angle(&self, joint_value: f64) -> f64 {
        if self.reverse_rotation_direction {
            self.theta - joint_value
        } else {
            self.theta + joint_value
        }
    }

    /// Link transform for a joint value.
    pub fn transform(&self, joint_value: f64) -> Transform {
        pose::rotation_z(self.joint_angle(joint_value))
            * pose::translation(0.0, 0.0, self.d)
            * pose::translation(self.a, 0.0, 0.0)
            * pose::rotation_x(self.alpha)
    }
}

/// DH forward-kinematics evaluator for one robot instance.
///
/// Immutable after construction; cheap to share between threads.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    dh_parameters: Vec<DhParameter>,
    mounting: Transform,
}

impl KinematicChain {
    /// Creates a chain from its DH table and mounting pose.
    ///
    /// An empty table is a structural configuration error.
    pub fn new(dh_parameters: Vec<DhParameter>, mounting: &Pose) -> Result<Self> {
        if dh_parameters.is_empty() {
            return Err(CellviewError::MissingDhTable);
        }

        Ok(Self {
            dh_parameters,
            mounting: mounting.to_matrix(),
        })
    }

    pub fn joint_count(&self) -> usize {
        self.dh_parameters.len()
    }

    pub fn dh_parameters(&self) -> &[DhParameter] {
        &self.dh_parameters
    }

    pub fn mounting(&self) -> &Transform {
        &self.mounting
    }

    /// Computes `joint_count + 1` world frames; `frames[0]` is the mounting.
    pub fn forward(&self, joints: &[f64]) -> Result<Vec<Transform>> {
        if joints.len() != self.dh_parameters.len() {
            return Err(CellviewError::DimensionMismatch {
                expected: self.dh_parameters.len(),
                actual: joints.len(),
            });
        }

        let mut accumulated = self.mounting;
        let mut frames = Vec::with_capacity(joints.len() + 1);
        frames.push(accumulated);

        for (dh, &q) in self.dh_parameters.iter().zip(joints) {
            accumulated *= dh.transform(q);
            frames.push(accumulated);
        }

        Ok(frames)
    }

    /// Origin of every frame, mounting first.
    pub fn joint_positions(&self, joints: &[f64]) -> Result<Vec<Point3<f64>>> {
        Ok(frame_origins(&self.forward(joints)?))
    }
}

/// Translation of each frame, i.e. the points of the DH skeleton polyline.
pub fn frame_origins(frames: &[Transform]) -> Vec<Point3<f64>> {
    frames
        .iter()
        .map(|f| Point3::new(f[(0, 3)], f[(1, 3)], f[(2, 3)]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::decompose;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn two_joint_chain() -> KinematicChain {
        KinematicChain::new(
            vec![DhParameter::new(0.0, 0.0, 100.0, 0.0), DhParameter::new(200.0, 0.0, 0.0, 0.0)],
            &Pose::identity(),
        )
        .unwrap()
    }

    fn six_axis_chain() -> KinematicChain {
        KinematicChain::new(
            vec![
                DhParameter::new(0.0, FRAC_PI_2, 162.5, 0.0),
                DhParameter::new(-425.0, 0.0, 0.0, 0.0),
                DhParameter::new(-392.2, 0.0, 0.0, 0.0),
                DhParameter::new(0.0, FRAC_PI_2, 133.3, 0.0),
                DhParameter::new(0.0, -FRAC_PI_2, 99.7, 0.0),
                DhParameter::new(0.0, 0.0, 99.6, 0.0),
            ],
            &Pose::from_rotation_vector([10.0, -20.0, 30.0], [0.0, 0.0, 0.4]),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = KinematicChain::new(vec![], &Pose::identity()).unwrap_err();
        assert_eq!(err, CellviewError::MissingDhTable);
    }

    #[test]
    fn test_zero_state_keeps_mounting() {
        let chain = six_axis_chain();
        let frames = chain.forward(&[0.0; 6]).unwrap();
        assert_eq!(frames[0], *chain.mounting());
    }

    #[test]
    fn test_dimension_mismatch() {
        let chain = six_axis_chain();
        let err = chain.forward(&[0.0; 5]).unwrap_err();
        assert_eq!(err, CellviewError::DimensionMismatch { expected: 6, actual: 5 });
    }

    /// Classic DH (RotZ·TransZ·TransX·RotX): joint 2 rotating by +π/2 swings
    /// the 200 mm link from +X onto +Y, so the flange sits at (0, 200, 100).
    #[test]
    fn test_two_joint_end_to_end() {
        let frames = two_joint_chain().forward(&[0.0, FRAC_PI_2]).unwrap();
        assert_eq!(frames.len(), 3);

        let (translation, rotation) = decompose(&frames[2]);
        assert_relative_eq!(translation[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(translation[1], 200.0, epsilon = 1e-9);
        assert_relative_eq!(translation[2], 100.0, epsilon = 1e-9);
        assert_relative_eq!(rotation.angle, FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(rotation.axis[2], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reverse_rotation_direction() {
        let mut dh = DhParameter::new(100.0, 0.0, 0.0, 0.0);
        dh.reverse_rotation_direction = true;
        let t = dh.transform(FRAC_PI_2);
        assert_relative_eq!(t[(1, 3)], -100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_joint_positions_follow_frames() {
        let positions = two_joint_chain().joint_positions(&[PI, 0.0]).unwrap();
        assert_eq!(positions.len(), 3);
        assert_relative_eq!(positions[1].z, 100.0, epsilon = 1e-9);
        assert_relative_eq!(positions[2].x, -200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frames_are_rigid() {
        let frames = six_axis_chain().forward(&[0.1, -0.5, 1.2, 0.3, -0.8, 2.0]).unwrap();
        for f in frames {
            let r: nalgebra::Matrix3<f64> = f.fixed_view::<3, 3>(0, 0).into();
            assert_relative_eq!(r * r.transpose(), nalgebra::Matrix3::identity(), epsilon = 1e-9);
            assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
            assert_eq!(f.row(3).clone_owned(), Matrix4::<f64>::identity().row(3).clone_owned());
        }
    }

    proptest! {
        #[test]
        fn prop_frame_count(joints in proptest::collection::vec(-PI..PI, 6)) {
            let frames = six_axis_chain().forward(&joints).unwrap();
            prop_assert_eq!(frames.len(), 7);
        }

        #[test]
        fn prop_wrong_length_always_fails(len in 0usize..12) {
            prop_assume!(len != 6);
            let result = six_axis_chain().forward(&vec![0.0; len]);
            let is_mismatch = matches!(result, Err(CellviewError::DimensionMismatch { .. }));
            prop_assert!(is_mismatch);
        }
    }
}
