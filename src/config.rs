use nalgebra::{Matrix3, Matrix4, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Mat3 = Matrix3<f32>;
pub type Mat4 = Matrix4<f32>;
pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// How the authored model and animation files lay out their axes.
///
/// Internally x points front, y up and z right. The authored axes are the
/// columns of [`FrameConfig::axes_rotation`], so an authored vector `v` maps
/// to `axes_rotation^T * v` internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub axis_front: [f32; 3],
    pub axis_up: [f32; 3],
    pub axis_right: [f32; 3],
    /// Order in which the x (0), y (1) and z (2) Euler angles are applied.
    pub rotation_order: [usize; 3],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            axis_front: [1.0, 0.0, 0.0],
            axis_up: [0.0, 1.0, 0.0],
            axis_right: [0.0, 0.0, 1.0],
            rotation_order: [2, 1, 0],
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<()> {
        let mut seen = [false; 3];
        for &axis in &self.rotation_order {
            if axis > 2 || seen[axis] {
                return Err(Error::Configuration(format!(
                    "rotation_order {:?} is not a permutation of [0, 1, 2]",
                    self.rotation_order
                )));
            }
            seen[axis] = true;
        }

        if self.axes_rotation().determinant().abs() < 1.0e-4 {
            return Err(Error::Configuration("axis_front, axis_up and axis_right are not independent".to_string()));
        }

        Ok(())
    }

    pub fn axes_rotation(&self) -> Mat3 {
        Mat3::from_columns(&[
            Vec3::from(self.axis_front),
            Vec3::from(self.axis_up),
            Vec3::from(self.axis_right),
        ])
    }

    pub fn to_internal(&self, authored: &Vec3) -> Vec3 {
        self.axes_rotation().transpose() * authored
    }

    pub fn to_authored(&self, internal: &Vec3) -> Vec3 {
        self.axes_rotation() * internal
    }

    /// Moves per-axis scale factors into their internal slots. Unlike
    /// directions, their signs are kept as authored.
    pub fn scale_to_internal(&self, authored: &Vec3) -> Vec3 {
        self.axes_rotation().transpose().abs() * authored
    }

    pub fn scale_to_authored(&self, internal: &Vec3) -> Vec3 {
        self.axes_rotation().abs() * internal
    }

    /// Change of basis for an authored rotation matrix.
    pub fn rotation_to_internal(&self, authored: &Mat3) -> Mat3 {
        let axes = self.axes_rotation();
        axes.transpose() * authored * axes
    }

    pub fn rotation_to_authored(&self, internal: &Mat3) -> Mat3 {
        let axes = self.axes_rotation();
        axes * internal * axes.transpose()
    }

    /// Euler angles in degrees about the internal x, y and z axes, applied in
    /// `rotation_order`.
    pub fn angles_to_quaternion(&self, angles: &Vec3) -> Quat {
        self.rotation_order.iter().fold(Quat::identity(), |rotation, &axis| {
            let mut direction = Vec3::zeros();
            direction[axis] = 1.0;
            rotation * Quat::from_axis_angle(&Unit::new_unchecked(direction), angles[axis].to_radians())
        })
    }

    pub fn angles_to_matrix(&self, angles: &Vec3) -> Mat3 {
        self.angles_to_quaternion(angles).to_rotation_matrix().into_inner()
    }
}

pub fn translation_matrix(translation: &Vec3) -> Mat4 {
    Mat4::new_translation(translation)
}

pub fn scale_matrix(scale: &Vec3) -> Mat4 {
    Mat4::new_nonuniform_scaling(scale)
}

/// Builds `translate(translation) * rotation` as an affine 4x4 matrix.
pub fn rigid_matrix(rotation: &Mat3, translation: &Vec3) -> Mat4 {
    let mut matrix = rotation.to_homogeneous();
    matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    matrix
}
