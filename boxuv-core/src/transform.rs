/// Object transforms: local TRS, world composition and lossy scale
use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

/// Euler rotation around three axes (in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RotationState {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn from_degrees(degrees: [f32; 3]) -> Self {
        Self::new(
            degrees[0].to_radians(),
            degrees[1].to_radians(),
            degrees[2].to_radians(),
        )
    }

    pub fn to_degrees(self) -> [f32; 3] {
        [self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees()]
    }

    /// Rotations are applied in order: Z, Y, X
    pub fn to_quaternion(self) -> UnitQuaternion<f32> {
        let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.x);
        let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.y);
        let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.z);
        rz * ry * rx
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Translation, rotation and scale of an object relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub translation: Vector3<f32>,
    pub rotation: RotationState,
    pub scale: Vector3<f32>,
}

impl LocalTransform {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: RotationState::zero(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Scale, then rotate, then translate
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_translation(&self.translation)
            * self.rotation.to_quaternion().to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Where an object sits in the world, as far as projection cares.
///
/// `lossy_scale` is the per-axis scale accumulated down the parent chain.
/// It ignores any skew introduced by rotated non-uniform parents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectTransform {
    pub local_to_world: Matrix4<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub lossy_scale: Vector3<f32>,
}

impl ObjectTransform {
    pub fn identity() -> Self {
        Self {
            local_to_world: Matrix4::identity(),
            rotation: UnitQuaternion::identity(),
            lossy_scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// World transform of a root object.
    pub fn from_local(local: &LocalTransform) -> Self {
        Self::identity().child(local)
    }

    /// World transform of a child placed at `local` under `self`.
    pub fn child(&self, local: &LocalTransform) -> Self {
        Self {
            local_to_world: self.local_to_world * local.to_matrix(),
            rotation: self.rotation * local.rotation.to_quaternion(),
            lossy_scale: self.lossy_scale.component_mul(&local.scale),
        }
    }

    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        self.local_to_world.transform_point(point)
    }

    /// Rotate a direction into world space; translation and scale do not apply.
    pub fn transform_direction(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * direction
    }
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_rotation() {
        let q = RotationState::zero().to_quaternion();
        assert!((q.to_homogeneous() - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_degrees_roundtrip() {
        let state = RotationState::from_degrees([90.0, -45.0, 10.0]);
        let back = state.to_degrees();
        assert!((back[0] - 90.0).abs() < 1e-4);
        assert!((back[1] + 45.0).abs() < 1e-4);
        assert!((back[2] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_point_uses_full_trs_direction_uses_rotation_only() {
        let local = LocalTransform {
            translation: Vector3::new(10.0, 0.0, 0.0),
            rotation: RotationState::new(0.0, 0.0, FRAC_PI_2),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let world = ObjectTransform::from_local(&local);

        let p = world.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((p - Point3::new(10.0, 2.0, 0.0)).norm() < 1e-5);

        let d = world.transform_direction(&Vector3::new(1.0, 0.0, 0.0));
        assert!((d - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_lossy_scale_accumulates_down_the_chain() {
        let parent = LocalTransform {
            scale: Vector3::new(2.0, 1.0, 3.0),
            ..LocalTransform::identity()
        };
        let child = LocalTransform {
            scale: Vector3::new(0.5, 4.0, 1.0),
            ..LocalTransform::identity()
        };
        let world = ObjectTransform::from_local(&parent).child(&child);
        assert_eq!(world.lossy_scale, Vector3::new(1.0, 4.0, 3.0));
    }
}
