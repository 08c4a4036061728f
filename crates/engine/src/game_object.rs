use crate::model::Model;
use cgmath::{Matrix3, Matrix4, Vector3};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type GameObjectId = u32;
pub type GameObjectMap = HashMap<GameObjectId, GameObject>;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransformComponent {
    pub translation: Vector3<f32>,
    pub scale: Vector3<f32>,
    /// Tait-Bryan angles in radians, applied in Y(1), X(2), Z(3) order.
    pub rotation: Vector3<f32>,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

impl TransformComponent {
    /// Translate * Ry * Rx * Rz * Scale, written out.
    pub fn mat4(&self) -> Matrix4<f32> {
        let [u, v, w] = self.rotation_columns();
        let s = self.scale;
        let t = self.translation;

        #[rustfmt::skip]
        let matrix = Matrix4::new(
            s.x * u.x, s.x * u.y, s.x * u.z, 0.0,
            s.y * v.x, s.y * v.y, s.y * v.z, 0.0,
            s.z * w.x, s.z * w.y, s.z * w.z, 0.0,
            t.x,       t.y,       t.z,       1.0,
        );
        matrix
    }

    /// Rotation * inverse scale: keeps normals perpendicular under
    /// non-uniform scaling.
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        let [u, v, w] = self.rotation_columns();
        let inv = Vector3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);

        #[rustfmt::skip]
        let matrix = Matrix3::new(
            inv.x * u.x, inv.x * u.y, inv.x * u.z,
            inv.y * v.x, inv.y * v.y, inv.y * v.z,
            inv.z * w.x, inv.z * w.y, inv.z * w.z,
        );
        matrix
    }

    fn rotation_columns(&self) -> [Vector3<f32>; 3] {
        let (s3, c3) = self.rotation.z.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s1, c1) = self.rotation.y.sin_cos();

        [
            Vector3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1),
            Vector3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3),
            Vector3::new(c2 * s1, -s2, c1 * c2),
        ]
    }
}

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

pub struct GameObject {
    id: GameObjectId,
    pub color: Vector3<f32>,
    pub transform: TransformComponent,
    pub model: Option<Arc<Model>>,
}

impl GameObject {
    /// New object with a process-unique id.
    pub fn create() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            color: Vector3::new(0.0, 0.0, 0.0),
            transform: TransformComponent::default(),
            model: None,
        }
    }

    pub fn id(&self) -> GameObjectId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::{Matrix, SquareMatrix, Vector4};
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn default_transform_is_identity() {
        let transform = TransformComponent::default();
        assert_relative_eq!(transform.mat4(), Matrix4::identity());
        assert_relative_eq!(transform.normal_matrix(), Matrix3::identity());
    }

    #[test]
    fn translation_and_scale() {
        let transform = TransformComponent {
            translation: Vector3::new(0.0, 0.5, 0.0),
            scale: Vector3::new(3.0, 1.0, 3.0),
            ..Default::default()
        };
        let point = transform.mat4() * Vector4::new(1.0, 1.0, 1.0, 1.0);
        assert_relative_eq!(point, Vector4::new(3.0, 1.5, 3.0, 1.0));
    }

    #[test]
    fn yaw_turns_x_towards_minus_z() {
        let transform = TransformComponent {
            rotation: Vector3::new(0.0, FRAC_PI_2, 0.0),
            ..Default::default()
        };
        let x_axis = transform.mat4() * Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(x_axis, Vector4::new(0.0, 0.0, -1.0, 0.0), epsilon = 1e-6);
        let z_axis = transform.mat4() * Vector4::new(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(z_axis, Vector4::new(1.0, 0.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn rotation_order_is_yxz() {
        let rotation = Vector3::new(0.3, -1.1, 0.7);
        let transform = TransformComponent {
            rotation,
            ..Default::default()
        };
        let expected = Matrix4::from_angle_y(cgmath::Rad(rotation.y))
            * Matrix4::from_angle_x(cgmath::Rad(rotation.x))
            * Matrix4::from_angle_z(cgmath::Rad(rotation.z));
        assert_relative_eq!(transform.mat4(), expected, epsilon = 1e-6);
    }

    #[test]
    fn normal_matrix_undoes_scale() {
        let transform = TransformComponent {
            translation: Vector3::new(1.0, 2.0, 3.0),
            scale: Vector3::new(2.0, 0.5, 4.0),
            rotation: Vector3::new(0.4, 1.2, -0.8),
        };
        let m = transform.mat4();
        let linear = Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate());

        // N^T * M = S^-1 R^T R S = I
        let product = transform.normal_matrix().transpose() * linear;
        assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-5);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let first = GameObject::create();
        let second = GameObject::create();
        assert!(second.id() > first.id());
        assert!(first.model.is_none());
    }
}
