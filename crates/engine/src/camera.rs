//! Projection and view matrices in Vulkan clip conventions: depth in 0..1,
//! y pointing down, camera looking along +z.

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Zero};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    projection_matrix: Matrix4<f32>,
    view_matrix: Matrix4<f32>,
    inverse_view_matrix: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection_matrix: Matrix4::identity(),
            view_matrix: Matrix4::identity(),
            inverse_view_matrix: Matrix4::identity(),
        }
    }
}

impl Camera {
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        let mut projection = Matrix4::identity();
        projection[0][0] = 2.0 / (right - left);
        projection[1][1] = 2.0 / (bottom - top);
        projection[2][2] = 1.0 / (far - near);
        projection[3][0] = -(right + left) / (right - left);
        projection[3][1] = -(bottom + top) / (bottom - top);
        projection[3][2] = -near / (far - near);
        self.projection_matrix = projection;
    }

    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        debug_assert!(aspect.abs() > f32::EPSILON, "aspect ratio must be non-zero");

        let tan_half_fov_y = (fov_y / 2.0).tan();
        let mut projection = Matrix4::zero();
        projection[0][0] = 1.0 / (aspect * tan_half_fov_y);
        projection[1][1] = 1.0 / tan_half_fov_y;
        projection[2][2] = far / (far - near);
        projection[2][3] = 1.0;
        projection[3][2] = -(far * near) / (far - near);
        self.projection_matrix = projection;
    }

    pub fn set_view_direction(
        &mut self,
        position: Vector3<f32>,
        direction: Vector3<f32>,
        up: Vector3<f32>,
    ) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_view_basis(position, u, v, w);
    }

    pub fn set_view_target(
        &mut self,
        position: Vector3<f32>,
        target: Vector3<f32>,
        up: Vector3<f32>,
    ) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from Tait-Bryan angles, same convention as
    /// [`TransformComponent`](crate::game_object::TransformComponent).
    pub fn set_view_yxz(&mut self, position: Vector3<f32>, rotation: Vector3<f32>) {
        let (s3, c3) = rotation.z.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s1, c1) = rotation.y.sin_cos();

        let u = Vector3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1);
        let v = Vector3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3);
        let w = Vector3::new(c2 * s1, -s2, c1 * c2);
        self.set_view_basis(position, u, v, w);
    }

    /// `u`, `v`, `w` are the camera's right, down and forward axes in world space.
    fn set_view_basis(
        &mut self,
        position: Vector3<f32>,
        u: Vector3<f32>,
        v: Vector3<f32>,
        w: Vector3<f32>,
    ) {
        let mut view = Matrix4::identity();
        view[0][0] = u.x;
        view[1][0] = u.y;
        view[2][0] = u.z;
        view[0][1] = v.x;
        view[1][1] = v.y;
        view[2][1] = v.z;
        view[0][2] = w.x;
        view[1][2] = w.y;
        view[2][2] = w.z;
        view[3][0] = -u.dot(position);
        view[3][1] = -v.dot(position);
        view[3][2] = -w.dot(position);
        self.view_matrix = view;

        let mut inverse_view = Matrix4::identity();
        inverse_view[0][0] = u.x;
        inverse_view[0][1] = u.y;
        inverse_view[0][2] = u.z;
        inverse_view[1][0] = v.x;
        inverse_view[1][1] = v.y;
        inverse_view[1][2] = v.z;
        inverse_view[2][0] = w.x;
        inverse_view[2][1] = w.y;
        inverse_view[2][2] = w.z;
        inverse_view[3][0] = position.x;
        inverse_view[3][1] = position.y;
        inverse_view[3][2] = position.z;
        self.inverse_view_matrix = inverse_view;
    }

    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection_matrix
    }

    pub fn view(&self) -> &Matrix4<f32> {
        &self.view_matrix
    }

    pub fn inverse_view(&self) -> &Matrix4<f32> {
        &self.inverse_view_matrix
    }

    pub fn position(&self) -> Vector3<f32> {
        self.inverse_view_matrix.w.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::Vector4;

    fn down() -> Vector3<f32> {
        Vector3::new(0.0, -1.0, 0.0)
    }

    fn project(camera: &Camera, point: Vector3<f32>) -> Vector3<f32> {
        let clip = camera.projection() * camera.view() * point.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn orthographic_maps_box_to_clip_volume() {
        let mut camera = Camera::default();
        camera.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0);

        assert_relative_eq!(
            project(&camera, Vector3::new(-2.0, -1.0, 0.1)),
            Vector3::new(-1.0, -1.0, 0.0),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            project(&camera, Vector3::new(2.0, 1.0, 10.0)),
            Vector3::new(1.0, 1.0, 1.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let mut camera = Camera::default();
        camera.set_perspective_projection(50f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);

        let near = project(&camera, Vector3::new(0.0, 0.0, 0.1));
        let far = project(&camera, Vector3::new(0.0, 0.0, 100.0));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn perspective_edge_of_fov_lands_on_clip_border() {
        let mut camera = Camera::default();
        let fov_y = 90f32.to_radians();
        camera.set_perspective_projection(fov_y, 2.0, 0.1, 100.0);

        // at 45 degrees half angle, y == z on the frustum border
        let top = project(&camera, Vector3::new(0.0, 5.0, 5.0));
        assert_relative_eq!(top.y, 1.0, epsilon = 1e-5);
        let side = project(&camera, Vector3::new(10.0, 0.0, 5.0));
        assert_relative_eq!(side.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn looking_down_plus_z_from_origin_is_identity_view() {
        let mut camera = Camera::default();
        camera.set_view_direction(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            down(),
        );
        assert_relative_eq!(*camera.view(), Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn view_and_inverse_view_cancel_out() {
        let mut camera = Camera::default();
        camera.set_view_target(
            Vector3::new(1.0, -2.0, -2.5),
            Vector3::new(0.0, 0.5, 0.0),
            down(),
        );
        assert_relative_eq!(
            camera.view() * camera.inverse_view(),
            Matrix4::identity(),
            epsilon = 1e-5
        );
        assert_relative_eq!(camera.position(), Vector3::new(1.0, -2.0, -2.5));
    }

    #[test]
    fn view_target_puts_target_on_forward_axis() {
        let mut camera = Camera::default();
        let target = Vector3::new(0.0, 0.5, 0.0);
        camera.set_view_target(Vector3::new(3.0, -1.0, -4.0), target, down());

        let in_view = camera.view() * target.extend(1.0);
        assert_relative_eq!(in_view.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(in_view.y, 0.0, epsilon = 1e-5);
        assert!(in_view.z > 0.0);
    }

    #[test]
    fn yxz_without_rotation_only_translates() {
        let mut camera = Camera::default();
        let position = Vector3::new(0.0, 0.0, -2.5);
        camera.set_view_yxz(position, Vector3::new(0.0, 0.0, 0.0));

        let origin = camera.view() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(origin, Vector4::new(0.0, 0.0, 2.5, 1.0));
    }

    #[test]
    fn yxz_matches_view_direction_for_yaw() {
        let position = Vector3::new(1.0, 0.0, 1.0);
        let yaw = 0.6f32;

        let mut from_angles = Camera::default();
        from_angles.set_view_yxz(position, Vector3::new(0.0, yaw, 0.0));

        let mut from_direction = Camera::default();
        from_direction.set_view_direction(
            position,
            Vector3::new(yaw.sin(), 0.0, yaw.cos()),
            down(),
        );

        assert_relative_eq!(*from_angles.view(), *from_direction.view(), epsilon = 1e-5);
    }
}
