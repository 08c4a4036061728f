use crate::camera::Camera;
use crate::game_object::GameObjectMap;
use ash::vk;
use cgmath::{Matrix4, SquareMatrix, Vector4};

/// Per-frame uniform data, set 0 binding 0 in the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlobalUbo {
    pub projection: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub inverse_view: Matrix4<f32>,
    /// rgb color, w is intensity
    pub ambient_light_color: Vector4<f32>,
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Matrix4::identity(),
            view: Matrix4::identity(),
            inverse_view: Matrix4::identity(),
            ambient_light_color: Vector4::new(1.0, 1.0, 1.0, 0.2),
        }
    }
}

impl GlobalUbo {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            projection: *camera.projection(),
            view: *camera.view(),
            inverse_view: *camera.inverse_view(),
            ..Default::default()
        }
    }
}

/// Everything a render system needs to record one frame.
pub struct FrameInfo<'a> {
    pub frame_index: usize,
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: vk::DescriptorSet,
    pub game_objects: &'a GameObjectMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(offset_of!(GlobalUbo, view), 64);
        assert_eq!(offset_of!(GlobalUbo, inverse_view), 128);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 192);
        assert_eq!(size_of::<GlobalUbo>(), 208);
    }

    #[test]
    fn ubo_copies_camera_matrices() {
        let mut camera = Camera::default();
        camera.set_perspective_projection(1.0, 1.5, 0.1, 100.0);
        camera.set_view_yxz(
            cgmath::Vector3::new(0.0, 0.0, -2.5),
            cgmath::Vector3::new(0.0, 0.0, 0.0),
        );

        let ubo = GlobalUbo::from_camera(&camera);
        assert_eq!(ubo.projection, *camera.projection());
        assert_eq!(ubo.view, *camera.view());
        assert_eq!(ubo.inverse_view, *camera.inverse_view());
        assert_eq!(ubo.ambient_light_color, Vector4::new(1.0, 1.0, 1.0, 0.2));
    }
}
