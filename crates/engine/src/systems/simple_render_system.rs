use crate::context::VkContext;
use crate::error::EngineResult;
use crate::frame_info::FrameInfo;
use crate::pipeline::{Pipeline, PipelineConfigInfo};
use ash::vk;
use cgmath::Matrix4;
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

pub const VERTEX_SHADER: &str = "simple_shader.vert.spv";
pub const FRAGMENT_SHADER: &str = "simple_shader.frag.spv";

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SimplePushConstantData {
    pub model_matrix: Matrix4<f32>,
    pub normal_matrix: Matrix4<f32>,
}

impl SimplePushConstantData {
    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), size_of::<Self>()) }
    }
}

fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: size_of::<SimplePushConstantData>() as u32,
    }
}

/// Draws every game object with a model using the lit, vertex-colored shader.
pub struct SimpleRenderSystem {
    context: Arc<VkContext>,
    pipeline: Pipeline,
    pipeline_layout: vk::PipelineLayout,
}

impl SimpleRenderSystem {
    pub fn new(
        context: Arc<VkContext>,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> EngineResult<Self> {
        let pipeline_layout = Self::create_pipeline_layout(&context, global_set_layout)?;

        let config = PipelineConfigInfo {
            render_pass,
            pipeline_layout,
            ..Default::default()
        };
        let pipeline = match Pipeline::new(
            context.clone(),
            &shader_dir.join(VERTEX_SHADER),
            &shader_dir.join(FRAGMENT_SHADER),
            &config,
        ) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { context.device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(err);
            }
        };

        Ok(Self {
            context,
            pipeline,
            pipeline_layout,
        })
    }

    fn create_pipeline_layout(
        context: &VkContext,
        global_set_layout: vk::DescriptorSetLayout,
    ) -> EngineResult<vk::PipelineLayout> {
        let set_layouts = [global_set_layout];
        let push_constant_ranges = [push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        Ok(unsafe { context.device.create_pipeline_layout(&layout_info, None) }?)
    }

    pub fn render_game_objects(&self, frame_info: &FrameInfo) {
        let device = &self.context.device;
        let cmd = frame_info.command_buffer;

        self.pipeline.bind(cmd);
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[frame_info.global_descriptor_set],
                &[],
            );
        }

        for object in frame_info.game_objects.values() {
            let Some(model) = &object.model else {
                continue;
            };

            let push = SimplePushConstantData {
                model_matrix: object.transform.mat4(),
                normal_matrix: Matrix4::from(object.transform.normal_matrix()),
            };
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    push.as_bytes(),
                );
            }
            model.bind(cmd);
            model.draw(cmd);
        }
    }
}

impl Drop for SimpleRenderSystem {
    fn drop(&mut self) {
        log::debug!("Start: Dropping simple render system");
        unsafe {
            self.context
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None)
        }
        log::debug!("End: Dropping simple render system");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_object::TransformComponent;
    use cgmath::{SquareMatrix, Vector3};

    #[test]
    fn push_constants_fit_guaranteed_minimum() {
        // every implementation offers at least 128 bytes
        let range = push_constant_range();
        assert_eq!(range.size, 128);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn normal_matrix_is_padded_into_mat4() {
        let transform = TransformComponent {
            scale: Vector3::new(2.0, 2.0, 2.0),
            ..Default::default()
        };
        let push = SimplePushConstantData {
            model_matrix: transform.mat4(),
            normal_matrix: Matrix4::from(transform.normal_matrix()),
        };

        assert_eq!(push.normal_matrix[0][0], 0.5);
        assert_eq!(push.normal_matrix[3][3], 1.0);
        assert_eq!(push.normal_matrix[3][0], 0.0);
        assert_eq!(push.as_bytes().len(), 128);
        assert_ne!(push.model_matrix, Matrix4::identity());
    }
}
