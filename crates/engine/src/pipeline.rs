/*
typedef struct VkGraphicsPipelineCreateInfo {
    const VkPipelineShaderStageCreateInfo*           pStages;               vertex & fragment shader module
    const VkPipelineVertexInputStateCreateInfo*      pVertexInputState;     Vertex bindings & attributes
    const VkPipelineInputAssemblyStateCreateInfo*    pInputAssemblyState;   Triangle topology
    const VkPipelineTessellationStateCreateInfo*     pTessellationState;    No tesselation -> None
    const VkPipelineViewportStateCreateInfo*         pViewportState;        One viewport & scissor, set dynamically
    const VkPipelineRasterizationStateCreateInfo*    pRasterizationState;   Rasterization settings (backface culling, wireframe, etc.)
    const VkPipelineMultisampleStateCreateInfo*      pMultisampleState;     Multisampling -> 1 sample
    const VkPipelineDepthStencilStateCreateInfo*     pDepthStencilState;    Depth testing, no stencil
    const VkPipelineColorBlendStateCreateInfo*       pColorBlendState;      No blending
    const VkPipelineDynamicStateCreateInfo*          pDynamicState;         viewport & scissor
    VkPipelineLayout                                 layout;
    VkRenderPass                                     renderPass;            swapchain render pass
    uint32_t                                         subpass;
} VkGraphicsPipelineCreateInfo;
 */
use crate::context::VkContext;
use crate::error::EngineResult;
use crate::model::Vertex;
use ash::vk;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Fixed-function state of a graphics pipeline. Holds no pointers, the
/// create-info chain is assembled in [`Pipeline::new`].
#[derive(Clone)]
pub struct PipelineConfigInfo {
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    pub rasterizer: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub multisampling: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl Default for PipelineConfigInfo {
    fn default() -> Self {
        let mut config = Self {
            binding_descriptions: Vertex::binding_descriptions(),
            attribute_descriptions: Vertex::attribute_descriptions(),
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default(),
            rasterizer: vk::PipelineRasterizationStateCreateInfo::default(),
            multisampling: vk::PipelineMultisampleStateCreateInfo::default(),
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default(),
            depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default(),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            pipeline_layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        };
        config.set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        config.set_polygon_mode(vk::PolygonMode::FILL);
        config.set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE);
        config.set_multisampling_none();
        config.disable_blending();
        config.enable_depth_test(vk::CompareOp::LESS);
        config
    }
}

impl PipelineConfigInfo {
    pub fn set_input_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.input_assembly.topology = topology;
        self.input_assembly.primitive_restart_enable = vk::FALSE;
    }

    pub fn set_polygon_mode(&mut self, mode: vk::PolygonMode) {
        self.rasterizer.polygon_mode = mode;
        self.rasterizer.line_width = 1.0;
        self.rasterizer.depth_clamp_enable = vk::FALSE;
        self.rasterizer.rasterizer_discard_enable = vk::FALSE;
        self.rasterizer.depth_bias_enable = vk::FALSE;
    }

    pub fn set_cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) {
        self.rasterizer.cull_mode = mode;
        self.rasterizer.front_face = front_face;
    }

    pub fn set_multisampling_none(&mut self) {
        self.multisampling.sample_shading_enable = vk::FALSE;
        self.multisampling.rasterization_samples = vk::SampleCountFlags::TYPE_1;
        self.multisampling.min_sample_shading = 1.0;
        self.multisampling.p_sample_mask = std::ptr::null();
        self.multisampling.alpha_to_coverage_enable = vk::FALSE;
        self.multisampling.alpha_to_one_enable = vk::FALSE;
    }

    pub fn disable_blending(&mut self) {
        self.color_blend_attachment.color_write_mask = vk::ColorComponentFlags::RGBA;
        self.color_blend_attachment.blend_enable = vk::FALSE;
        self.color_blend_attachment.src_color_blend_factor = vk::BlendFactor::ONE;
        self.color_blend_attachment.dst_color_blend_factor = vk::BlendFactor::ZERO;
        self.color_blend_attachment.color_blend_op = vk::BlendOp::ADD;
        self.color_blend_attachment.src_alpha_blend_factor = vk::BlendFactor::ONE;
        self.color_blend_attachment.dst_alpha_blend_factor = vk::BlendFactor::ZERO;
        self.color_blend_attachment.alpha_blend_op = vk::BlendOp::ADD;
    }

    pub fn enable_depth_test(&mut self, compare_op: vk::CompareOp) {
        self.depth_stencil.depth_test_enable = vk::TRUE;
        self.depth_stencil.depth_write_enable = vk::TRUE;
        self.depth_stencil.depth_compare_op = compare_op;
        self.depth_stencil.depth_bounds_test_enable = vk::FALSE;
        self.depth_stencil.stencil_test_enable = vk::FALSE;
        self.depth_stencil.front = vk::StencilOpState::default();
        self.depth_stencil.back = vk::StencilOpState::default();
        self.depth_stencil.min_depth_bounds = 0.0;
        self.depth_stencil.max_depth_bounds = 1.0;
    }

    pub fn disable_depth_test(&mut self) {
        self.enable_depth_test(vk::CompareOp::NEVER);
        self.depth_stencil.depth_test_enable = vk::FALSE;
        self.depth_stencil.depth_write_enable = vk::FALSE;
    }
}

pub struct Pipeline {
    context: Arc<VkContext>,
    graphics_pipeline: vk::Pipeline,
}

impl Pipeline {
    pub fn new(
        context: Arc<VkContext>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfigInfo,
    ) -> EngineResult<Self> {
        log::debug!(
            "Creating graphics pipeline from {} and {}",
            vert_path.display(),
            frag_path.display()
        );

        let vert_module = create_shader_module(&context, vert_path)?;
        let frag_module = match create_shader_module(&context, frag_path) {
            Ok(module) => module,
            Err(err) => {
                unsafe { context.device.destroy_shader_module(vert_module, None) };
                return Err(err);
            }
        };

        let result = Self::build(&context, vert_module, frag_module, config);

        // modules are only needed while the pipeline gets compiled
        unsafe {
            context.device.destroy_shader_module(vert_module, None);
            context.device.destroy_shader_module(frag_module, None);
        }

        let graphics_pipeline = result?;
        Ok(Self {
            context,
            graphics_pipeline,
        })
    }

    fn build(
        context: &VkContext,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        config: &PipelineConfigInfo,
    ) -> EngineResult<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        // Only a single viewport and scissor is supported
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .scissor_count(1)
            .viewport_count(1);

        let blend_attachment = [config.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachment)
            .blend_constants([0.0; 4]);

        let dynamic_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&config.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&config.rasterizer)
            .multisample_state(&config.multisampling)
            .color_blend_state(&color_blending)
            .depth_stencil_state(&config.depth_stencil)
            .dynamic_state(&dynamic_info)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_index(-1);

        let pipelines = unsafe {
            context.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, err)| err)?;

        Ok(pipelines[0])
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.context.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.graphics_pipeline,
            )
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_pipeline(self.graphics_pipeline, None)
        }
    }
}

fn create_shader_module(context: &VkContext, path: &Path) -> EngineResult<vk::ShaderModule> {
    let mut file = File::open(path)?;
    let code = ash::util::read_spv(&mut file)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    Ok(unsafe { context.device.create_shader_module(&create_info, None) }?)
}
