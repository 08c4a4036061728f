use ash::vk;
use engine::config::{EngineConfig, SceneConfig};
use engine::descriptor::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorWriter,
};
use engine::systems::SimpleRenderSystem;
use engine::{
    Buffer, Camera, EngineResult, FrameInfo, GameObject, GameObjectMap, GlobalUbo, InputState,
    KeyboardMovementController, Model, Renderer, VkContext, MAX_FRAMES_IN_FLIGHT,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::dpi::PhysicalSize;
use winit::event::KeyEvent;
use winit::window::Window;

/// The scene, the camera rig and the per-frame GPU resources feeding the
/// render system.
pub struct Game {
    config: EngineConfig,
    input: InputState,
    controller: KeyboardMovementController,
    viewer: GameObject,
    camera: Camera,
    last_frame: Instant,

    render_system: SimpleRenderSystem,
    game_objects: GameObjectMap,
    global_sets: Vec<vk::DescriptorSet>,
    ubo_buffers: Vec<Buffer>,
    // referenced by the global sets, kept alive with them
    _global_set_layout: DescriptorSetLayout,
    _global_pool: DescriptorPool,
    renderer: Renderer,
    context: Arc<VkContext>,
}

impl Game {
    pub fn new(window: &Window, config: EngineConfig) -> EngineResult<Self> {
        let context = Arc::new(VkContext::initialize(window, config.render.validation)?);
        let renderer = Renderer::new(
            context.clone(),
            to_extent(window.inner_size()),
            config.render.vsync,
        )?;

        let global_pool = DescriptorPoolBuilder::new()
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32)
            .build(context.clone())?;

        let min_alignment = context
            .properties()
            .limits
            .min_uniform_buffer_offset_alignment;
        let ubo_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                let mut buffer = Buffer::new(
                    context.clone(),
                    std::mem::size_of::<GlobalUbo>() as vk::DeviceSize,
                    1,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE,
                    min_alignment,
                )?;
                buffer.map(vk::WHOLE_SIZE, 0)?;
                Ok(buffer)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let global_set_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .build(context.clone())?;

        let global_sets = ubo_buffers
            .iter()
            .map(|buffer| {
                DescriptorWriter::new(&global_set_layout, &global_pool)
                    .write_buffer(0, buffer.descriptor_info(vk::WHOLE_SIZE, 0))?
                    .build()
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let render_system = SimpleRenderSystem::new(
            context.clone(),
            renderer.swapchain_render_pass(),
            global_set_layout.layout(),
            &config.render.shader_dir,
        )?;

        let game_objects = load_game_objects(&context, &config.scene)?;
        log::info!("Scene loaded with {} object(s)", game_objects.len());

        let mut viewer = GameObject::create();
        viewer.transform.translation = config.camera.start_position.into();

        Ok(Self {
            config,
            input: InputState::default(),
            controller: KeyboardMovementController::default(),
            viewer,
            camera: Camera::default(),
            last_frame: Instant::now(),
            render_system,
            game_objects,
            global_sets,
            ubo_buffers,
            _global_set_layout: global_set_layout,
            _global_pool: global_pool,
            renderer,
            context,
        })
    }

    pub fn handle_key_event(&mut self, event: &KeyEvent) {
        self.input.handle_key_event(event);
    }

    pub fn focus_lost(&mut self) {
        self.input.clear();
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.renderer.window_resized(to_extent(size));
    }

    pub fn draw_frame(&mut self) -> EngineResult<()> {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.controller
            .move_in_plane_xz(&self.input, frame_time, &mut self.viewer);
        self.camera.set_view_yxz(
            self.viewer.transform.translation,
            self.viewer.transform.rotation,
        );

        let camera_config = &self.config.camera;
        self.camera.set_perspective_projection(
            camera_config.fov_y_degrees.to_radians(),
            self.renderer.aspect_ratio(),
            camera_config.near,
            camera_config.far,
        );

        let Some(command_buffer) = self.renderer.begin_frame()? else {
            return Ok(());
        };
        let frame_index = self.renderer.frame_index()?;

        let ubo = GlobalUbo::from_camera(&self.camera);
        let ubo_buffer = &mut self.ubo_buffers[frame_index];
        ubo_buffer.write_to_index(&ubo, 0)?;
        ubo_buffer.flush(vk::WHOLE_SIZE, 0)?;

        let frame_info = FrameInfo {
            frame_index,
            frame_time,
            command_buffer,
            camera: &self.camera,
            global_descriptor_set: self.global_sets[frame_index],
            game_objects: &self.game_objects,
        };

        self.renderer.begin_swapchain_render_pass(command_buffer)?;
        self.render_system.render_game_objects(&frame_info);
        self.renderer.end_swapchain_render_pass(command_buffer)?;
        self.renderer.end_frame()
    }

    pub fn wait_idle(&self) -> EngineResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        log::debug!("Start: Dropping game");
        if let Err(err) = self.wait_idle() {
            log::error!("Failed waiting for the GPU before teardown: {err}");
        }
        log::debug!("End: Dropping game");
    }
}

/// Objects sharing a model file share one uploaded [`Model`].
fn load_game_objects(
    context: &Arc<VkContext>,
    scene: &SceneConfig,
) -> EngineResult<GameObjectMap> {
    let mut models: HashMap<PathBuf, Arc<Model>> = HashMap::new();
    let mut game_objects = GameObjectMap::new();

    for object_config in &scene.objects {
        let model = match models.get(&object_config.model) {
            Some(model) => model.clone(),
            None => {
                let model = Arc::new(Model::from_file(context.clone(), &object_config.model)?);
                models.insert(object_config.model.clone(), model.clone());
                model
            }
        };

        let mut object = GameObject::create();
        object.model = Some(model);
        object.color = object_config.color.into();
        object.transform.translation = object_config.translation.into();
        object.transform.rotation = object_config.rotation.into();
        object.transform.scale = object_config.scale.into();
        game_objects.insert(object.id(), object);
    }

    Ok(game_objects)
}

fn to_extent(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
