use crate::context::VkContext;
use crate::error::{EngineError, EngineResult};
use crate::frame::{
    AcquireOutcome, FrameCursor, FrameData, FrameState, ImagesInFlight, PresentOutcome,
    MAX_FRAMES_IN_FLIGHT,
};
use crate::swapchain::Swapchain;
use ash::vk;
use std::sync::Arc;

const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Drives the acquire / record / submit / present cycle on top of a
/// [`Swapchain`] and recreates the latter whenever it goes stale.
pub struct Renderer {
    context: Arc<VkContext>,
    swapchain: Swapchain,
    frames: Vec<FrameData>,
    cursor: FrameCursor,
    images_in_flight: ImagesInFlight<vk::Fence>,
    state: FrameState,
    window_extent: vk::Extent2D,
    window_resized: bool,
    vsync: bool,
}

impl Renderer {
    pub fn new(
        context: Arc<VkContext>,
        window_extent: vk::Extent2D,
        vsync: bool,
    ) -> EngineResult<Self> {
        let swapchain = Swapchain::new(context.clone(), window_extent, None, vsync)?;
        let frames = Self::create_framedata(&context)?;
        let images_in_flight = ImagesInFlight::new(swapchain.image_count());

        log::info!(
            "Renderer ready: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            context,
            swapchain,
            frames,
            cursor: FrameCursor::default(),
            images_in_flight,
            state: FrameState::default(),
            window_extent,
            window_resized: false,
            vsync,
        })
    }

    fn create_framedata(context: &VkContext) -> EngineResult<Vec<FrameData>> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameData::new(&context.device, context.graphics_queue.family_index) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    frames.iter().for_each(|frame| frame.destroy(&context.device));
                    return Err(err);
                }
            }
        }
        Ok(frames)
    }

    /// Starts recording a frame.
    ///
    /// Returns `Ok(None)` when there is nothing to render into: the window is
    /// minimized or the swapchain had to be recreated. The caller should
    /// simply skip this frame.
    pub fn begin_frame(&mut self) -> EngineResult<Option<vk::CommandBuffer>> {
        self.state.ensure_idle()?;

        if is_zero_extent(self.window_extent) {
            return Ok(None);
        }
        if self.window_resized {
            self.recreate_swapchain()?;
        }

        let frame = self.frames[self.cursor.current()];
        unsafe {
            self.context
                .device
                .wait_for_fences(&[frame.in_flight], true, u64::MAX)
        }?;

        let acquired = self.swapchain.acquire_next_image(frame.image_available);
        let image_index = match AcquireOutcome::from_result(acquired)? {
            AcquireOutcome::Render { image_index } => image_index,
            AcquireOutcome::Recreate => {
                self.recreate_swapchain()?;
                return Ok(None);
            }
        };

        let device = &self.context.device;
        let cmd = frame.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        self.state.begin(image_index)?;
        Ok(Some(cmd))
    }

    /// Submits the recorded frame and presents it.
    pub fn end_frame(&mut self) -> EngineResult<()> {
        let image_index = self.state.image_index()?;
        let frame = self.frames[self.cursor.current()];
        let device = &self.context.device;

        unsafe { device.end_command_buffer(frame.command_buffer) }?;

        if let Some(previous) = self.images_in_flight.claim(image_index, frame.in_flight)? {
            unsafe { device.wait_for_fences(&[previous], true, u64::MAX) }?;
        }

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished];
        let command_buffers = [frame.command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            // only reset right before the submit that signals it again
            device.reset_fences(&[frame.in_flight])?;
            device.queue_submit(
                self.context.graphics_queue.queue,
                &[submit_info],
                frame.in_flight,
            )?;
        }
        self.state.end()?;

        let presented = self.swapchain.present(
            self.context.present_queue.queue,
            image_index,
            frame.render_finished,
        );
        self.cursor.advance();

        match PresentOutcome::from_result(presented, self.window_resized)? {
            PresentOutcome::Recreate => {
                self.window_resized = true;
                self.recreate_swapchain()
            }
            PresentOutcome::Done => Ok(()),
        }
    }

    pub fn begin_swapchain_render_pass(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        let image_index = self.state.image_index()? as usize;
        let extent = self.swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(image_index))
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let device = &self.context.device;
        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
        Ok(())
    }

    pub fn end_swapchain_render_pass(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        self.state.image_index()?;
        unsafe { self.context.device.cmd_end_render_pass(cmd) };
        Ok(())
    }

    /// Records the new window size; the swapchain follows on the next frame.
    pub fn window_resized(&mut self, extent: vk::Extent2D) {
        log::debug!("Window resized to {}x{}", extent.width, extent.height);
        self.window_extent = extent;
        self.window_resized = true;
    }

    /// Replaces the swapchain with one matching the current window extent.
    ///
    /// The frame slots are kept: their fences and semaphores are still
    /// referenced by submissions the GPU may not have finished yet.
    pub fn recreate_swapchain(&mut self) -> EngineResult<()> {
        if is_zero_extent(self.window_extent) {
            // retried once the window has an area again
            return Ok(());
        }

        log::warn!(
            "Recreating swapchain for {}x{}",
            self.window_extent.width,
            self.window_extent.height
        );
        self.context.wait_idle()?;

        let swapchain = Swapchain::new(
            self.context.clone(),
            self.window_extent,
            Some(&self.swapchain),
            self.vsync,
        )?;

        if !self.swapchain.compare_swap_formats(&swapchain) {
            return Err(EngineError::SwapchainFormatChanged);
        }

        self.swapchain = swapchain;
        self.images_in_flight.resize(self.swapchain.image_count());
        self.window_resized = false;
        Ok(())
    }

    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent_aspect_ratio()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.state.is_in_progress()
    }

    pub fn current_command_buffer(&self) -> EngineResult<vk::CommandBuffer> {
        self.state.image_index()?;
        Ok(self.frames[self.cursor.current()].command_buffer)
    }

    pub fn frame_index(&self) -> EngineResult<usize> {
        self.state.image_index()?;
        Ok(self.cursor.current())
    }

    pub fn wait_gpu_idle(&self) -> EngineResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::debug!("Start: Dropping renderer");
        if let Err(err) = self.wait_gpu_idle() {
            log::error!("Failed waiting for the GPU before teardown: {err}");
        }
        self.frames
            .drain(..)
            .for_each(|frame| frame.destroy(&self.context.device));
        log::debug!("End: Dropping renderer");
    }
}

fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimized_window_has_zero_extent() {
        assert!(is_zero_extent(vk::Extent2D {
            width: 0,
            height: 600
        }));
        assert!(is_zero_extent(vk::Extent2D {
            width: 800,
            height: 0
        }));
        assert!(!is_zero_extent(vk::Extent2D {
            width: 1,
            height: 1
        }));
    }
}
