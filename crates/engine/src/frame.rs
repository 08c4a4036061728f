//! Frame-in-flight bookkeeping.
//!
//! The CPU may record up to [`MAX_FRAMES_IN_FLIGHT`] frames ahead of the GPU.
//! Each of those slots owns its own command buffer and sync objects, and the
//! swapchain images remember which slot last rendered into them.

use crate::error::{EngineError, EngineResult};
use ash::prelude::VkResult;
use ash::{vk, Device};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-slot command recording and synchronization objects.
#[derive(Copy, Clone, Debug)]
pub struct FrameData {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signalled by image acquisition, waited on by the submit.
    pub image_available: vk::Semaphore,
    /// Signalled by the submit, waited on by presentation.
    pub render_finished: vk::Semaphore,
    /// Signalled when the slot's submission completed. Created signalled so
    /// the first wait returns immediately.
    pub in_flight: vk::Fence,
}

impl FrameData {
    pub fn new(device: &Device, queue_family_index: u32) -> EngineResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }?;

        let buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut frame = Self {
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };

        let created = unsafe {
            device.allocate_command_buffers(&buffer_info).and_then(|buffers| {
                frame.command_buffer = buffers[0];
                frame.image_available = device.create_semaphore(&semaphore_info, None)?;
                frame.render_finished = device.create_semaphore(&semaphore_info, None)?;
                frame.in_flight = device.create_fence(&fence_info, None)?;
                Ok(())
            })
        };

        match created {
            Ok(()) => Ok(frame),
            Err(err) => {
                frame.destroy(device);
                Err(err.into())
            }
        }
    }

    /// The command buffer goes away with its pool.
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_command_pool(self.command_pool, None);
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Index of the frame slot currently being recorded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
}

impl FrameCursor {
    pub fn current(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// For every swapchain image, the fence of the slot that last submitted work
/// rendering into it.
///
/// The swapchain may return images out of order, or have more images than
/// there are frame slots, so waiting on the slot fence alone does not
/// guarantee that the acquired image is no longer in use.
#[derive(Clone, Debug)]
pub struct ImagesInFlight<F> {
    fences: Vec<Option<F>>,
}

impl<F: Copy + PartialEq> ImagesInFlight<F> {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![None; image_count],
        }
    }

    /// Records `fence` as the owner of `image` and returns the previous owner
    /// when it is a different slot. The caller must wait on the returned
    /// fence before submitting work that touches the image.
    pub fn claim(&mut self, image: u32, fence: F) -> EngineResult<Option<F>> {
        let count = self.fences.len();
        let slot = self
            .fences
            .get_mut(image as usize)
            .ok_or(EngineError::ImageIndexOutOfRange {
                index: image,
                count,
            })?;

        let previous = slot.replace(fence);
        Ok(previous.filter(|previous| *previous != fence))
    }

    /// Forgets all owners; used once the swapchain got recreated.
    pub fn resize(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, None);
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    InProgress {
        image_index: u32,
    },
}

impl FrameState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, FrameState::InProgress { .. })
    }

    pub fn ensure_idle(&self) -> EngineResult<()> {
        match self {
            FrameState::Idle => Ok(()),
            FrameState::InProgress { .. } => Err(EngineError::FrameAlreadyInProgress),
        }
    }

    pub fn begin(&mut self, image_index: u32) -> EngineResult<()> {
        self.ensure_idle()?;
        *self = FrameState::InProgress { image_index };
        Ok(())
    }

    /// Returns the image the finished frame rendered into.
    pub fn end(&mut self) -> EngineResult<u32> {
        let image_index = self.image_index()?;
        *self = FrameState::Idle;
        Ok(image_index)
    }

    pub fn image_index(&self) -> EngineResult<u32> {
        match self {
            FrameState::InProgress { image_index } => Ok(*image_index),
            FrameState::Idle => Err(EngineError::FrameNotInProgress),
        }
    }
}

/// What to do after `vkAcquireNextImageKHR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Render { image_index: u32 },
    /// Nothing to render into until the swapchain is recreated.
    Recreate,
}

impl AcquireOutcome {
    /// A suboptimal image is still rendered; presentation reports it again.
    pub fn from_result(result: VkResult<(u32, bool)>) -> EngineResult<Self> {
        match result {
            Ok((image_index, _suboptimal)) => Ok(AcquireOutcome::Render { image_index }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Recreate),
            Err(err) => Err(err.into()),
        }
    }
}

/// What to do after `vkQueuePresentKHR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Done,
    Recreate,
}

impl PresentOutcome {
    pub fn from_result(result: VkResult<bool>, window_resized: bool) -> EngineResult<Self> {
        match result {
            Ok(suboptimal) if suboptimal || window_resized => Ok(PresentOutcome::Recreate),
            Ok(_) => Ok(PresentOutcome::Done),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Recreate),
            Err(err) => Err(err.into()),
        }
    }
}
