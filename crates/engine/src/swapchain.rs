use crate::context::VkContext;
use crate::error::EngineResult;
use ash::khr::surface;
use ash::prelude::VkResult;
use ash::vk;
use itertools::Itertools;
use std::sync::Arc;

const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

struct DepthAttachment {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

/// Presentable images plus everything that is sized after them: depth
/// attachments, the render pass and one framebuffer per image.
pub struct Swapchain {
    context: Arc<VkContext>,
    properties: SwapchainProperties,
    depth_format: vk::Format,
    pub swapchain_fn: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_attachments: Vec<DepthAttachment>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Creates a swapchain for `window_extent`.
    ///
    /// When `previous` is given its handle is passed as `old_swapchain` so the
    /// driver can hand over resources; the caller keeps the old swapchain alive
    /// until this returns.
    pub fn new(
        context: Arc<VkContext>,
        window_extent: vk::Extent2D,
        previous: Option<&Swapchain>,
        vsync: bool,
    ) -> EngineResult<Self> {
        let details = context.swapchain_support()?;
        let dimensions = [window_extent.width, window_extent.height];
        let swapchain_properties = details.get_ideal_swapchain_properties(dimensions, vsync);
        let image_count = details.image_count();

        log::debug!(
            "Creating swapchain.\n\tFormat: {:?}\n\tColorSpace: {:?}\n\tPresentMode: {:?}\n\tExtent: {:?}\n\tImageCount: {}",
            swapchain_properties.format.format,
            swapchain_properties.format.color_space,
            swapchain_properties.present_mode,
            swapchain_properties.extent,
            image_count,
        );

        let families = context.queue_families.unique();
        let create_info = {
            let default = vk::SwapchainCreateInfoKHR::default()
                .surface(context.surface)
                .min_image_count(image_count)
                .image_format(swapchain_properties.format.format)
                .image_color_space(swapchain_properties.format.color_space)
                .image_extent(swapchain_properties.extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);

            let default = if context.queue_families.is_shared() {
                default.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            } else {
                default
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&families)
            };

            default
                .pre_transform(details.capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(swapchain_properties.present_mode)
                .clipped(true)
                .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain))
        };

        let depth_format = Self::find_depth_format(&context)?;
        let swapchain_fn = ash::khr::swapchain::Device::new(&context.instance, &context.device);
        let swapchain = unsafe { swapchain_fn.create_swapchain(&create_info, None) }?;

        // From here on Drop cleans up whatever got created so far.
        let mut this = Self {
            context,
            properties: swapchain_properties,
            depth_format,
            swapchain_fn,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_attachments: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };

        this.images = unsafe { this.swapchain_fn.get_swapchain_images(swapchain) }?;
        this.create_image_views()?;
        this.create_render_pass()?;
        this.create_depth_resources()?;
        this.create_framebuffers()?;

        Ok(this)
    }

    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_format(&self) -> vk::Format {
        self.properties.format.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.properties.extent
    }

    pub fn width(&self) -> u32 {
        self.properties.extent.width
    }

    pub fn height(&self) -> u32 {
        self.properties.extent.height
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        aspect_ratio(self.properties.extent)
    }

    /// Whether `other` renders into attachments of the same formats, i.e.
    /// pipelines built against one render pass stay valid for the other.
    pub fn compare_swap_formats(&self, other: &Swapchain) -> bool {
        self.depth_format == other.depth_format && self.image_format() == other.image_format()
    }

    pub fn find_depth_format(context: &VkContext) -> EngineResult<vk::Format> {
        context.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Acquires the next image, signalling `semaphore` once it is usable.
    ///
    /// Returns the raw result so the caller can react to `ERROR_OUT_OF_DATE_KHR`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_fn.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` is signalled.
    /// `Ok(true)` means the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let wait_semaphores = [wait_semaphore];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);

        unsafe { self.swapchain_fn.queue_present(queue, &present_info) }
    }

    fn create_image_views(&mut self) -> EngineResult<()> {
        let format = self.properties.format.format;
        for image in self.images.clone() {
            let view =
                create_image_view(&self.context, image, format, vk::ImageAspectFlags::COLOR)?;
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_render_pass(&mut self) -> EngineResult<()> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(self.properties.format.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let depth_attachment = vk::AttachmentDescription::default()
            .format(self.depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        // the presentation engine may still read the image when acquisition signals
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )];

        let attachments = [color_attachment, depth_attachment];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        self.render_pass = unsafe { self.context.device.create_render_pass(&create_info, None) }?;
        Ok(())
    }

    fn create_depth_resources(&mut self) -> EngineResult<()> {
        let extent = self.properties.extent;
        for _ in 0..self.images.len() {
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .format(self.depth_format)
                .tiling(vk::ImageTiling::OPTIMAL)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let (image, memory) = self
                .context
                .create_image_with_info(&image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
            let view = match create_image_view(
                &self.context,
                image,
                self.depth_format,
                vk::ImageAspectFlags::DEPTH,
            ) {
                Ok(view) => view,
                Err(err) => {
                    unsafe {
                        self.context.device.destroy_image(image, None);
                        self.context.device.free_memory(memory, None);
                    }
                    return Err(err);
                }
            };

            self.depth_attachments.push(DepthAttachment {
                image,
                memory,
                view,
            });
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> EngineResult<()> {
        let extent = self.properties.extent;
        for (color_view, depth) in self.image_views.iter().zip(&self.depth_attachments) {
            let attachments = [*color_view, depth.view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer =
                unsafe { self.context.device.create_framebuffer(&create_info, None) }?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::debug!("Start: Dropping swapchain");
        let device = &self.context.device;
        unsafe {
            self.framebuffers
                .drain(..)
                .for_each(|framebuffer| device.destroy_framebuffer(framebuffer, None));
            self.depth_attachments.drain(..).for_each(|depth| {
                device.destroy_image_view(depth.view, None);
                device.destroy_image(depth.image, None);
                device.free_memory(depth.memory, None);
            });
            device.destroy_render_pass(self.render_pass, None);
            self.image_views
                .drain(..)
                .for_each(|image_view| device.destroy_image_view(image_view, None));
            self.swapchain_fn.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("End: Dropping swapchain");
    }
}

fn create_image_view(
    context: &VkContext,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> EngineResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    Ok(unsafe { context.device.create_image_view(&create_info, None) }?)
}

pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height as f32
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SwapchainProperties {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn new(
        device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> EngineResult<Self> {
        let capabilities =
            unsafe { surface_fn.get_physical_device_surface_capabilities(device, surface) }?;
        let formats = unsafe { surface_fn.get_physical_device_surface_formats(device, surface) }?;
        let present_modes =
            unsafe { surface_fn.get_physical_device_surface_present_modes(device, surface) }?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    pub fn get_ideal_swapchain_properties(
        &self,
        preferred_dimensions: [u32; 2],
        vsync: bool,
    ) -> SwapchainProperties {
        let format = Self::choose_swapchain_surface_format(&self.formats);
        let present_mode = Self::choose_swapchain_present_mode(&self.present_modes, vsync);
        let extent = Self::choose_swapchain_extent(self.capabilities, preferred_dimensions);
        SwapchainProperties {
            format,
            present_mode,
            extent,
        }
    }

    /// One more image than the minimum, so the driver never stalls us, but
    /// never more than the maximum (0 meaning unbounded).
    pub fn image_count(&self) -> u32 {
        let max = self.capabilities.max_image_count;
        let preferred = self.capabilities.min_image_count + 1;
        if max > 0 && preferred > max {
            max
        } else {
            preferred
        }
    }

    /// Choose the swapchain surface format.
    ///
    /// Will choose B8G8R8A8_SRGB/SRGB_NONLINEAR if possible or
    /// the first available otherwise.
    pub fn choose_swapchain_surface_format(
        available_formats: &[vk::SurfaceFormatKHR],
    ) -> vk::SurfaceFormatKHR {
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        if available_formats.len() == 1 && available_formats[0].format == vk::Format::UNDEFINED {
            return preferred;
        }

        available_formats
            .iter()
            .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
            .or_else(|| available_formats.first())
            .copied()
            .unwrap_or(preferred)
    }

    /// Choose the swapchain present mode.
    ///
    /// Favors MAILBOX (aka. triple buffering) unless `vsync` is requested,
    /// FIFO otherwise, which every implementation has to support.
    pub fn choose_swapchain_present_mode(
        available_present_modes: &[vk::PresentModeKHR],
        vsync: bool,
    ) -> vk::PresentModeKHR {
        if !vsync && available_present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            log::debug!("Present mode: Mailbox");
            vk::PresentModeKHR::MAILBOX
        } else {
            log::debug!("Present mode: V-Sync");
            vk::PresentModeKHR::FIFO
        }
    }

    /// Choose the swapchain extent.
    ///
    /// If a current extent is defined it will be returned.
    /// Otherwise, the surface extent clamped between the min
    /// and max image extent will be returned.
    pub fn choose_swapchain_extent(
        capabilities: vk::SurfaceCapabilitiesKHR,
        preferred_dimensions: [u32; 2],
    ) -> vk::Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            return capabilities.current_extent;
        }

        let min = capabilities.min_image_extent;
        let max = capabilities.max_image_extent;
        let width = preferred_dimensions[0].min(max.width).max(min.width);
        let height = preferred_dimensions[1].min(max.height).max(min.height);
        vk::Extent2D { width, height }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("properties", &self.properties)
            .field("depth_format", &self.depth_format)
            .field(
                "images",
                &self.images.iter().map(|image| format!("{image:?}")).join(", "),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_bgra_format() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = SwapchainSupportDetails::choose_swapchain_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = SwapchainSupportDetails::choose_swapchain_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let formats = [surface_format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let chosen = SwapchainSupportDetails::choose_swapchain_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn present_mode_honours_vsync() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            SwapchainSupportDetails::choose_swapchain_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            SwapchainSupportDetails::choose_swapchain_present_mode(&modes, true),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            SwapchainSupportDetails::choose_swapchain_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
                false
            ),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_extent_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };
        let extent = SwapchainSupportDetails::choose_swapchain_extent(caps, [800, 600]);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn extent_clamps_window_size_when_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = SwapchainSupportDetails::choose_swapchain_extent(caps, [4000, 50]);
        assert_eq!((extent.width, extent.height), (1920, 100));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let details = |min, max| SwapchainSupportDetails {
            capabilities: capabilities(min, max),
            formats: Vec::new(),
            present_modes: Vec::new(),
        };
        assert_eq!(details(2, 8).image_count(), 3);
        assert_eq!(details(3, 3).image_count(), 3);
        // max of zero means no upper bound
        assert_eq!(details(2, 0).image_count(), 3);
    }

    #[test]
    fn aspect_ratio_is_width_over_height() {
        let ratio = aspect_ratio(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert!((ratio - 4.0 / 3.0).abs() < f32::EPSILON);
    }
}
