use crate::debug::{
    check_validation_layer_support, get_layer_names_and_pointers, setup_debug_messenger,
};
use crate::error::{EngineError, EngineResult};
use crate::swapchain::SwapchainSupportDetails;
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Device, Entry, Instance};
use itertools::Itertools;
use std::ffi::CStr;
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_index: u32,
    pub present_index: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics_index == self.present_index
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut indices = vec![self.graphics_index, self.present_index];
        indices.dedup();
        indices
    }
}

#[derive(Copy, Clone)]
pub struct QueueData {
    pub queue: vk::Queue,
    pub family_index: u32,
}

/// Instance, surface and logical device, plus the command pool used for
/// per-frame and one-shot command buffers.
pub struct VkContext {
    _vulkan_fn: Entry,
    pub instance: Instance,
    debug_report_callback: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_fn: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: QueueData,
    pub present_queue: QueueData,
    pub command_pool: vk::CommandPool,
    properties: vk::PhysicalDeviceProperties,
}

impl VkContext {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn surface_fn(&self) -> &surface::Instance {
        &self.surface_fn
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn get_mem_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        }
    }

    pub fn swapchain_support(&self) -> EngineResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::new(self.physical_device, &self.surface_fn, self.surface)
    }

    /// Find the first compatible format from `candidates`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> EngineResult<vk::Format> {
        candidates
            .iter()
            .cloned()
            .find(|candidate| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, *candidate)
                };
                (tiling == vk::ImageTiling::LINEAR
                    && props.linear_tiling_features.contains(features))
                    || (tiling == vk::ImageTiling::OPTIMAL
                        && props.optimal_tiling_features.contains(features))
            })
            .ok_or_else(|| EngineError::NoSupportedFormat(candidates.to_vec()))
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> EngineResult<u32> {
        find_memory_type_index(&self.get_mem_properties(), type_filter, properties)
    }

    pub fn initialize(window: &Window, validation: bool) -> EngineResult<Self> {
        log::debug!("Creating vulkan context");
        let vulkan_fn = unsafe { Entry::load() }?;
        let instance = Self::create_instance(&vulkan_fn, window, validation)?;

        let debug_report_callback = if validation {
            Some(setup_debug_messenger(&vulkan_fn, &instance)?)
        } else {
            None
        };

        let surface_fn = surface::Instance::new(&vulkan_fn, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &vulkan_fn,
                &instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )
        }?;

        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_fn, surface)?;
        let device = Self::create_logical_device(&instance, physical_device, queue_families)?;

        // graphics and present queue are created with the device, only retrieved here
        let graphics_queue = QueueData {
            queue: unsafe { device.get_device_queue(queue_families.graphics_index, 0) },
            family_index: queue_families.graphics_index,
        };
        let present_queue = QueueData {
            queue: unsafe { device.get_device_queue(queue_families.present_index, 0) },
            family_index: queue_families.present_index,
        };

        let commandpool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_families.graphics_index)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.create_command_pool(&commandpool_info, None) }?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        Ok(Self {
            _vulkan_fn: vulkan_fn,
            instance,
            debug_report_callback,
            surface_fn,
            surface,
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue,
            command_pool,
            properties,
        })
    }

    fn create_instance(
        vulkan_fn: &Entry,
        window: &Window,
        validation: bool,
    ) -> EngineResult<Instance> {
        let app_name = c"Mesh Viewer";
        let engine_name = c"No Engine";
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extension_names =
            ash_window::enumerate_required_extensions(window.display_handle()?.as_raw())?
                .to_vec();

        if validation {
            extension_names.push(debug_utils::NAME.as_ptr());
        }

        let layer_names_ptrs = get_layer_names_and_pointers();

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names);

        if validation {
            check_validation_layer_support(vulkan_fn)?;
            instance_create_info = instance_create_info.enabled_layer_names(&layer_names_ptrs);
        }

        Ok(unsafe { vulkan_fn.create_instance(&instance_create_info, None) }?)
    }

    fn pick_physical_device(
        instance: &Instance,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> EngineResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let available_devices = unsafe { instance.enumerate_physical_devices() }?;
        log::debug!("Found {} physical device(s)", available_devices.len());

        for candidate in available_devices {
            if let Some(families) =
                Self::is_device_suitable(instance, surface_fn, surface, candidate)?
            {
                let props = unsafe { instance.get_physical_device_properties(candidate) };
                log::info!("Selected physical device: {:?}", unsafe {
                    CStr::from_ptr(props.device_name.as_ptr())
                });
                return Ok((candidate, families));
            }
        }

        Err(EngineError::NoSuitableDevice)
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> EngineResult<Device> {
        let queue_priorities = [1.0_f32];
        // Vulkan does not allow passing duplicated family indices and the family
        // for graphics and presentation could be the same.
        let queue_create_infos = queue_families
            .unique()
            .iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*index)
                    .queue_priorities(&queue_priorities)
            })
            .collect_vec();

        let device_extensions_ptrs = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect_vec();

        let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extensions_ptrs)
            .enabled_features(&device_features);

        Ok(unsafe { instance.create_device(physical_device, &device_create_info, None) }?)
    }

    fn is_device_suitable(
        instance: &Instance,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> EngineResult<Option<QueueFamilyIndices>> {
        let Some(families) =
            Self::find_queue_families(instance, surface_fn, surface, physical_device)?
        else {
            return Ok(None);
        };

        if !Self::check_device_extension_support(instance, physical_device)? {
            return Ok(None);
        }

        let details = SwapchainSupportDetails::new(physical_device, surface_fn, surface)?;
        let is_swapchain_usable = !details.formats.is_empty() && !details.present_modes.is_empty();

        let features = unsafe { instance.get_physical_device_features(physical_device) };

        Ok((is_swapchain_usable && features.sampler_anisotropy == vk::TRUE).then_some(families))
    }

    fn check_device_extension_support(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> EngineResult<bool> {
        let extension_properties =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }?;

        Ok(Self::get_required_device_extensions()
            .iter()
            .all(|extension| {
                extension_properties.iter().any(|ext| {
                    let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                    *extension == ext_name
                })
            }))
    }

    fn get_required_device_extensions() -> [&'static CStr; 1] {
        [ash::khr::swapchain::NAME]
    }

    /// Find a queue family with at least one graphics queue and one with
    /// at least one presentation queue from `device`.
    ///
    /// Returns `None` unless both were found.
    fn find_queue_families(
        instance: &Instance,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> EngineResult<Option<QueueFamilyIndices>> {
        let mut graphics = None;
        let mut present = None;

        let props =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in props.iter().enumerate().filter(|(_, f)| f.queue_count > 0) {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
                graphics = Some(index);
            }

            let present_support = unsafe {
                surface_fn.get_physical_device_surface_support(physical_device, index, surface)
            }?;

            if present_support && present.is_none() {
                present = Some(index);
            }

            if graphics.is_some() && present.is_some() {
                break;
            }
        }

        Ok(graphics.zip(present).map(|(graphics_index, present_index)| {
            QueueFamilyIndices {
                graphics_index,
                present_index,
            }
        }))
    }

    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> EngineResult<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(self.find_memory_type(requirements.memory_type_bits, properties)?);

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }?;
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }?;

        Ok((buffer, memory))
    }

    pub fn create_image_with_info(
        &self,
        image_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> EngineResult<(vk::Image, vk::DeviceMemory)> {
        let image = unsafe { self.device.create_image(image_info, None) }?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(self.find_memory_type(requirements.memory_type_bits, properties)?);

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }?;
        unsafe { self.device.bind_image_memory(image, memory, 0) }?;

        Ok((image, memory))
    }

    pub fn begin_single_time_commands(&self) -> EngineResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);

        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }?;

        Ok(cmd)
    }

    /// Submits `cmd` to the graphics queue, blocks until it finished and frees it.
    pub fn end_single_time_commands(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        let cmds = [cmd];
        unsafe {
            self.device.end_command_buffer(cmd)?;
            let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
            self.device.queue_submit(
                self.graphics_queue.queue,
                &[submit_info],
                vk::Fence::null(),
            )?;
            self.device.queue_wait_idle(self.graphics_queue.queue)?;
            self.device.free_command_buffers(self.command_pool, &cmds);
        }
        Ok(())
    }

    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> EngineResult<()> {
        let cmd = self.begin_single_time_commands()?;
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        self.end_single_time_commands(cmd)
    }

    pub fn wait_idle(&self) -> EngineResult<()> {
        Ok(unsafe { self.device.device_wait_idle() }?)
    }
}

impl Drop for VkContext {
    fn drop(&mut self) {
        log::debug!("Start: Dropping context");
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            if let Some((report, callback)) = self.debug_report_callback.take() {
                report.destroy_debug_utils_messenger(callback, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("End: Dropping context");
    }
}

/// First memory type allowed by `type_filter` that has all of `properties`.
pub fn find_memory_type_index(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> EngineResult<u32> {
    (0..mem_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && mem_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(EngineError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}
