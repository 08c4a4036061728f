use crate::error::{EngineError, EngineResult};
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { (*p_callback_data).message_as_c_str() }
        .map(|message| message.to_string_lossy())
        .unwrap_or_default();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("{:?} - {}", message_type, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("{:?} - {}", message_type, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::debug!("{:?} - {}", message_type, message);
    } else {
        log::trace!("{:?} - {}", message_type, message);
    }
    vk::FALSE
}

/// Fails if the validation layer is not installed.
pub fn check_validation_layer_support(entry: &Entry) -> EngineResult<()> {
    let available = unsafe { entry.enumerate_instance_layer_properties() }?;
    let found = available.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER
    });

    if found {
        Ok(())
    } else {
        Err(EngineError::MissingValidationLayer(
            VALIDATION_LAYER.to_string_lossy().into_owned(),
        ))
    }
}

pub fn get_layer_names_and_pointers() -> [*const c_char; 1] {
    [VALIDATION_LAYER.as_ptr()]
}

pub fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> EngineResult<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let create_info = messenger_create_info();
    let debug_utils = debug_utils::Instance::new(entry, instance);
    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;
    log::debug!("Debug messenger installed");
    Ok((debug_utils, messenger))
}
