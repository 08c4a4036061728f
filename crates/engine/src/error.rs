use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Window handle unavailable: {0}")]
    WindowHandle(#[from] winit::raw_window_handle::HandleError),

    #[error("No suitable physical device found")]
    NoSuitableDevice,

    #[error("Validation layer {0} requested but not available")]
    MissingValidationLayer(String),

    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("No supported format among candidates {0:?}")]
    NoSupportedFormat(Vec<vk::Format>),

    #[error("Swapchain image or depth format changed during recreation")]
    SwapchainFormatChanged,

    #[error("Cannot begin a frame while another one is in progress")]
    FrameAlreadyInProgress,

    #[error("No frame in progress")]
    FrameNotInProgress,

    #[error("Swapchain image index {index} out of range ({count} images)")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Descriptor binding {0} already in use")]
    DuplicateBinding(u32),

    #[error("Descriptor set layout does not contain binding {0}")]
    UnknownBinding(u32),

    #[error("Descriptor binding {binding} expects {count} descriptors, got a single info")]
    ArrayBindingWrite { binding: u32, count: u32 },

    #[error("Descriptor pool has no room left: {0}")]
    DescriptorPoolExhausted(vk::Result),

    #[error("Buffer is not mapped")]
    BufferNotMapped,

    #[error("Buffer is already mapped")]
    BufferAlreadyMapped,

    #[error("Range of {size} bytes at offset {offset} is outside {start}..{end}")]
    BufferOverflow {
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        start: vk::DeviceSize,
        end: vk::DeviceSize,
    },

    #[error("Write of {size} bytes from only {data_len} bytes of data")]
    WriteExceedsData { size: vk::DeviceSize, data_len: usize },

    #[error("Model needs at least 3 vertices, got {0}")]
    NotEnoughVertices(usize),

    #[error("Failed to load OBJ model: {0}")]
    ObjLoad(#[from] tobj::LoadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
