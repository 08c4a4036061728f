//! A small Vulkan mesh viewer engine: device setup, swapchain and
//! frame-in-flight management, plus the scene types needed to draw OBJ models.

pub mod buffer;
pub mod camera;
pub mod config;
pub mod context;
mod debug;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod frame_info;
pub mod game_object;
pub mod input;
pub mod model;
pub mod pipeline;
pub mod renderer;
pub mod swapchain;
pub mod systems;

pub use buffer::Buffer;
pub use camera::Camera;
pub use config::EngineConfig;
pub use context::VkContext;
pub use error::{EngineError, EngineResult};
pub use frame::MAX_FRAMES_IN_FLIGHT;
pub use frame_info::{FrameInfo, GlobalUbo};
pub use game_object::{GameObject, GameObjectMap, TransformComponent};
pub use input::{InputState, KeyboardMovementController};
pub use model::{Model, ModelBuilder, Vertex};
pub use renderer::Renderer;
