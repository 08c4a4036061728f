pub mod simple_render_system;

pub use simple_render_system::SimpleRenderSystem;
