mod game;

use crate::game::Game;
use anyhow::Context;
use engine::config::{EngineConfig, DEFAULT_CONFIG_PATH};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ControlFlow::Poll;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = EngineConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {config_path}"))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(Poll);

    let mut app = Application::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Application {
    config: EngineConfig,
    // dropped before the window it renders into
    game: Option<Game>,
    window: Option<Window>,
    error: Option<anyhow::Error>,
}

impl Application {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            game: None,
            window: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for Application {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title(window_config.title.clone())
                .with_inner_size(PhysicalSize::new(window_config.width, window_config.height)),
        ) {
            Ok(window) => window,
            Err(err) => {
                let err = anyhow::Error::new(err).context("Failed to create window");
                return self.fail(event_loop, err);
            }
        };

        match Game::new(&window, self.config.clone()) {
            Ok(game) => self.game = Some(game),
            Err(err) => {
                let err = anyhow::Error::new(err).context("Failed to initialize renderer");
                return self.fail(event_loop, err);
            }
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(game) = self.game.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                game.handle_key_event(&event);
            }
            WindowEvent::Focused(false) => {
                game.focus_lost();
            }
            WindowEvent::Resized(size) => {
                game.resize(size);
            }
            WindowEvent::RedrawRequested => {
                if let Some(window) = self.window.as_ref() {
                    window.pre_present_notify();
                }
                if let Err(err) = game.draw_frame() {
                    self.fail(event_loop, anyhow::Error::new(err).context("Failed to draw frame"));
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _: &ActiveEventLoop) {
        // Last code run before the event loop exits: the game owns the surface
        // and has to be gone before the window.
        if let Some(game) = self.game.take() {
            if let Err(err) = game.wait_idle() {
                log::error!("Failed waiting for the GPU on exit: {err}");
            }
            drop(game);
        }
    }
}
