//! Windowed runner and main loop

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::core::{ConfigError, EngineConfig, EngineContext};
use crate::renderer::{GpuDevice, GpuError, RenderError, WgpuDevice};
use crate::scene::SceneError;

/// Errors that stop the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
}

/// Game trait that users implement
pub trait Game: 'static {
    /// Called once when the window and GPU are ready. Build the scene and
    /// the render graph here.
    ///
    /// # Errors
    ///
    /// An error stops the engine before the first frame
    fn init(&mut self, ctx: &mut EngineContext, gpu: &mut dyn GpuDevice) -> Result<(), EngineError>;

    /// Called every frame before the scene update
    fn update(&mut self, _ctx: &mut EngineContext) {}

    /// Called when the window is resized
    fn on_resize(&mut self, _ctx: &mut EngineContext, _width: u32, _height: u32) {}

    /// Called when the game is shutting down
    fn shutdown(&mut self, _ctx: &mut EngineContext) {}
}

/// Main engine struct
pub struct Engine<G: Game> {
    config: EngineConfig,
    game: G,
    window: Option<Arc<Window>>,
    gpu: Option<WgpuDevice>,
    context: Option<EngineContext>,
    next_frame: Instant,
    error: Option<EngineError>,
}

impl<G: Game> Engine<G> {
    /// Create a new engine with the given game
    pub fn new(config: EngineConfig, game: G) -> Self {
        Self {
            config,
            game,
            window: None,
            gpu: None,
            context: None,
            next_frame: Instant::now(),
            error: None,
        }
    }

    /// Run the engine until the window closes
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the engine, if any
    pub fn run(mut self) -> Result<(), EngineError> {
        // A logger installed by the host wins
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.config.log_filter.as_str()),
        )
        .try_init();
        log::info!("Starting engine: {}", self.config.title);

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / f64::from(self.config.target_fps)))
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut gpu = WgpuDevice::new(Arc::clone(&window), self.config.vsync)?;
        let (width, height) = gpu.surface_size();
        let config = self.config.clone().with_size(width, height);
        let mut context = EngineContext::new(&config, &mut gpu)?;
        self.game.init(&mut context, &mut gpu)?;

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.context = Some(context);
        log::info!("Engine initialized successfully");
        Ok(())
    }

    /// Update, render and present one frame. Returns false once the game
    /// has asked to quit.
    fn frame(&mut self) -> Result<bool, EngineError> {
        let (Some(ctx), Some(gpu)) = (self.context.as_mut(), self.gpu.as_mut()) else {
            return Ok(true);
        };

        ctx.time.tick();
        self.game.update(ctx);
        if ctx.should_quit() {
            return Ok(false);
        }
        ctx.update();
        ctx.render(gpu)?;

        if let Ok(framebuffer) = ctx.graph.final_framebuffer() {
            gpu.present(framebuffer.color_texture())?;
        }
        Ok(true)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let (Some(ctx), Some(gpu)) = (self.context.as_mut(), self.gpu.as_mut()) else {
            return Ok(());
        };
        gpu.resize_surface(width, height);
        ctx.resize(gpu, width, height)?;
        self.game.on_resize(ctx, width, height);
        Ok(())
    }

    fn screenshot(&mut self) {
        let (Some(ctx), Some(gpu)) = (self.context.as_ref(), self.gpu.as_mut()) else {
            return;
        };
        let path = format!("frame_{:05}.png", ctx.time.frame_count());
        match ctx.graph.export_png(gpu, &path) {
            Ok(()) => log::info!("Saved {}", path),
            Err(e) => log::error!("Screenshot failed: {}", e),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let (Some(ctx), Some(gpu)) = (self.context.as_mut(), self.gpu.as_mut()) {
            self.game.shutdown(ctx);
            ctx.graph.release(gpu);
        }
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: EngineError) {
        log::error!("Fatal: {}", error);
        self.error = Some(error);
        self.shutdown(event_loop);
    }
}

impl<G: Game> ApplicationHandler for Engine<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.initialize(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    if let Err(e) = self.resize(new_size.width, new_size.height) {
                        self.fail(event_loop, e);
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        if let Some(ctx) = self.context.as_mut() {
                            ctx.quit();
                        }
                    }
                    PhysicalKey::Code(KeyCode::F12) => self.screenshot(),
                    _ => {}
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(interval) = self.frame_interval() {
                    self.next_frame = Instant::now() + interval;
                }
                match self.frame() {
                    Ok(true) => {}
                    Ok(false) => self.shutdown(event_loop),
                    Err(e) => self.fail(event_loop, e),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };
        if self.frame_interval().is_some() && Instant::now() < self.next_frame {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }
}
