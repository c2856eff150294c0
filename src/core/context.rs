//! Engine-wide state shared by the runner and game code

use std::path::Path;
use std::time::Duration;

use crate::core::{EngineConfig, LayerRegistry, Time};
use crate::renderer::{
    Camera, GpuDevice, GpuError, PassRegistry, RenderError, RenderGraph, RenderGraphDescription,
    ShaderLibrary,
};
use crate::scene::{ComponentRegistry, ObjectId, Scene, SceneData, SceneError};

/// Hands out numeric object ids, starting at 1
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: ObjectId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ObjectId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Make sure `id` is never handed out again
    pub fn observe(&mut self, id: ObjectId) {
        if id >= self.next {
            self.next = id + 1;
        }
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }

    /// The id the next `allocate` returns
    #[must_use]
    pub fn peek(&self) -> ObjectId {
        self.next
    }
}

/// Context passed to game callbacks
pub struct EngineContext {
    /// Time tracking
    pub time: Time,
    pub ids: IdAllocator,
    pub layers: LayerRegistry,
    pub components: ComponentRegistry,
    pub shaders: ShaderLibrary,
    pub passes: PassRegistry,
    pub scene: Scene,
    pub graph: RenderGraph,
    pub camera: Camera,
    /// Window size
    window_size: (u32, u32),
    /// Should the engine quit
    should_quit: bool,
}

impl EngineContext {
    /// Fresh context with the built-in shaders compiled on `gpu`
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in shader fails to compile
    pub fn new(config: &EngineConfig, gpu: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        let mut ids = IdAllocator::new();
        let scene = Scene::new("Main", &mut ids);
        let mut camera = Camera::new();
        camera.set_aspect(config.width, config.height);

        Ok(Self {
            time: Time::new(config.fixed_timestep),
            ids,
            layers: LayerRegistry::new(),
            components: ComponentRegistry::with_builtins(),
            shaders: ShaderLibrary::with_builtins(gpu)?,
            passes: PassRegistry::with_builtins(),
            scene,
            graph: RenderGraph::new(),
            camera,
            window_size: (config.width.max(1), config.height.max(1)),
            should_quit: false,
        })
    }

    /// Get window width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.window_size.0
    }

    /// Get window height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.window_size.1
    }

    /// Get aspect ratio
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.window_size.0 as f32 / self.window_size.1.max(1) as f32
    }

    /// Run the fixed steps due this frame, then the per-frame update
    pub fn update(&mut self) {
        let step = self.time.fixed_step();
        for _ in 0..self.time.drain_fixed_steps() {
            self.scene.fixed_update(step);
        }
        self.scene.update(self.time.delta_seconds());
    }

    /// Run the render graph. An empty graph renders nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has no final pass or a pass fails
    pub fn render(&mut self, gpu: &mut dyn GpuDevice) -> Result<(), RenderError> {
        if self.graph.is_empty() {
            return Ok(());
        }
        self.graph.render_pipeline(
            gpu,
            &self.camera,
            &self.scene,
            self.time.elapsed_seconds(),
        )
    }

    /// One whole frame with an explicit delta: time, updates, rendering
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails
    pub fn advance(&mut self, delta: Duration, gpu: &mut dyn GpuDevice) -> Result<(), RenderError> {
        self.time.advance(delta);
        self.update();
        self.render(gpu)
    }

    /// Replace the scene with persisted data. Object ids restart, so the
    /// loaded ids are reproduced exactly. Components of the old scene receive
    /// `on_destroy` first.
    pub fn reload_scene(&mut self, data: &SceneData) {
        self.scene.clear();
        self.ids.reset();
        self.scene = Scene::from_data(data, &mut self.ids, &self.layers, &self.components);
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_scene(&mut self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let data = SceneData::load_ron(path)?;
        self.reload_scene(&data);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn save_scene(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        self.scene.to_data(&self.layers).save_ron(path)
    }

    /// Replace the render graph with one built from `desc` at window size.
    /// On failure the current graph is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the description cannot be built
    pub fn load_graph(
        &mut self,
        gpu: &mut dyn GpuDevice,
        desc: &RenderGraphDescription,
    ) -> Result<(), RenderError> {
        let graph = RenderGraph::from_description(
            gpu,
            desc,
            &self.passes,
            &self.shaders,
            self.width(),
            self.height(),
        )?;
        let mut old = std::mem::replace(&mut self.graph, graph);
        old.release(gpu);
        Ok(())
    }

    /// Track a new window size. Zero sizes (minimised windows) are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass framebuffer cannot be recreated
    pub fn resize(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.window_size = (width, height);
        self.camera.set_aspect(width, height);
        self.graph.resize(gpu, width, height)
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Check if engine should quit
    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::renderer::{
        GeometryPass, GpuCommand, HeadlessDevice, PassDescription, RenderPass,
    };
    use crate::scene::{Component, ComponentContext};

    struct StepCounter {
        fixed: Rc<Cell<u32>>,
        frames: Rc<Cell<u32>>,
    }

    impl Component for StepCounter {
        fn type_name(&self) -> &'static str {
            "StepCounter"
        }

        fn update(&mut self, _ctx: &mut ComponentContext<'_>, _dt: f32) {
            self.frames.set(self.frames.get() + 1);
        }

        fn fixed_update(&mut self, _ctx: &mut ComponentContext<'_>, _step: f32) {
            self.fixed.set(self.fixed.get() + 1);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn context(gpu: &mut HeadlessDevice) -> EngineContext {
        let config = EngineConfig::default()
            .with_size(64, 32)
            .with_fixed_timestep(0.25);
        EngineContext::new(&config, gpu).unwrap()
    }

    #[test]
    fn test_id_allocator_observe() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        ids.observe(10);
        assert_eq!(ids.allocate(), 11);
        ids.observe(3);
        assert_eq!(ids.peek(), 12);
        ids.reset();
        assert_eq!(ids.allocate(), 1);
    }

    #[test]
    fn test_advance_runs_fixed_steps_then_update() {
        let mut gpu = HeadlessDevice::new();
        let mut ctx = context(&mut gpu);
        let fixed = Rc::new(Cell::new(0));
        let frames = Rc::new(Cell::new(0));
        let entity = ctx.scene.spawn(&mut ctx.ids, "Counter", ctx.scene.root()).unwrap();
        ctx.scene
            .add_component(
                entity,
                StepCounter {
                    fixed: Rc::clone(&fixed),
                    frames: Rc::clone(&frames),
                },
            )
            .unwrap();

        ctx.advance(Duration::from_millis(500), &mut gpu).unwrap();
        assert_eq!(fixed.get(), 2);
        assert_eq!(frames.get(), 1);

        ctx.advance(Duration::from_millis(100), &mut gpu).unwrap();
        assert_eq!(fixed.get(), 2);
        assert_eq!(frames.get(), 2);
    }

    #[test]
    fn test_render_requires_final_pass() {
        let mut gpu = HeadlessDevice::new();
        let mut ctx = context(&mut gpu);
        assert!(ctx.render(&mut gpu).is_ok());

        let sprite = ctx.shaders.get("sprite").unwrap();
        let pass = GeometryPass::new(&mut gpu, "scene", sprite, 64, 32).unwrap();
        ctx.graph.add_pass(Box::new(pass));
        assert!(matches!(
            ctx.render(&mut gpu),
            Err(RenderError::NoFinalPass)
        ));

        ctx.graph.set_final_pass("scene").unwrap();
        gpu.take_commands();
        ctx.render(&mut gpu).unwrap();
        assert!(gpu.commands().contains(&GpuCommand::UnbindFramebuffer));
    }

    #[test]
    fn test_reload_scene_reproduces_ids() {
        let mut gpu = HeadlessDevice::new();
        let mut ctx = context(&mut gpu);
        let a = ctx.scene.spawn(&mut ctx.ids, "A", ctx.scene.root()).unwrap();
        let a_id = ctx.scene.object(a).unwrap().id();
        let data = ctx.scene.to_data(&ctx.layers);

        ctx.ids.allocate();
        ctx.ids.allocate();
        ctx.reload_scene(&data);

        let loaded = ctx.scene.find_by_name("A").unwrap();
        assert_eq!(ctx.scene.object(loaded).unwrap().id(), a_id);
        assert_eq!(ctx.ids.peek(), a_id + 1);
    }

    struct DestroyCounter(Rc<Cell<u32>>);

    impl Component for DestroyCounter {
        fn type_name(&self) -> &'static str {
            "DestroyCounter"
        }

        fn on_destroy(&mut self, _ctx: &mut ComponentContext<'_>) {
            self.0.set(self.0.get() + 1);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_reload_scene_destroys_old_components() {
        let mut gpu = HeadlessDevice::new();
        let mut ctx = context(&mut gpu);
        let data = ctx.scene.to_data(&ctx.layers);
        let destroyed = Rc::new(Cell::new(0));
        let a = ctx.scene.spawn(&mut ctx.ids, "A", ctx.scene.root()).unwrap();
        let b = ctx.scene.spawn(&mut ctx.ids, "B", a).unwrap();
        ctx.scene
            .add_component(a, DestroyCounter(Rc::clone(&destroyed)))
            .unwrap();
        ctx.scene
            .add_component(b, DestroyCounter(Rc::clone(&destroyed)))
            .unwrap();

        ctx.reload_scene(&data);
        assert_eq!(destroyed.get(), 2);
        assert!(ctx.scene.find_by_name("A").is_none());
    }

    #[test]
    fn test_load_graph_and_resize() {
        let mut gpu = HeadlessDevice::new();
        let mut ctx = context(&mut gpu);
        let desc = RenderGraphDescription {
            passes: vec![PassDescription {
                name: "scene".into(),
                kind: "geometry".into(),
                shader: "sprite".into(),
                inputs: 0,
                layer_mask: u32::MAX,
                clear_color: None,
                params: Vec::new(),
                debug: false,
            }],
            connections: Vec::new(),
            final_pass: Some("scene".into()),
        };
        ctx.load_graph(&mut gpu, &desc).unwrap();
        assert_eq!(ctx.graph.final_framebuffer().unwrap().width(), 64);

        ctx.resize(&mut gpu, 0, 10).unwrap();
        assert_eq!(ctx.width(), 64);

        ctx.resize(&mut gpu, 128, 64).unwrap();
        assert_eq!(ctx.aspect_ratio(), 2.0);
        assert_eq!(ctx.camera.aspect, 2.0);
        let pass = ctx.graph.pass("scene").unwrap();
        assert_eq!(pass.core().framebuffer().width(), 128);
        assert_eq!(pass.core().framebuffer().height(), 64);

        // A failing description keeps the current graph
        let mut bad = desc.clone();
        bad.passes[0].kind = "bloom".into();
        assert!(ctx.load_graph(&mut gpu, &bad).is_err());
        assert!(ctx.graph.contains("scene"));
    }
}
