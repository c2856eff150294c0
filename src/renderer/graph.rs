//! Render graph: named passes, texture connections and scheduling
//!
//! Passes are executed once per frame in a topological order of the
//! connection graph, so a consumer always samples its producers' output from
//! the current frame. Connections that would close a cycle are rejected when
//! they are made.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use rustc_hash::FxHashMap;

use super::{
    Camera, Connection, Framebuffer, GpuDevice, GpuError, PassBuildContext, PassContext,
    PassRegistry, RenderError, RenderGraphDescription, RenderPass, ShaderLibrary,
};
use crate::scene::Scene;

/// A named collection of render passes plus the edges between them.
#[derive(Default)]
pub struct RenderGraph {
    passes: FxHashMap<String, Box<dyn RenderPass>>,
    /// Pass names in registration order; breaks scheduling ties
    registration: Vec<String>,
    connections: Vec<Connection>,
    final_pass: Option<String>,
    /// Cached schedule, rebuilt after any topology change
    order: Vec<String>,
    order_dirty: bool,
}

impl RenderGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Passes
    // ========================================================================

    /// Register a pass under its name.
    ///
    /// A pass with the same name is replaced and returned; its GPU resources
    /// are still alive and must be released by the caller. Connections to a
    /// replaced pass are kept where the new pass has the slot.
    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) -> Option<Box<dyn RenderPass>> {
        let name = pass.name().to_string();
        let capacity = pass.core().input_count();
        let previous = self.passes.insert(name.clone(), pass);

        if previous.is_some() {
            self.connections.retain(|c| {
                let keep = c.consumer != name || c.slot < capacity;
                if !keep {
                    log::warn!(
                        "Dropping connection {} -> {}[{}]: slot no longer exists",
                        c.producer,
                        c.consumer,
                        c.slot
                    );
                }
                keep
            });
            log::debug!("Replaced render pass '{name}'");
        } else {
            log::debug!("Added render pass '{name}'");
            self.registration.push(name);
        }
        self.order_dirty = true;
        previous
    }

    /// Unregister a pass, dropping its connections and the final pass
    /// designation if it was the final pass
    pub fn remove_pass(&mut self, name: &str) -> Option<Box<dyn RenderPass>> {
        let pass = self.passes.remove(name)?;
        self.registration.retain(|n| n != name);
        self.connections
            .retain(|c| c.producer != name && c.consumer != name);
        if self.final_pass.as_deref() == Some(name) {
            self.final_pass = None;
        }
        self.order_dirty = true;
        log::debug!("Removed render pass '{name}'");
        Some(pass)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    #[must_use]
    pub fn pass(&self, name: &str) -> Option<&dyn RenderPass> {
        self.passes.get(name).map(Box::as_ref)
    }

    pub fn pass_mut(&mut self, name: &str) -> Option<&mut dyn RenderPass> {
        match self.passes.get_mut(name) {
            Some(pass) => Some(pass.as_mut()),
            None => None,
        }
    }

    /// Concrete access to a pass
    #[must_use]
    pub fn pass_as<T: RenderPass>(&self, name: &str) -> Option<&T> {
        self.passes.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn pass_as_mut<T: RenderPass>(&mut self, name: &str) -> Option<&mut T> {
        self.passes.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    /// Pass names in registration order
    #[must_use]
    pub fn pass_names(&self) -> &[String] {
        &self.registration
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Feed `producer`'s output texture into input `slot` of `consumer`.
    ///
    /// A slot has at most one producer; connecting an occupied slot replaces
    /// the old edge.
    ///
    /// # Errors
    ///
    /// Returns an error if either pass is unknown, the slot is out of range,
    /// or the edge would create a cycle (including a self-connection)
    pub fn connect(&mut self, producer: &str, consumer: &str, slot: usize) -> Result<(), RenderError> {
        if !self.passes.contains_key(producer) {
            return Err(RenderError::UnknownPass(producer.to_string()));
        }
        let capacity = self
            .passes
            .get(consumer)
            .ok_or_else(|| RenderError::UnknownPass(consumer.to_string()))?
            .core()
            .input_count();
        if slot >= capacity {
            return Err(RenderError::InvalidInputSlot {
                pass: consumer.to_string(),
                slot,
                capacity,
            });
        }

        let replaced = |c: &Connection| c.consumer == consumer && c.slot == slot;
        if producer == consumer || self.reaches(consumer, producer, &replaced) {
            return Err(RenderError::CycleDetected {
                from: producer.to_string(),
                to: consumer.to_string(),
            });
        }

        self.connections.retain(|c| !replaced(c));
        self.connections
            .push(Connection::new(producer, consumer, slot));
        self.order_dirty = true;
        log::debug!("Connected {producer} -> {consumer}[{slot}]");
        Ok(())
    }

    /// Remove the edge feeding `consumer`'s `slot`
    pub fn disconnect(&mut self, consumer: &str, slot: usize) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !(c.consumer == consumer && c.slot == slot));
        let removed = self.connections.len() != before;
        if removed {
            self.order_dirty = true;
            log::debug!("Disconnected {consumer}[{slot}]");
        }
        removed
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Whether a path `from -> ... -> to` exists, ignoring edges matching `skip`
    fn reaches(&self, from: &str, to: &str, skip: &dyn Fn(&Connection) -> bool) -> bool {
        let mut stack = vec![from];
        let mut visited: Vec<&str> = Vec::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited.contains(&node) {
                continue;
            }
            visited.push(node);
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.producer == node && !skip(*c))
                    .map(|c| c.consumer.as_str()),
            );
        }
        false
    }

    // ========================================================================
    // Final pass
    // ========================================================================

    /// # Errors
    ///
    /// Returns an error if the pass is unknown
    pub fn set_final_pass(&mut self, name: &str) -> Result<(), RenderError> {
        if !self.passes.contains_key(name) {
            return Err(RenderError::UnknownPass(name.to_string()));
        }
        self.final_pass = Some(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn final_pass(&self) -> Option<&str> {
        self.final_pass.as_deref()
    }

    /// Framebuffer holding the graph's visible result
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NoFinalPass`] if no final pass is set
    pub fn final_framebuffer(&self) -> Result<&Framebuffer, RenderError> {
        let name = self.final_pass.as_deref().ok_or(RenderError::NoFinalPass)?;
        self.passes
            .get(name)
            .map(|pass| pass.core().framebuffer())
            .ok_or_else(|| RenderError::UnknownPass(name.to_string()))
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Passes in execution order
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::CycleDetected`] if the connections are cyclic
    pub fn execution_order(&mut self) -> Result<&[String], RenderError> {
        if self.order_dirty || self.order.len() != self.passes.len() {
            self.order = self.schedule()?;
            self.order_dirty = false;
            log::debug!("Render graph order: {:?}", self.order);
        }
        Ok(&self.order)
    }

    /// Kahn's algorithm; ready passes run in registration order
    fn schedule(&self) -> Result<Vec<String>, RenderError> {
        let index_of: FxHashMap<&str, usize> = self
            .registration
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.registration.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); self.registration.len()];
        for connection in &self.connections {
            let (Some(&from), Some(&to)) = (
                index_of.get(connection.producer.as_str()),
                index_of.get(connection.consumer.as_str()),
            ) else {
                continue;
            };
            outgoing[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.registration.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.registration[node].clone());
            for &next in &outgoing[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != self.registration.len() {
            let stuck = in_degree
                .iter()
                .position(|&degree| degree > 0)
                .map(|i| self.registration[i].clone())
                .unwrap_or_default();
            return Err(RenderError::CycleDetected {
                from: stuck.clone(),
                to: stuck,
            });
        }
        Ok(order)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Render one frame of every pass.
    ///
    /// All consumer slots are first seeded from their producers' current
    /// output textures. Each consumer is then re-fed just before it runs, so
    /// it samples what its producers drew this frame.
    ///
    /// # Errors
    ///
    /// Returns an error if no final pass is set, the graph is cyclic, or a
    /// pass framebuffer cannot be bound
    pub fn render_pipeline(
        &mut self,
        gpu: &mut dyn GpuDevice,
        camera: &Camera,
        scene: &Scene,
        time: f32,
    ) -> Result<(), RenderError> {
        if self.final_pass.is_none() {
            return Err(RenderError::NoFinalPass);
        }
        self.execution_order()?;

        feed_inputs(&mut self.passes, &self.connections, None);

        let mut ctx = PassContext {
            gpu,
            camera,
            scene,
            time,
        };
        for name in &self.order {
            feed_inputs(&mut self.passes, &self.connections, Some(name.as_str()));
            if let Some(pass) = self.passes.get_mut(name) {
                pass.execute(&mut ctx)?;
            }
        }
        Ok(())
    }

    /// Recreate every pass framebuffer at a new size
    ///
    /// # Errors
    ///
    /// Returns the first framebuffer failure
    pub fn resize(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<(), GpuError> {
        for name in &self.registration {
            if let Some(pass) = self.passes.get_mut(name) {
                pass.core_mut().resize(gpu, width, height)?;
            }
        }
        log::debug!("Resized render graph to {width}x{height}");
        Ok(())
    }

    /// Release every pass's GPU resources and empty the graph
    pub fn release(&mut self, gpu: &mut dyn GpuDevice) {
        for name in self.registration.drain(..) {
            if let Some(pass) = self.passes.remove(&name) {
                pass.release(gpu);
            }
        }
        self.passes.clear();
        self.connections.clear();
        self.final_pass = None;
        self.order.clear();
        self.order_dirty = true;
    }

    /// Write the final framebuffer to a PNG file
    ///
    /// # Errors
    ///
    /// Returns an error if no final pass is set or export fails
    pub fn export_png(&self, gpu: &mut dyn GpuDevice, path: impl AsRef<Path>) -> Result<(), RenderError> {
        self.final_framebuffer()?.export_png(gpu, path)
    }

    // ========================================================================
    // Descriptions
    // ========================================================================

    /// Export the graph's configuration
    #[must_use]
    pub fn describe(&self) -> RenderGraphDescription {
        RenderGraphDescription {
            passes: self
                .registration
                .iter()
                .filter_map(|name| self.passes.get(name))
                .map(|pass| pass.describe())
                .collect(),
            connections: self.connections.clone(),
            final_pass: self.final_pass.clone(),
        }
    }

    /// Build a graph from a description. Passes are created at
    /// `width`×`height`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass cannot be built, a connection is invalid
    /// or the final pass is unknown. Passes built before the failure are
    /// released.
    pub fn from_description(
        gpu: &mut dyn GpuDevice,
        desc: &RenderGraphDescription,
        registry: &PassRegistry,
        shaders: &ShaderLibrary,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let mut graph = Self::new();
        if let Err(e) = graph.apply_description(gpu, desc, registry, shaders, width, height) {
            graph.release(gpu);
            return Err(e);
        }
        log::info!(
            "Built render graph with {} passes and {} connections",
            graph.len(),
            graph.connections.len()
        );
        Ok(graph)
    }

    fn apply_description(
        &mut self,
        gpu: &mut dyn GpuDevice,
        desc: &RenderGraphDescription,
        registry: &PassRegistry,
        shaders: &ShaderLibrary,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        for pass_desc in &desc.passes {
            let mut ctx = PassBuildContext {
                gpu: &mut *gpu,
                shaders,
                width,
                height,
            };
            let pass = registry.build(&mut ctx, pass_desc)?;
            if let Some(previous) = self.add_pass(pass) {
                previous.release(gpu);
            }
        }
        for connection in &desc.connections {
            self.connect(&connection.producer, &connection.consumer, connection.slot)?;
        }
        if let Some(name) = &desc.final_pass {
            self.set_final_pass(name)?;
        }
        Ok(())
    }
}

/// Copy producer output handles into consumer slots, for every consumer or
/// just one
fn feed_inputs(
    passes: &mut FxHashMap<String, Box<dyn RenderPass>>,
    connections: &[Connection],
    consumer: Option<&str>,
) {
    for connection in connections {
        if consumer.is_some_and(|name| name != connection.consumer) {
            continue;
        }
        let Some(texture) = passes
            .get(&connection.producer)
            .map(|pass| pass.core().output_texture())
        else {
            continue;
        };
        if let Some(pass) = passes.get_mut(&connection.consumer) {
            pass.core_mut().set_input_texture(connection.slot, texture);
        }
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("passes", &self.registration)
            .field("connections", &self.connections)
            .field("final_pass", &self.final_pass)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::core::IdAllocator;
    use crate::renderer::{
        GeometryPass, GpuCommand, HeadlessDevice, PassCore, PostProcessingPass, Shader,
        TextureHandle, UNSET_TEXTURE,
    };

    type Trace = Rc<RefCell<Vec<(String, Vec<TextureHandle>)>>>;

    /// Records its name and the inputs it saw when executed. Recreates its
    /// framebuffer on every render, so its output handle changes each frame.
    struct TracePass {
        core: PassCore,
        seen: Vec<TextureHandle>,
        trace: Trace,
        churn: bool,
    }

    impl TracePass {
        fn boxed(
            gpu: &mut HeadlessDevice,
            shader: &Shader,
            name: &str,
            inputs: usize,
            trace: &Trace,
        ) -> Box<dyn RenderPass> {
            Box::new(Self {
                core: PassCore::new(gpu, name, shader.clone(), inputs, 8, 8).unwrap(),
                seen: Vec::new(),
                trace: Rc::clone(trace),
                churn: false,
            })
        }
    }

    impl RenderPass for TracePass {
        fn kind(&self) -> &'static str {
            "trace"
        }

        fn core(&self) -> &PassCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut PassCore {
            &mut self.core
        }

        fn render(&mut self, ctx: &mut PassContext<'_>) {
            self.trace
                .borrow_mut()
                .push((self.core.name().to_string(), self.seen.clone()));
            if self.churn {
                let (w, h) = (self.core.framebuffer().width(), self.core.framebuffer().height());
                self.core.resize(ctx.gpu, w + 1, h).unwrap();
            }
        }

        fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), GpuError> {
            self.seen = (0..self.core.input_count())
                .map(|slot| self.core.input_texture(slot))
                .collect();
            self.core.bind_and_prepare(ctx.gpu)?;
            self.render(ctx);
            self.core.unbind(ctx.gpu);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Fixture {
        gpu: HeadlessDevice,
        shaders: ShaderLibrary,
        scene: Scene,
        camera: Camera,
        trace: Trace,
    }

    impl Fixture {
        fn new() -> Self {
            let mut gpu = HeadlessDevice::new();
            let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
            Self {
                gpu,
                shaders,
                scene: Scene::new("Test", &mut IdAllocator::new()),
                camera: Camera::new(),
                trace: Trace::default(),
            }
        }

        fn pass(&mut self, name: &str, inputs: usize) -> Box<dyn RenderPass> {
            let shader = self.shaders.get("blit").unwrap();
            TracePass::boxed(&mut self.gpu, &shader, name, inputs, &self.trace)
        }

        fn run(&mut self, graph: &mut RenderGraph) -> Result<(), RenderError> {
            graph.render_pipeline(&mut self.gpu, &self.camera, &self.scene, 0.0)
        }

        fn executed(&self) -> Vec<String> {
            self.trace.borrow().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    #[test]
    fn test_consumer_runs_after_producer_with_fresh_texture() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        // registered consumer first so registration order alone would be wrong
        graph.add_pass(fx.pass("post", 1));
        let geometry = TracePass {
            core: PassCore::new(&mut fx.gpu, "geometry", fx.shaders.get("sprite").unwrap(), 0, 8, 8)
                .unwrap(),
            seen: Vec::new(),
            trace: Rc::clone(&fx.trace),
            churn: true,
        };
        graph.add_pass(Box::new(geometry));
        graph.connect("geometry", "post", 0).unwrap();
        graph.set_final_pass("post").unwrap();

        fx.run(&mut graph).unwrap();

        assert_eq!(fx.executed(), vec!["geometry", "post"]);
        let produced = graph.pass("geometry").unwrap().core().output_texture();
        let seen = fx.trace.borrow()[1].1.clone();
        assert_eq!(seen, vec![produced]);
        assert_eq!(graph.pass("post").unwrap().core().input_texture(0), UNSET_TEXTURE);
    }

    #[test]
    fn test_cycles_rejected_at_connect() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 1));
        graph.add_pass(fx.pass("b", 1));
        graph.add_pass(fx.pass("c", 1));

        assert!(matches!(
            graph.connect("a", "a", 0),
            Err(RenderError::CycleDetected { .. })
        ));
        graph.connect("a", "b", 0).unwrap();
        assert!(matches!(
            graph.connect("b", "a", 0),
            Err(RenderError::CycleDetected { .. })
        ));
        graph.connect("b", "c", 0).unwrap();
        assert!(matches!(
            graph.connect("c", "a", 0),
            Err(RenderError::CycleDetected { .. })
        ));
        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn test_replacing_slot_edge_can_reverse_direction() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 1));
        graph.add_pass(fx.pass("b", 1));
        graph.connect("a", "b", 0).unwrap();
        // a already feeds b
        assert!(graph.connect("b", "a", 0).is_err());
        graph.disconnect("b", 0);
        graph.connect("b", "a", 0).unwrap();
        assert_eq!(graph.execution_order().unwrap(), &["b", "a"]);
    }

    #[test]
    fn test_connect_validates_names_and_slots() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 0));
        graph.add_pass(fx.pass("b", 2));

        assert!(matches!(
            graph.connect("missing", "b", 0),
            Err(RenderError::UnknownPass(_))
        ));
        assert!(matches!(
            graph.connect("a", "missing", 0),
            Err(RenderError::UnknownPass(_))
        ));
        assert!(matches!(
            graph.connect("a", "b", 2),
            Err(RenderError::InvalidInputSlot {
                slot: 2,
                capacity: 2,
                ..
            })
        ));
        assert!(matches!(
            graph.set_final_pass("missing"),
            Err(RenderError::UnknownPass(_))
        ));
    }

    #[test]
    fn test_rendering_without_final_pass_fails() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 0));
        assert!(matches!(fx.run(&mut graph), Err(RenderError::NoFinalPass)));
        assert!(matches!(
            graph.final_framebuffer(),
            Err(RenderError::NoFinalPass)
        ));
    }

    #[test]
    fn test_order_ties_follow_registration() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        for name in ["composite", "left", "right", "overlay"] {
            let inputs = if name == "composite" { 2 } else { 0 };
            graph.add_pass(fx.pass(name, inputs));
        }
        graph.connect("right", "composite", 1).unwrap();
        graph.connect("left", "composite", 0).unwrap();

        assert_eq!(
            graph.execution_order().unwrap(),
            &["left", "right", "composite", "overlay"]
        );
    }

    #[test]
    fn test_add_pass_overwrites_by_name() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("src", 0));
        graph.add_pass(fx.pass("post", 2));
        graph.connect("src", "post", 1).unwrap();

        let previous = graph.add_pass(fx.pass("post", 1)).unwrap();
        previous.release(&mut fx.gpu);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.pass_names(), &["src", "post"]);
        // slot 1 no longer exists on the replacement
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_remove_pass_drops_edges_and_final() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 0));
        graph.add_pass(fx.pass("b", 1));
        graph.connect("a", "b", 0).unwrap();
        graph.set_final_pass("b").unwrap();

        let removed = graph.remove_pass("b").unwrap();
        removed.release(&mut fx.gpu);
        assert!(graph.connections().is_empty());
        assert_eq!(graph.final_pass(), None);
        assert_eq!(graph.execution_order().unwrap(), &["a"]);
        assert!(graph.remove_pass("b").is_none());
    }

    #[test]
    fn test_second_frame_feeds_again() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 0));
        graph.add_pass(fx.pass("b", 1));
        graph.connect("a", "b", 0).unwrap();
        graph.set_final_pass("b").unwrap();

        fx.run(&mut graph).unwrap();
        fx.run(&mut graph).unwrap();

        let a_out = graph.pass("a").unwrap().core().output_texture();
        let trace = fx.trace.borrow();
        assert_eq!(trace.len(), 4);
        assert_eq!(trace[1].1, vec![a_out]);
        assert_eq!(trace[3].1, vec![a_out]);
    }

    #[test]
    fn test_resize_and_release() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        graph.add_pass(fx.pass("a", 0));
        graph.add_pass(fx.pass("b", 1));
        assert_eq!(fx.gpu.live_framebuffers(), 2);

        graph.resize(&mut fx.gpu, 64, 48).unwrap();
        let fb = graph.pass("b").unwrap().core().framebuffer();
        assert_eq!((fb.width(), fb.height()), (64, 48));
        assert_eq!(fx.gpu.live_framebuffers(), 2);

        graph.release(&mut fx.gpu);
        assert!(graph.is_empty());
        assert_eq!(fx.gpu.live_framebuffers(), 0);
    }

    #[test]
    fn test_description_round_trip() {
        let mut fx = Fixture::new();
        let registry = PassRegistry::with_builtins();
        let mut graph = RenderGraph::new();
        let scene = GeometryPass::new(&mut fx.gpu, "scene", fx.shaders.get("sprite").unwrap(), 8, 8)
            .unwrap()
            .with_layer_mask(0b101);
        let gray =
            PostProcessingPass::new(&mut fx.gpu, "gray", fx.shaders.get("grayscale").unwrap(), 1, 8, 8)
                .unwrap()
                .with_params([1.0, 0.0, 0.0, 0.0]);
        graph.add_pass(Box::new(scene));
        graph.add_pass(Box::new(gray));
        graph.connect("scene", "gray", 0).unwrap();
        graph.set_final_pass("gray").unwrap();

        let desc = graph.describe();
        let text = desc.to_ron_string().unwrap();
        let parsed = RenderGraphDescription::from_ron_str(&text).unwrap();
        assert_eq!(parsed, desc);

        let mut rebuilt =
            RenderGraph::from_description(&mut fx.gpu, &parsed, &registry, &fx.shaders, 8, 8)
                .unwrap();
        assert_eq!(rebuilt.describe(), desc);
        assert_eq!(rebuilt.execution_order().unwrap(), &["scene", "gray"]);
        assert_eq!(
            rebuilt
                .pass_as::<GeometryPass>("scene")
                .unwrap()
                .core()
                .layer_mask(),
            0b101
        );
    }

    #[test]
    fn test_failed_description_releases_passes() {
        let mut fx = Fixture::new();
        let before = fx.gpu.live_framebuffers();
        let desc = RenderGraphDescription::from_ron_str(
            r#"(
                passes: [(name: "scene", kind: "geometry", shader: "sprite")],
                connections: [(producer: "scene", consumer: "nowhere", slot: 0)],
            )"#,
        )
        .unwrap();
        let result = RenderGraph::from_description(
            &mut fx.gpu,
            &desc,
            &PassRegistry::with_builtins(),
            &fx.shaders,
            8,
            8,
        );
        assert!(matches!(result, Err(RenderError::UnknownPass(_))));
        assert_eq!(fx.gpu.live_framebuffers(), before);
    }

    #[test]
    fn test_final_framebuffer_receives_last_draw() {
        let mut fx = Fixture::new();
        let mut graph = RenderGraph::new();
        let scene = GeometryPass::new(&mut fx.gpu, "scene", fx.shaders.get("sprite").unwrap(), 8, 8)
            .unwrap();
        let post =
            PostProcessingPass::new(&mut fx.gpu, "post", fx.shaders.get("blit").unwrap(), 1, 8, 8)
                .unwrap();
        graph.add_pass(Box::new(post));
        graph.add_pass(Box::new(scene));
        graph.connect("scene", "post", 0).unwrap();
        graph.set_final_pass("post").unwrap();
        fx.gpu.take_commands();

        fx.run(&mut graph).unwrap();

        let final_id = graph.final_framebuffer().unwrap().id();
        let scene_out = graph.pass("scene").unwrap().core().output_texture();
        assert_eq!(fx.gpu.draw_targets(), vec![final_id]);
        assert!(fx.gpu.commands().contains(&GpuCommand::BindTexture {
            unit: 0,
            texture: scene_out
        }));
    }
}
