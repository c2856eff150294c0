//! Demo: spinning sprites rendered through a small render graph
//!
//! ```text
//! scene (geometry, Default) -> vignette -> composite <- ui (geometry, UI)
//! ```
//!
//! Pass a RON graph description as the first argument to replace the
//! built-in graph. Settings are read from `framegraph.ron` when present.

use std::path::Path;

use framegraph::prelude::*;
use framegraph::renderer::RenderError;

const CONFIG_PATH: &str = "framegraph.ron";

/// Demo game with a layered sprite scene
struct DemoGame {
    graph_path: Option<String>,
    clear_color: [f32; 4],
}

impl DemoGame {
    fn build_scene(ctx: &mut EngineContext) -> Result<(), EngineError> {
        let ui_layer = ctx.layers.add_layer("UI").unwrap_or(1);
        let root = ctx.scene.root();

        let pivot = ctx.scene.spawn(&mut ctx.ids, "Pivot", root)?;
        ctx.scene.add_component(pivot, Spinner::new(30.0))?;

        let colors = [
            [0.9, 0.3, 0.3, 1.0],
            [0.3, 0.9, 0.4, 1.0],
            [0.3, 0.5, 0.95, 1.0],
            [0.95, 0.85, 0.3, 0.8],
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let angle = i as f32 * std::f32::consts::FRAC_PI_2;
            let sprite = ctx.scene.spawn(&mut ctx.ids, format!("Sprite{i}"), pivot)?;
            ctx.scene
                .set_local_position(sprite, Vector3::new(angle.cos() * 2.5, angle.sin() * 2.5, 0.0))?;
            ctx.scene.add_component(sprite, SpriteRenderer::new(color))?;
            ctx.scene.add_component(sprite, Spinner::new(-90.0 - 20.0 * i as f32))?;
        }

        let banner = ctx.scene.spawn(&mut ctx.ids, "Banner", root)?;
        ctx.scene.set_local_position(banner, Vector3::new(0.0, -4.2, 0.0))?;
        if let Some(object) = ctx.scene.object_mut(banner) {
            object.set_layer(ui_layer);
        }
        ctx.scene.add_component(
            banner,
            SpriteRenderer::new([1.0, 1.0, 1.0, 0.6]).with_size(12.0, 0.8),
        )?;
        Ok(())
    }

    fn build_graph(
        &self,
        ctx: &mut EngineContext,
        gpu: &mut dyn GpuDevice,
    ) -> Result<(), EngineError> {
        if let Some(path) = &self.graph_path {
            let desc = RenderGraphDescription::load_ron(path)?;
            ctx.load_graph(gpu, &desc)?;
            return Ok(());
        }

        let (width, height) = (ctx.width(), ctx.height());
        let shader = |name: &str| {
            ctx.shaders
                .get(name)
                .ok_or_else(|| RenderError::UnknownShader(name.to_string()))
        };
        let default_mask = ctx.layers.mask_of(["Default"]);
        let ui_mask = ctx.layers.mask_of(["UI"]);

        let scene = GeometryPass::new(gpu, "scene", shader("sprite")?, width, height)?
            .with_layer_mask(default_mask)
            .with_clear_color(self.clear_color);
        let ui = GeometryPass::new(gpu, "ui", shader("sprite")?, width, height)?
            .with_layer_mask(ui_mask)
            .with_clear_color([0.0; 4]);
        let vignette = PostProcessingPass::new(gpu, "vignette", shader("vignette")?, 1, width, height)?
            .with_params([0.9, 0.35, 0.0, 0.0]);
        let composite =
            PostProcessingPass::new(gpu, "composite", shader("composite")?, 2, width, height)?
                .with_params([1.0, 0.0, 0.0, 0.0]);

        let graph = &mut ctx.graph;
        graph.add_pass(Box::new(scene));
        graph.add_pass(Box::new(ui));
        graph.add_pass(Box::new(vignette));
        graph.add_pass(Box::new(composite));
        graph.connect("scene", "vignette", 0)?;
        graph.connect("vignette", "composite", 0)?;
        graph.connect("ui", "composite", 1)?;
        graph.set_final_pass("composite")?;

        log::info!("Execution order: {:?}", graph.execution_order()?);
        Ok(())
    }
}

impl Game for DemoGame {
    fn init(&mut self, ctx: &mut EngineContext, gpu: &mut dyn GpuDevice) -> Result<(), EngineError> {
        log::info!("Initializing demo");
        ctx.camera = Camera::orthographic(10.0);
        ctx.camera.set_aspect(ctx.width(), ctx.height());

        Self::build_scene(ctx)?;
        self.build_graph(ctx, gpu)?;

        log::info!(
            "Demo initialized with {} entities and {} passes",
            ctx.scene.entity_count(),
            ctx.graph.len()
        );
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut EngineContext, width: u32, height: u32) {
        log::debug!("Window resized to {}x{}", width, height);
    }

    fn shutdown(&mut self, ctx: &mut EngineContext) {
        log::info!(
            "Shutting down after {} frames ({:.1} fps)",
            ctx.time.frame_count(),
            ctx.time.fps()
        );
    }
}

fn main() -> Result<(), EngineError> {
    let config = if Path::new(CONFIG_PATH).exists() {
        EngineConfig::load(CONFIG_PATH)?
    } else {
        EngineConfig::default()
            .with_title("Framegraph Demo")
            .with_size(1280, 720)
            .with_target_fps(60)
    };

    let game = DemoGame {
        graph_path: std::env::args().nth(1),
        clear_color: config.clear_color,
    };
    Engine::new(config, game).run()
}
