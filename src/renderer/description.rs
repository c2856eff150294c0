//! Declarative render graph descriptions and the pass factory registry

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{
    GeometryPass, GpuDevice, PassCore, PostProcessingPass, RenderError, RenderPass, ShaderLibrary,
};
use crate::core::ALL_LAYERS;

/// A directed edge: `producer`'s output feeds input `slot` of `consumer`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub producer: String,
    pub consumer: String,
    pub slot: usize,
}

impl Connection {
    pub fn new(producer: impl Into<String>, consumer: impl Into<String>, slot: usize) -> Self {
        Self {
            producer: producer.into(),
            consumer: consumer.into(),
            slot,
        }
    }
}

fn all_layers() -> u32 {
    ALL_LAYERS
}

/// Configuration of one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassDescription {
    pub name: String,
    /// Registry kind, e.g. `geometry` or `postprocess`
    pub kind: String,
    /// Shader library name
    pub shader: String,
    #[serde(default)]
    pub inputs: usize,
    #[serde(default = "all_layers")]
    pub layer_mask: u32,
    #[serde(default)]
    pub clear_color: Option<[f32; 4]>,
    /// Up to four shader parameters
    #[serde(default)]
    pub params: Vec<f32>,
    #[serde(default)]
    pub debug: bool,
}

impl PassDescription {
    /// Description of the state every pass shares
    #[must_use]
    pub fn from_core(kind: &str, core: &PassCore) -> Self {
        Self {
            name: core.name().to_string(),
            kind: kind.to_string(),
            shader: core.shader().name().to_string(),
            inputs: core.input_count(),
            layer_mask: core.layer_mask(),
            clear_color: Some(core.clear_color()),
            params: Vec::new(),
            debug: false,
        }
    }

    /// `params` padded or truncated to four values
    #[must_use]
    pub fn params4(&self) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (dst, src) in out.iter_mut().zip(&self.params) {
            *dst = *src;
        }
        out
    }
}

/// A whole render graph: passes, edges and the final pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderGraphDescription {
    pub passes: Vec<PassDescription>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub final_pass: Option<String>,
}

impl RenderGraphDescription {
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_ron_string(&self) -> Result<String, RenderError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| RenderError::Description(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns an error if the text is not a valid description
    pub fn from_ron_str(content: &str) -> Result<Self, RenderError> {
        ron::from_str(content).map_err(|e| RenderError::Description(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if file reading or parsing fails
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }
}

/// Resources available to pass factories
pub struct PassBuildContext<'a> {
    pub gpu: &'a mut dyn GpuDevice,
    pub shaders: &'a ShaderLibrary,
    pub width: u32,
    pub height: u32,
}

type PassFactory = Box<
    dyn Fn(&mut PassBuildContext<'_>, &PassDescription) -> Result<Box<dyn RenderPass>, RenderError>,
>;

/// Maps pass kinds to constructors
#[derive(Default)]
pub struct PassRegistry {
    factories: FxHashMap<String, PassFactory>,
}

impl PassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `geometry` and `postprocess`
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(GeometryPass::KIND, |ctx, desc| {
            let shader = ctx
                .shaders
                .get(&desc.shader)
                .ok_or_else(|| RenderError::UnknownShader(desc.shader.clone()))?;
            let mut pass = GeometryPass::new(ctx.gpu, &desc.name, shader, ctx.width, ctx.height)?;
            pass.set_debug(desc.debug);
            let pass: Box<dyn RenderPass> = Box::new(pass);
            Ok(pass)
        });
        registry.register(PostProcessingPass::KIND, |ctx, desc| {
            let shader = ctx
                .shaders
                .get(&desc.shader)
                .ok_or_else(|| RenderError::UnknownShader(desc.shader.clone()))?;
            let pass = PostProcessingPass::new(
                ctx.gpu,
                &desc.name,
                shader,
                desc.inputs,
                ctx.width,
                ctx.height,
            )?
            .with_params(desc.params4());
            let pass: Box<dyn RenderPass> = Box::new(pass);
            Ok(pass)
        });
        registry
    }

    /// Register a factory. Re-registering a kind replaces it.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&mut PassBuildContext<'_>, &PassDescription) -> Result<Box<dyn RenderPass>, RenderError>
        + 'static,
    ) {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Build a pass and apply the shared settings from `desc`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown kind or if the factory fails
    pub fn build(
        &self,
        ctx: &mut PassBuildContext<'_>,
        desc: &PassDescription,
    ) -> Result<Box<dyn RenderPass>, RenderError> {
        let factory = self
            .factories
            .get(&desc.kind)
            .ok_or_else(|| RenderError::UnknownPassKind(desc.kind.clone()))?;
        let mut pass = factory(ctx, desc)?;

        let core = pass.core_mut();
        core.set_layer_mask(desc.layer_mask);
        if let Some(color) = desc.clear_color {
            core.set_clear_color(color);
        }
        Ok(pass)
    }

    /// Registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::HeadlessDevice;

    const GRAPH: &str = r#"(
        passes: [
            (name: "scene", kind: "geometry", shader: "sprite", layer_mask: 3, clear_color: Some((0.1, 0.2, 0.3, 1.0))),
            (name: "vignette", kind: "postprocess", shader: "vignette", inputs: 1, params: [0.8, 0.25]),
        ],
        connections: [(producer: "scene", consumer: "vignette", slot: 0)],
        final_pass: Some("vignette"),
    )"#;

    #[test]
    fn test_parse_description_defaults() {
        let desc = RenderGraphDescription::from_ron_str(GRAPH).unwrap();
        assert_eq!(desc.passes.len(), 2);
        assert_eq!(desc.passes[0].inputs, 0);
        assert_eq!(desc.passes[1].layer_mask, ALL_LAYERS);
        assert_eq!(desc.passes[1].params4(), [0.8, 0.25, 0.0, 0.0]);
        assert_eq!(desc.final_pass.as_deref(), Some("vignette"));
    }

    #[test]
    fn test_registry_builds_passes() {
        let mut gpu = HeadlessDevice::new();
        let shaders = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        let registry = PassRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["geometry", "postprocess"]);

        let desc = RenderGraphDescription::from_ron_str(GRAPH).unwrap();
        let mut ctx = PassBuildContext {
            gpu: &mut gpu,
            shaders: &shaders,
            width: 32,
            height: 32,
        };
        let scene = registry.build(&mut ctx, &desc.passes[0]).unwrap();
        assert_eq!(scene.kind(), "geometry");
        assert_eq!(scene.core().layer_mask(), 3);
        assert_eq!(scene.core().clear_color(), [0.1, 0.2, 0.3, 1.0]);

        let mut bad = desc.passes[1].clone();
        bad.kind = "bloom".into();
        assert!(matches!(
            registry.build(&mut ctx, &bad),
            Err(RenderError::UnknownPassKind(_))
        ));
        bad.kind = "postprocess".into();
        bad.shader = "missing".into();
        assert!(matches!(
            registry.build(&mut ctx, &bad),
            Err(RenderError::UnknownShader(_))
        ));
    }
}
