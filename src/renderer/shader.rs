//! Shader handles and the shader cache

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::{GpuDevice, GpuError, ShaderId, ShaderSource, UniformValue};
use crate::math::{Matrix4, Vector3};

/// Built-in WGSL sources
pub mod builtin {
    /// Declarations and vertex stage shared by post-processing shaders
    pub const FULLSCREEN_PRELUDE: &str = include_str!("shaders/fullscreen.wgsl");

    pub const SPRITE: &str = include_str!("shaders/sprite.wgsl");
    pub const BLIT: &str = concat!(
        include_str!("shaders/fullscreen.wgsl"),
        include_str!("shaders/blit.wgsl")
    );
    pub const VIGNETTE: &str = concat!(
        include_str!("shaders/fullscreen.wgsl"),
        include_str!("shaders/vignette.wgsl")
    );
    pub const GRAYSCALE: &str = concat!(
        include_str!("shaders/fullscreen.wgsl"),
        include_str!("shaders/grayscale.wgsl")
    );
    pub const COMPOSITE: &str = concat!(
        include_str!("shaders/fullscreen.wgsl"),
        include_str!("shaders/composite.wgsl")
    );

    /// `(name, source)` of every built-in
    pub const ALL: [(&str, &str); 5] = [
        ("sprite", SPRITE),
        ("blit", BLIT),
        ("vignette", VIGNETTE),
        ("grayscale", GRAYSCALE),
        ("composite", COMPOSITE),
    ];
}

/// Source for a post-processing shader from its fragment stage alone
#[must_use]
pub fn postprocess_source(label: impl Into<String>, fragment: &str) -> ShaderSource {
    ShaderSource::new(label, format!("{}{fragment}", builtin::FULLSCREEN_PRELUDE))
}

/// A compiled shader program.
///
/// Cloning is cheap; passes share shaders through the [`ShaderLibrary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    id: ShaderId,
    name: Rc<str>,
}

impl Shader {
    /// # Errors
    ///
    /// Returns [`GpuError::ShaderCompile`] if the device rejects the source
    pub fn compile(gpu: &mut dyn GpuDevice, source: &ShaderSource) -> Result<Self, GpuError> {
        let id = gpu.create_shader(source)?;
        Ok(Self {
            id,
            name: Rc::from(source.label.as_str()),
        })
    }

    #[must_use]
    #[inline]
    pub fn id(&self) -> ShaderId {
        self.id
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make this the active program
    pub fn bind(&self, gpu: &mut dyn GpuDevice) {
        gpu.use_shader(self.id);
    }

    pub fn set_mat4(&self, gpu: &mut dyn GpuDevice, name: &str, value: &Matrix4) {
        gpu.set_uniform(name, UniformValue::Mat4(*value));
    }

    pub fn set_vec2(&self, gpu: &mut dyn GpuDevice, name: &str, value: [f32; 2]) {
        gpu.set_uniform(name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&self, gpu: &mut dyn GpuDevice, name: &str, value: Vector3) {
        gpu.set_uniform(name, UniformValue::Vec3(value));
    }

    pub fn set_vec4(&self, gpu: &mut dyn GpuDevice, name: &str, value: [f32; 4]) {
        gpu.set_uniform(name, UniformValue::Vec4(value));
    }

    pub fn set_int(&self, gpu: &mut dyn GpuDevice, name: &str, value: i32) {
        gpu.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_float(&self, gpu: &mut dyn GpuDevice, name: &str, value: f32) {
        gpu.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_bool(&self, gpu: &mut dyn GpuDevice, name: &str, value: bool) {
        gpu.set_uniform(name, UniformValue::Bool(value));
    }
}

/// Name → compiled shader cache
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: FxHashMap<String, Shader>,
}

impl ShaderLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with every built-in shader compiled
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in fails to compile
    pub fn with_builtins(gpu: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        let mut library = Self::new();
        for (name, code) in builtin::ALL {
            library.load(gpu, name, code)?;
        }
        Ok(library)
    }

    /// Compile and cache a shader, replacing any shader with the same name
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails; the cache is left unchanged
    pub fn load(
        &mut self,
        gpu: &mut dyn GpuDevice,
        name: &str,
        code: &str,
    ) -> Result<Shader, GpuError> {
        let shader = Shader::compile(gpu, &ShaderSource::new(name, code))?;
        log::debug!("Compiled shader '{name}'");
        self.shaders.insert(name.to_string(), shader.clone());
        Ok(shader)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Shader> {
        self.shaders.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    /// Cached names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.shaders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{GpuCommand, HeadlessDevice};

    #[test]
    fn test_builtins_compile() {
        let mut gpu = HeadlessDevice::new();
        let library = ShaderLibrary::with_builtins(&mut gpu).unwrap();
        assert_eq!(
            library.names(),
            vec!["blit", "composite", "grayscale", "sprite", "vignette"]
        );
        assert_eq!(library.get("vignette").unwrap().name(), "vignette");
    }

    #[test]
    fn test_failed_load_keeps_cache() {
        let mut gpu = HeadlessDevice::new();
        let mut library = ShaderLibrary::new();
        library.load(&mut gpu, "post", builtin::BLIT).unwrap();
        assert!(library.load(&mut gpu, "post", "garbage").is_err());
        assert!(library.contains("post"));
    }

    #[test]
    fn test_typed_setters() {
        let mut gpu = HeadlessDevice::new();
        let shader =
            Shader::compile(&mut gpu, &postprocess_source("invert", "fn fs_main() {}")).unwrap();
        gpu.take_commands();

        shader.bind(&mut gpu);
        shader.set_float(&mut gpu, "u_Time", 1.5);
        shader.set_bool(&mut gpu, "u_Flag", true);

        assert_eq!(
            gpu.commands(),
            &[
                GpuCommand::UseShader(shader.id()),
                GpuCommand::SetUniform {
                    name: "u_Time".into(),
                    value: UniformValue::Float(1.5)
                },
                GpuCommand::SetUniform {
                    name: "u_Flag".into(),
                    value: UniformValue::Bool(true)
                },
            ]
        );
    }
}
