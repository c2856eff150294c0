//! Built-in components

use std::any::Any;

use super::{Component, ComponentContext, Property, PropertyError, PropertyValue};
use crate::math::{Matrix4, Vector3};
use crate::renderer::RenderFrame;

/// Draws a coloured unit quad at the owning entity's world transform.
///
/// Skips itself when the entity's layer is not in the active pass's mask.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteRenderer {
    /// RGBA colour; alpha below 1 blends over earlier sprites
    pub color: [f32; 4],
    /// Quad size in local units
    pub size: [f32; 2],
}

impl SpriteRenderer {
    pub const TYPE_NAME: &'static str = "SpriteRenderer";

    #[must_use]
    pub fn new(color: [f32; 4]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.size = [width, height];
        self
    }

    fn model(&self, frame: &RenderFrame<'_>) -> Matrix4 {
        frame.model() * Matrix4::scale(Vector3::new(self.size[0], self.size[1], 1.0))
    }
}

impl Default for SpriteRenderer {
    fn default() -> Self {
        Self {
            color: [1.0; 4],
            size: [1.0, 1.0],
        }
    }
}

impl Component for SpriteRenderer {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn render(&self, frame: &mut RenderFrame<'_>) {
        if !frame.is_visible() {
            return;
        }
        let model = self.model(frame);
        frame.draw_quad(&model, self.color);
    }

    fn debug_render(&self, frame: &mut RenderFrame<'_>) {
        if !frame.is_visible() {
            return;
        }
        let model = self.model(frame);
        frame.draw_quad(&model, [1.0, 0.0, 1.0, 0.25]);
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::new("color", PropertyValue::Vec4(self.color)),
            Property::new("size", PropertyValue::Vec2(self.size)),
        ]
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        match (name, value) {
            ("color", PropertyValue::Vec4(color)) => self.color = *color,
            ("size", PropertyValue::Vec2(size)) => self.size = *size,
            ("color", _) => {
                return Err(PropertyError::TypeMismatch {
                    property: name.to_string(),
                    expected: "vec4",
                });
            }
            ("size", _) => {
                return Err(PropertyError::TypeMismatch {
                    property: name.to_string(),
                    expected: "vec2",
                });
            }
            _ => {
                return Err(PropertyError::Unknown {
                    component: Self::TYPE_NAME,
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Spins the owning entity around its Z axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Spinner {
    pub degrees_per_second: f32,
}

impl Spinner {
    pub const TYPE_NAME: &'static str = "Spinner";

    #[must_use]
    pub fn new(degrees_per_second: f32) -> Self {
        Self { degrees_per_second }
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new(90.0)
    }
}

impl Component for Spinner {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn update(&mut self, ctx: &mut ComponentContext<'_>, dt: f32) {
        let entity = ctx.entity();
        let Some(mut rotation) = ctx.transform().map(|t| t.rotation()) else {
            return;
        };
        rotation.z = (rotation.z + self.degrees_per_second * dt) % 360.0;
        // The owner always exists while its components run
        let _ = ctx.scene_mut().set_local_rotation(entity, rotation);
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::new(
            "degrees_per_second",
            PropertyValue::Float(self.degrees_per_second),
        )]
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        if name != "degrees_per_second" {
            return Err(PropertyError::Unknown {
                component: Self::TYPE_NAME,
                property: name.to_string(),
            });
        }
        self.degrees_per_second = value.as_f32().ok_or_else(|| PropertyError::TypeMismatch {
            property: name.to_string(),
            expected: "float",
        })?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_properties_apply() {
        let mut sprite = SpriteRenderer::default();
        sprite
            .set_property("color", &PropertyValue::Vec4([0.5, 0.25, 1.0, 0.5]))
            .unwrap();
        assert_eq!(sprite.color, [0.5, 0.25, 1.0, 0.5]);

        let err = sprite
            .set_property("size", &PropertyValue::Float(2.0))
            .unwrap_err();
        assert!(matches!(err, PropertyError::TypeMismatch { .. }));

        let err = sprite
            .set_property("texture", &PropertyValue::String("a.png".into()))
            .unwrap_err();
        assert!(matches!(err, PropertyError::Unknown { .. }));
    }

    #[test]
    fn test_spinner_accepts_int_rate() {
        let mut spinner = Spinner::default();
        spinner
            .set_property("degrees_per_second", &PropertyValue::Int(45))
            .unwrap();
        assert_eq!(spinner.degrees_per_second, 45.0);
        assert_eq!(spinner.properties()[0].value, PropertyValue::Float(45.0));
    }
}
