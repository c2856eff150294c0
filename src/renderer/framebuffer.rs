//! Offscreen render targets

use std::path::Path;

use super::{FramebufferId, FramebufferTargets, GpuDevice, GpuError, RenderError, TextureHandle};

/// A colour texture plus depth buffer of a fixed size.
///
/// Construction fails if the attachments are incomplete. Resizing recreates
/// both attachments, so texture handles change.
#[derive(Debug)]
pub struct Framebuffer {
    targets: FramebufferTargets,
}

impl Framebuffer {
    /// # Errors
    ///
    /// Returns [`GpuError::IncompleteFramebuffer`] if the device rejects the
    /// attachment configuration
    pub fn new(gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        let targets = gpu.create_framebuffer(width, height)?;
        log::debug!(
            "Created framebuffer {} ({width}x{height})",
            targets.id.raw()
        );
        Ok(Self { targets })
    }

    #[must_use]
    #[inline]
    pub fn id(&self) -> FramebufferId {
        self.targets.id
    }

    #[must_use]
    #[inline]
    pub fn color_texture(&self) -> TextureHandle {
        self.targets.color
    }

    #[must_use]
    #[inline]
    pub fn depth_texture(&self) -> TextureHandle {
        self.targets.depth
    }

    #[must_use]
    #[inline]
    pub fn width(&self) -> u32 {
        self.targets.width
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> u32 {
        self.targets.height
    }

    /// Target this framebuffer with a viewport covering all of it
    ///
    /// # Errors
    ///
    /// Returns an error if the framebuffer was destroyed
    pub fn bind(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        gpu.bind_framebuffer(self.targets.id)?;
        gpu.set_viewport(0, 0, self.targets.width, self.targets.height);
        Ok(())
    }

    /// Restore the default target
    pub fn unbind(&self, gpu: &mut dyn GpuDevice) {
        gpu.unbind_framebuffer();
    }

    /// Run `draw` with this framebuffer bound. The default target is restored
    /// afterwards whatever `draw` returns.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails
    pub fn scope<R>(
        &self,
        gpu: &mut dyn GpuDevice,
        draw: impl FnOnce(&mut dyn GpuDevice) -> R,
    ) -> Result<R, GpuError> {
        self.bind(gpu)?;
        let result = draw(gpu);
        self.unbind(gpu);
        Ok(result)
    }

    /// Recreate both attachments at a new size. On failure the old
    /// attachments stay valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the new attachments are incomplete
    pub fn resize(&mut self, gpu: &mut dyn GpuDevice, width: u32, height: u32) -> Result<(), GpuError> {
        if width == self.targets.width && height == self.targets.height {
            return Ok(());
        }
        let targets = gpu.create_framebuffer(width, height)?;
        gpu.destroy_framebuffer(self.targets.id);
        self.targets = targets;
        Ok(())
    }

    /// Free the GPU attachments
    pub fn release(&self, gpu: &mut dyn GpuDevice) {
        gpu.destroy_framebuffer(self.targets.id);
    }

    /// Colour attachment as RGBA8 rows, top row first
    ///
    /// # Errors
    ///
    /// Returns an error if readback fails
    pub fn read_pixels(&self, gpu: &mut dyn GpuDevice) -> Result<Vec<u8>, GpuError> {
        gpu.read_pixels(self.targets.id)
    }

    /// Write the colour attachment to a PNG file
    ///
    /// # Errors
    ///
    /// Returns an error if readback or encoding fails
    pub fn export_png(&self, gpu: &mut dyn GpuDevice, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let pixels = self.read_pixels(gpu)?;
        let image = image::RgbaImage::from_raw(self.targets.width, self.targets.height, pixels)
            .ok_or_else(|| {
                RenderError::Gpu(GpuError::Backend(
                    "readback size does not match framebuffer".to_string(),
                ))
            })?;
        image.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
        log::info!("Exported framebuffer to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{GpuCommand, HeadlessDevice};

    #[test]
    fn test_incomplete_framebuffer_fails_construction() {
        let mut gpu = HeadlessDevice::new();
        assert!(matches!(
            Framebuffer::new(&mut gpu, 0, 0),
            Err(GpuError::IncompleteFramebuffer { .. })
        ));
    }

    #[test]
    fn test_scope_restores_default_target() {
        let mut gpu = HeadlessDevice::new();
        let fb = Framebuffer::new(&mut gpu, 32, 16).unwrap();
        gpu.take_commands();

        fb.scope(&mut gpu, |gpu| gpu.clear([0.0; 4])).unwrap();
        assert_eq!(gpu.bound_framebuffer(), None);
        assert_eq!(
            gpu.commands(),
            &[
                GpuCommand::BindFramebuffer(fb.id()),
                GpuCommand::Viewport {
                    x: 0,
                    y: 0,
                    width: 32,
                    height: 16
                },
                GpuCommand::Clear([0.0; 4]),
                GpuCommand::UnbindFramebuffer,
            ]
        );
    }

    #[test]
    fn test_resize_recreates_attachments() {
        let mut gpu = HeadlessDevice::new();
        let mut fb = Framebuffer::new(&mut gpu, 8, 8).unwrap();
        let old_color = fb.color_texture();

        fb.resize(&mut gpu, 16, 4).unwrap();
        assert_ne!(fb.color_texture(), old_color);
        assert_eq!((fb.width(), fb.height()), (16, 4));
        assert_eq!(gpu.live_framebuffers(), 1);

        assert!(fb.resize(&mut gpu, 0, 4).is_err());
        assert_eq!(fb.width(), 16);
        assert_eq!(gpu.live_framebuffers(), 1);
    }

    #[test]
    fn test_export_png() {
        let mut gpu = HeadlessDevice::new();
        let fb = Framebuffer::new(&mut gpu, 4, 2).unwrap();
        fb.scope(&mut gpu, |gpu| gpu.clear([0.0, 1.0, 0.0, 1.0])).unwrap();

        let path = std::env::temp_dir().join("framegraph_export_test.png");
        fb.export_png(&mut gpu, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(image.get_pixel(3, 1).0, [0, 255, 0, 255]);
        let _ = std::fs::remove_file(path);
    }
}
