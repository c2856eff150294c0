//! Camera supplying view and projection matrices to render passes

use crate::math::{Matrix4, Vector3};

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees
    Perspective { fov_y: f32 },
    /// Visible height in world units; width follows the aspect ratio
    Orthographic { height: f32 },
}

/// Camera for rendering
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vector3,
    /// Direction the camera is looking at
    pub direction: Vector3,
    /// Up vector
    pub up: Vector3,
    pub projection: Projection,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
}

impl Camera {
    /// Perspective camera at (0, 0, 5) looking down -Z
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 5.0),
            direction: -Vector3::Z,
            up: Vector3::Y,
            projection: Projection::Perspective { fov_y: 45.0 },
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
        }
    }

    /// Orthographic camera for 2D scenes, showing `height` world units
    /// vertically around the origin
    #[must_use]
    pub fn orthographic(height: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height },
            near: -100.0,
            far: 100.0,
            position: Vector3::ZERO,
            ..Self::new()
        }
    }

    /// Create a camera at a specific position looking at a target
    #[must_use]
    pub fn look_at(position: Vector3, target: Vector3, up: Vector3) -> Self {
        Self {
            position,
            direction: (target - position).normal(),
            up,
            ..Self::new()
        }
    }

    /// Get the view matrix
    #[must_use]
    pub fn view_matrix(&self) -> Matrix4 {
        Matrix4::look_at(self.position, self.position + self.direction, self.up)
    }

    /// Get the projection matrix
    #[must_use]
    pub fn projection_matrix(&self) -> Matrix4 {
        match self.projection {
            Projection::Perspective { fov_y } => {
                Matrix4::perspective(fov_y, self.aspect, self.near, self.far)
            }
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * self.aspect;
                Matrix4::orthographic(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    /// Get combined view-projection matrix
    #[must_use]
    pub fn view_projection_matrix(&self) -> Matrix4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update aspect ratio
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
