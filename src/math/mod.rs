//! Vector and matrix math
//!
//! Column-major 4x4 matrices and 3-component vectors used by the scene graph
//! and the render passes.

mod matrix;
mod vector;

pub use matrix::Matrix4;
pub use vector::Vector3;
