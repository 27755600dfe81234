//! Quantizers, feature maps and the scene pyramid
//!
//! This crate turns raw RGB-D imagery into the quantized feature maps the
//! detection cascade consumes:
//!
//! - quantized surface normals (eight octant bit codes) from 16-bit depth
//! - quantized gradient orientations (five 36° bins) from gray images
//! - depth-edgel masks for the objectness pre-filter
//! - hue remapping that keeps black/white regions separable under a
//!   hue-only comparison
//! - feature spreading (bitwise-OR over a local patch) so per-point tests
//!   reduce to a single bit-AND
//! - the scale pyramid bundling all of the above per level
//!
//! Quantized maps use one byte per pixel with at most one bit set; zero
//! always means "undefined here".

mod maps;
mod pyramid;
mod quantize;

pub use maps::{
    depth_edgels, gray_f32, orientation_gradients, quantized_gradients, quantized_normals,
    remap_hue, rgb_to_hue, smooth_depth, sobel_magnitude, spread,
};
pub use pyramid::{SceneLevel, ScenePyramid, SceneSources};
pub use quantize::{octant_index, quantize_gradient, quantize_normal_slopes, GRADIENT_BIN_COUNT};
