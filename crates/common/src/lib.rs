//! Common types for the RGB-D template detection pipeline
//!
//! Shared data model used across the detection crates: pixel geometry,
//! camera parameters, the tunable/discovered criteria block, templates and
//! their extracted features, detection windows and matches.
//!
//! Templates are owned by an id-keyed [`TemplateStore`]; hash tables,
//! windows and matches refer to templates by id only and never outlive the
//! store they were built against.

mod camera;
mod criteria;
mod error;
mod geometry;
mod matches;
mod template;
mod window;

pub use camera::Camera;
pub use criteria::{Criteria, DatasetInfo, DepthDeviation, Neighbourhood};
pub use error::{DetectError, Result};
pub use geometry::{BoundingBox, Point, Size};
pub use matches::Match;
pub use template::{Template, TemplateFeatures, TemplateSources, TemplateStore};
pub use window::Window;

use image::{ImageBuffer, Luma};

/// 16-bit depth image in sensor units (0 = missing measurement).
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Single-channel float image, values normalized to [0, 1] for gray sources.
pub type GrayImageF32 = ImageBuffer<Luma<f32>, Vec<f32>>;
