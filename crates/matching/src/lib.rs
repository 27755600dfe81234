//! Objectness pre-filter, five-test cascade matcher and non-maximum
//! suppression
//!
//! The stages that turn per-level feature maps into verified matches:
//!
//! 1. a sliding-window edgel count admits regions that could contain any
//!    trained object,
//! 2. the cascade checks each window candidate against its template with
//!    five per-point tests (object size, normals, gradients, depth
//!    consistency, hue), aborting as soon as one test drops below the
//!    admission threshold,
//! 3. non-maximum suppression prunes overlapping matches across scales.
//!
//! Feature-point training (edge/stable point selection and feature
//! extraction) lives here too, next to the tests that consume it.

mod matcher;
mod nms;
mod objectness;

pub use matcher::{
    evaluate_candidate, extract_features, generate_feature_points, match_windows, CascadeOutcome,
};
pub use nms::nms;
pub use objectness::find_windows;
