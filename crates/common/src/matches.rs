//! Verified template matches

use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

/// A template that survived the five-test cascade at one window.
///
/// Holds the template id (non-owning, resolved against the store) and the
/// per-test counts for reproducibility; `score` averages tests II-V, test I
/// being an admission gate only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub template_id: u32,
    pub obj_id: u32,
    /// Object bounding box in scene coordinates at `scale`
    pub obj_bb: BoundingBox,
    /// Pyramid scale the match was found at
    pub scale: f32,
    /// Aggregate score in [0, 1]
    pub score: f32,
    /// Per-test passed-point counts, tests I..V
    pub sub_scores: [u32; 5],
}

impl Match {
    /// Bounding box rescaled from the match's pyramid level into another
    /// level's coordinates
    #[must_use]
    pub fn bb_at_scale(&self, scale: f32) -> BoundingBox {
        self.obj_bb.scaled(scale / self.scale)
    }
}
