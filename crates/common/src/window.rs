//! Sliding windows that passed objectness detection

use crate::geometry::{BoundingBox, Point};
use serde::{Deserialize, Serialize};

/// Window location at one pyramid level plus its candidate templates.
///
/// The candidate list is empty when the window leaves the objectness stage
/// and is filled (or the window dropped) by hashing verification. Candidates
/// are template ids ordered by descending votes, at most `tables_count` of
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Edgel count found by the objectness pre-filter
    pub edgels: u32,
    pub candidates: Vec<u32>,
}

impl Window {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32, edgels: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            edgels,
            candidates: Vec::new(),
        }
    }

    #[must_use]
    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }

    #[must_use]
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}
