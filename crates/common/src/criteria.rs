//! Tunable thresholds and discovered dataset statistics
//!
//! One block of knobs shared by every pipeline stage plus the statistics the
//! training pass discovers over the template set. Statistics are mutated
//! during training only and are frozen before any detection runs.

use crate::geometry::Size;
use serde::{Deserialize, Serialize};

/// Offset range searched around each feature point, `[start, end]` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbourhood {
    pub start: i32,
    pub end: i32,
}

impl Default for Neighbourhood {
    fn default() -> Self {
        // 5x5 patch -> [-2, -1, 0, 1, 2]
        Self { start: -2, end: 2 }
    }
}

/// Step function mapping sensor depth to a relative measurement tolerance.
///
/// Entries are `(upper_depth_bound, deviation_ratio)` sorted by bound; the
/// first entry whose bound exceeds the queried depth wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthDeviation(pub Vec<(u16, f32)>);

impl Default for DepthDeviation {
    fn default() -> Self {
        Self(vec![
            (5_000, 0.02),
            (10_000, 0.035),
            (15_000, 0.05),
            (20_000, 0.075),
            (u16::MAX, 0.10),
        ])
    }
}

impl DepthDeviation {
    /// Tolerance ratio for the given depth
    #[must_use]
    pub fn ratio(&self, depth: u16) -> f32 {
        for &(bound, dev) in &self.0 {
            if depth < bound {
                return dev;
            }
        }
        self.0.last().map_or(0.0, |&(_, dev)| dev)
    }
}

/// Statistics discovered over the training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Minimum object depth seen, widened by 10 %
    pub min_depth: u16,
    /// Maximum object depth seen, widened by 10 %
    pub max_depth: u16,
    /// Diameter of the smallest trained object, in object units (mm)
    pub smallest_diameter: f32,
    /// Edgel count of the template containing the fewest of them
    pub min_edgels: u32,
    /// Sensor depth units per millimetre
    pub depth_scale_factor: f32,
    pub smallest_template: Size,
    pub largest_template: Size,
}

impl Default for DatasetInfo {
    fn default() -> Self {
        Self {
            min_depth: u16::MAX,
            max_depth: 0,
            smallest_diameter: f32::MAX,
            min_edgels: u32::MAX,
            depth_scale_factor: 10.0,
            smallest_template: Size::new(u32::MAX, u32::MAX),
            largest_template: Size::new(0, 0),
        }
    }
}

/// All tunables of the cascade plus the discovered [`DatasetInfo`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    // Hashing
    /// Reference grid the triplets are sampled in
    pub triplet_grid: Size,
    /// Number of hash tables (and the candidate-list cap per window)
    pub tables_count: usize,
    /// Number of depth bins per table
    pub depth_bin_count: usize,
    /// Candidate triplets generated per kept table
    pub training_multiplier: usize,
    /// Max chebyshev distance of p1/p2 from the triplet centre, in grid cells
    pub max_triplet_distance: i32,
    /// Votes a template needs to stay on a window's candidate list
    pub min_votes: usize,

    // Matching
    /// Feature points per template and per point set (N)
    pub points_count: usize,
    /// Minimum gradient magnitude on [0, 1] gray to count as an edge
    pub min_magnitude: f32,
    /// Neighbours whose depth differs more than this do not contribute to
    /// surface normals, in sensor units
    pub max_depth_diff: i32,
    pub depth_deviation: DepthDeviation,
    /// Constant of the depth-median test (test IV)
    pub depth_k: f32,
    /// Fraction of N a test must reach for the cascade to continue
    pub match_factor: f32,
    /// Max hue distance (0..180 scale) to pass the color test
    pub color_tolerance: u8,
    pub neighbourhood: Neighbourhood,
    /// Max allowed overlap between two surviving matches
    pub overlap_factor: f32,

    // Objectness
    /// Sliding-window step in pixels
    pub window_step: u32,
    /// Feature spreading reaches `patch_offset` pixels in every direction
    pub patch_offset: u32,
    /// Fraction of `min_edgels` a window must contain to be admitted
    pub objectness_factor: f32,
    /// Scales the smallest diameter into the depth-edge magnitude threshold
    pub objectness_diameter_threshold: f32,

    // Scene pyramid
    pub pyramid_levels_down: usize,
    pub pyramid_levels_up: usize,
    pub pyramid_scale_factor: f32,

    /// Seed for every random draw of training and refinement
    pub seed: u64,

    pub info: DatasetInfo,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            triplet_grid: Size::new(12, 12),
            tables_count: 100,
            depth_bin_count: 5,
            training_multiplier: 50,
            max_triplet_distance: 3,
            min_votes: 3,

            points_count: 100,
            min_magnitude: 0.1,
            max_depth_diff: 100,
            depth_deviation: DepthDeviation::default(),
            depth_k: 1.0,
            match_factor: 0.6,
            color_tolerance: 5,
            neighbourhood: Neighbourhood::default(),
            overlap_factor: 0.1,

            window_step: 5,
            patch_offset: 2,
            objectness_factor: 0.3,
            objectness_diameter_threshold: 0.1,

            pyramid_levels_down: 2,
            pyramid_levels_up: 2,
            pyramid_scale_factor: 1.2,

            seed: 1,

            info: DatasetInfo::default(),
        }
    }
}

impl Criteria {
    /// Minimum per-test score `⌈N · match_factor⌉` of the cascade
    #[must_use]
    pub fn min_test_score(&self) -> u32 {
        (self.points_count as f32 * self.match_factor).ceil() as u32
    }

    /// Depth-edge magnitude threshold derived from the discovered statistics
    #[must_use]
    pub fn edgel_magnitude_threshold(&self) -> i32 {
        (self.objectness_diameter_threshold
            * self.info.smallest_diameter
            * self.info.depth_scale_factor) as i32
    }

    /// Scale of pyramid level `i`, level `pyramid_levels_down` being 1.0
    #[must_use]
    pub fn level_scale(&self, level: usize) -> f32 {
        let exp = level as i32 - self.pyramid_levels_down as i32;
        self.pyramid_scale_factor.powi(exp)
    }

    /// Total number of pyramid levels
    #[must_use]
    pub fn pyramid_levels(&self) -> usize {
        self.pyramid_levels_down + 1 + self.pyramid_levels_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Criteria::default();
        assert_eq!(c.triplet_grid, Size::new(12, 12));
        assert_eq!(c.tables_count, 100);
        assert_eq!(c.depth_bin_count, 5);
        assert_eq!(c.min_votes, 3);
        assert_eq!(c.points_count, 100);
        assert_eq!(c.match_factor, 0.6);
        assert_eq!(c.overlap_factor, 0.1);
        assert_eq!(c.color_tolerance, 5);
        assert_eq!(c.neighbourhood, Neighbourhood { start: -2, end: 2 });
        assert_eq!(c.window_step, 5);
    }

    #[test]
    fn min_test_score_rounds_up() {
        let mut c = Criteria::default();
        assert_eq!(c.min_test_score(), 60);
        c.points_count = 101;
        assert_eq!(c.min_test_score(), 61);
    }

    #[test]
    fn deviation_is_a_step_function() {
        let dev = DepthDeviation::default();
        assert_eq!(dev.ratio(1_000), 0.02);
        assert_eq!(dev.ratio(5_000), 0.035);
        assert_eq!(dev.ratio(19_999), 0.075);
        assert_eq!(dev.ratio(u16::MAX - 1), 0.10);
    }

    #[test]
    fn level_scales_form_a_pyramid() {
        let c = Criteria::default();
        assert_eq!(c.pyramid_levels(), 5);
        assert!((c.level_scale(2) - 1.0).abs() < 1e-6);
        assert!(c.level_scale(0) < 1.0);
        assert!(c.level_scale(4) > 1.0);
    }
}
