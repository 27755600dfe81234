//! Hash keys, depth-bin ranges and the per-triplet hash table

use crate::triplet::Triplet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Five-byte key: two quantized relative-depth indices (0..=4) and three
/// quantized normal octant indices (0..=7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashKey(pub [u8; 5]);

impl HashKey {
    #[must_use]
    pub fn new(d1: u8, d2: u8, n1: u8, n2: u8, n3: u8) -> Self {
        Self([d1, d2, n1, n2, n3])
    }
}

/// Calibrated depth quantization bins of one table.
///
/// Ranges are `(lo, hi]`, contiguous and non-overlapping; together they
/// cover the full signed 16-bit interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRanges(Vec<(i32, i32)>);

impl BinRanges {
    pub const DEPTH_MIN: i32 = i16::MIN as i32;
    pub const DEPTH_MAX: i32 = i16::MAX as i32;

    /// Calibrate bins from observed relative depths: the value interval
    /// between the smallest and largest observation is split into
    /// `bin_count` equal widths, and the outermost bounds are widened to the
    /// signed 16-bit extremes.
    #[must_use]
    pub fn calibrate(mut rel_depths: Vec<i32>, bin_count: usize) -> Self {
        debug_assert!(bin_count > 1);
        debug_assert!(!rel_depths.is_empty());
        rel_depths.sort_unstable();

        let lo = *rel_depths.first().unwrap_or(&0);
        let hi = *rel_depths.last().unwrap_or(&0);
        let step = (hi - lo) as f32 / bin_count as f32;

        let mut bounds = Vec::with_capacity(bin_count + 1);
        bounds.push(Self::DEPTH_MIN);
        for k in 1..bin_count {
            bounds.push(lo + (step * k as f32).round() as i32);
        }
        bounds.push(Self::DEPTH_MAX);

        let ranges = bounds.windows(2).map(|w| (w[0], w[1])).collect();
        Self(ranges)
    }

    #[must_use]
    pub fn from_ranges(ranges: Vec<(i32, i32)>) -> Self {
        Self(ranges)
    }

    #[must_use]
    pub fn ranges(&self) -> &[(i32, i32)] {
        &self.0
    }

    /// Bin index of a relative depth, clamped into the representable range
    #[must_use]
    pub fn quantize(&self, rel_depth: i32) -> u8 {
        let d = rel_depth.clamp(Self::DEPTH_MIN + 1, Self::DEPTH_MAX);
        for (i, &(lo, hi)) in self.0.iter().enumerate() {
            if d > lo && d <= hi {
                return i as u8;
            }
        }
        (self.0.len() - 1) as u8
    }
}

/// One table of the hashing index: its triplet, its calibrated depth bins
/// and the key-to-template-ids buckets
#[derive(Debug, Clone)]
pub struct HashTable {
    pub triplet: Triplet,
    pub bin_ranges: BinRanges,
    pub buckets: HashMap<HashKey, Vec<u32>>,
}

impl HashTable {
    #[must_use]
    pub fn new(triplet: Triplet, bin_ranges: BinRanges) -> Self {
        Self {
            triplet,
            bin_ranges,
            buckets: HashMap::new(),
        }
    }

    /// Insert a template under a key; a template appears at most once per
    /// bucket
    pub fn push_unique(&mut self, key: HashKey, template_id: u32) {
        let bucket = self.buckets.entry(key).or_default();
        if !bucket.contains(&template_id) {
            bucket.push(template_id);
        }
    }

    #[must_use]
    pub fn get(&self, key: &HashKey) -> Option<&[u32]> {
        self.buckets.get(key).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgbd_common::Point;

    #[test]
    fn calibration_splits_the_value_interval() {
        // Ten templates at centre depths 100..=1000 with +10/+20 satellites
        let mut rel = Vec::new();
        for _ in 0..10 {
            rel.push(10);
            rel.push(20);
        }
        let bins = BinRanges::calibrate(rel, 5);

        assert_eq!(
            bins.ranges(),
            &[
                (BinRanges::DEPTH_MIN, 12),
                (12, 14),
                (14, 16),
                (16, 18),
                (18, BinRanges::DEPTH_MAX),
            ]
        );
    }

    #[test]
    fn ranges_partition_the_signed_interval() {
        let bins = BinRanges::calibrate(vec![-50, -10, 0, 30, 80, 120], 5);
        let ranges = bins.ranges();

        assert_eq!(ranges.first().unwrap().0, BinRanges::DEPTH_MIN);
        assert_eq!(ranges.last().unwrap().1, BinRanges::DEPTH_MAX);
        for pair in ranges.windows(2) {
            // Contiguous: each range starts where the previous ended
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn quantize_respects_half_open_bounds() {
        let bins = BinRanges::from_ranges(vec![
            (BinRanges::DEPTH_MIN, 12),
            (12, 14),
            (14, 16),
            (16, 18),
            (18, BinRanges::DEPTH_MAX),
        ]);

        assert_eq!(bins.quantize(-4000), 0);
        assert_eq!(bins.quantize(12), 0);
        assert_eq!(bins.quantize(13), 1);
        assert_eq!(bins.quantize(14), 1);
        assert_eq!(bins.quantize(15), 2);
        assert_eq!(bins.quantize(18), 3);
        assert_eq!(bins.quantize(19), 4);
        assert_eq!(bins.quantize(30_000), 4);
        assert_eq!(bins.quantize(i32::MAX), 4);
        assert_eq!(bins.quantize(i32::MIN), 0);
    }

    #[test]
    fn buckets_deduplicate_templates() {
        let triplet = Triplet::new(Point::new(0, 0), Point::new(1, 1), Point::new(2, 1));
        let mut table = HashTable::new(triplet, BinRanges::calibrate(vec![0, 10], 5));
        let key = HashKey::new(0, 1, 2, 3, 4);

        table.push_unique(key, 7);
        table.push_unique(key, 7);
        table.push_unique(key, 9);

        assert_eq!(table.get(&key), Some(&[7, 9][..]));
    }
}
