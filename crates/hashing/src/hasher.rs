//! Table training and window verification

use crate::table::{BinRanges, HashKey, HashTable};
use crate::triplet::{Triplet, TripletLayout};
use image::GrayImage;
use rand::rngs::StdRng;
use rayon::prelude::*;
use rgbd_common::{
    Criteria, DepthImage, DetectError, Point, Result, Size, Template, TemplateSources, Window,
};
use rgbd_features::octant_index;
use std::collections::HashMap;
use tracing::{debug, info};

/// Trains the hashing index over all templates and verifies window
/// candidates at detect time
pub struct Hasher<'a> {
    criteria: &'a Criteria,
}

impl<'a> Hasher<'a> {
    #[must_use]
    pub fn new(criteria: &'a Criteria) -> Self {
        Self { criteria }
    }

    /// Draw `tables_count` triplets, pairwise unequal modulo point
    /// permutation. Duplicates are replaced until uniqueness holds.
    pub fn generate_triplets(&self, rng: &mut StdRng) -> Vec<Triplet> {
        let grid = self.criteria.triplet_grid;
        let max_distance = self.criteria.max_triplet_distance;
        let batch = self.criteria.tables_count * self.criteria.training_multiplier;

        let mut kept: Vec<Triplet> = Vec::with_capacity(self.criteria.tables_count);
        while kept.len() < self.criteria.tables_count {
            for _ in 0..batch {
                if kept.len() == self.criteria.tables_count {
                    break;
                }
                let candidate = Triplet::random(grid, max_distance, rng);
                if !kept.contains(&candidate) {
                    kept.push(candidate);
                }
            }
        }
        kept
    }

    /// Build and populate all hash tables over the trained template set
    pub fn train(
        &self,
        templates: &[Template],
        sources: &[TemplateSources],
        rng: &mut StdRng,
    ) -> Result<Vec<HashTable>> {
        if templates.is_empty() || templates.len() != sources.len() {
            return Err(DetectError::InvariantViolated(
                "hasher training needs a non-empty template set with sources".into(),
            ));
        }

        let triplets = self.generate_triplets(rng);
        debug!(count = triplets.len(), "triplets generated");

        let mut tables = triplets
            .into_par_iter()
            .map(|triplet| self.calibrate_table(triplet, templates, sources))
            .collect::<Result<Vec<HashTable>>>()?;

        tables.par_iter_mut().for_each(|table| {
            self.populate_table(table, templates, sources);
        });

        info!(tables = tables.len(), "hash tables trained");
        Ok(tables)
    }

    /// Collect relative depths of one triplet over every template and derive
    /// the table's bin ranges. The triplet grid is centred inside the
    /// largest-template box for this pass.
    fn calibrate_table(
        &self,
        triplet: Triplet,
        templates: &[Template],
        sources: &[TemplateSources],
    ) -> Result<HashTable> {
        let largest = self.criteria.info.largest_template;
        let mut rel_depths = Vec::with_capacity(templates.len() * 2);

        for (template, src) in templates.iter().zip(sources) {
            let layout = TripletLayout::new(largest, self.criteria.triplet_grid, centered_origin(template, largest));
            if let Some((d1, d2)) = relative_depths(&triplet, &layout, &src.depth) {
                rel_depths.push(d1);
                rel_depths.push(d2);
            }
        }

        if rel_depths.is_empty() {
            return Err(DetectError::InvariantViolated(
                "no valid depth samples while calibrating a hash table".into(),
            ));
        }

        Ok(HashTable::new(
            triplet,
            BinRanges::calibrate(rel_depths, self.criteria.depth_bin_count),
        ))
    }

    /// Insert every template into the table under its quantized key, grid
    /// anchored at the object box's top-left
    fn populate_table(&self, table: &mut HashTable, templates: &[Template], sources: &[TemplateSources]) {
        let largest = self.criteria.info.largest_template;

        for (template, src) in templates.iter().zip(sources) {
            let layout = TripletLayout::new(largest, self.criteria.triplet_grid, template.obj_bb.top_left());
            if let Some(key) = sample_key(&table.triplet, &layout, &table.bin_ranges, &src.depth, &src.normals) {
                table.push_unique(key, template.id);
            }
        }
    }

    /// Per admitted window: poll every table, award votes, and keep the
    /// templates with at least `min_votes`, ordered by descending votes.
    /// Windows whose candidate list stays empty are discarded.
    #[must_use]
    pub fn verify_windows(
        &self,
        tables: &[HashTable],
        depth: &DepthImage,
        normals: &GrayImage,
        windows: Vec<Window>,
    ) -> Vec<Window> {
        let grid = self.criteria.triplet_grid;
        let min_votes = self.criteria.min_votes;
        let max_candidates = self.criteria.tables_count;

        let verified: Vec<Window> = windows
            .into_par_iter()
            .filter_map(|mut window| {
                let layout = TripletLayout::new(
                    Size::new(window.width, window.height),
                    grid,
                    window.top_left(),
                );

                let mut votes: HashMap<u32, u32> = HashMap::new();
                for table in tables {
                    let Some(key) =
                        sample_key(&table.triplet, &layout, &table.bin_ranges, depth, normals)
                    else {
                        continue;
                    };
                    if let Some(bucket) = table.get(&key) {
                        for &id in bucket {
                            *votes.entry(id).or_insert(0) += 1;
                        }
                    }
                }

                let mut passed: Vec<(u32, u32)> = votes
                    .into_iter()
                    .filter(|&(_, v)| v as usize >= min_votes)
                    .collect();
                if passed.is_empty() {
                    return None;
                }

                // Descending votes, ids break ties for determinism
                passed.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                passed.truncate(max_candidates);

                window.candidates = passed.into_iter().map(|(id, _)| id).collect();
                Some(window)
            })
            .collect();

        debug!(windows = verified.len(), "windows verified by hashing");
        verified
    }
}

/// Grid origin centring the largest-template box on the object box
fn centered_origin(template: &Template, largest: Size) -> Point {
    Point::new(
        template.obj_bb.x - (largest.width as i32 - template.obj_bb.width as i32) / 2,
        template.obj_bb.y - (largest.height as i32 - template.obj_bb.height as i32) / 2,
    )
}

fn depth_at(depth: &DepthImage, p: Point) -> Option<u16> {
    if p.x < 0 || p.y < 0 || p.x >= depth.width() as i32 || p.y >= depth.height() as i32 {
        return None;
    }
    let d = depth.get_pixel(p.x as u32, p.y as u32)[0];
    (d != 0).then_some(d)
}

/// Relative depths `d(p1) - d(c)` and `d(p2) - d(c)`, `None` when any of the
/// three samples is out of bounds or missing
fn relative_depths(
    triplet: &Triplet,
    layout: &TripletLayout,
    depth: &DepthImage,
) -> Option<(i32, i32)> {
    let c = depth_at(depth, layout.project(triplet.c))?;
    let p1 = depth_at(depth, layout.project(triplet.p1))?;
    let p2 = depth_at(depth, layout.project(triplet.p2))?;
    Some((i32::from(p1) - i32::from(c), i32::from(p2) - i32::from(c)))
}

/// Full quintuple key at a triplet, `None` on any unrepresentable sample
fn sample_key(
    triplet: &Triplet,
    layout: &TripletLayout,
    bins: &BinRanges,
    depth: &DepthImage,
    normals: &GrayImage,
) -> Option<HashKey> {
    let (d1, d2) = relative_depths(triplet, layout, depth)?;

    let octant = |p: Point| -> Option<u8> {
        if p.x < 0 || p.y < 0 || p.x >= normals.width() as i32 || p.y >= normals.height() as i32 {
            return None;
        }
        octant_index(normals.get_pixel(p.x as u32, p.y as u32)[0])
    };

    let n1 = octant(layout.project(triplet.c))?;
    let n2 = octant(layout.project(triplet.p1))?;
    let n3 = octant(layout.project(triplet.p2))?;

    Some(HashKey::new(bins.quantize(d1), bins.quantize(d2), n1, n2, n3))
}
