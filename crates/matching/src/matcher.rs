//! Five-test cascade: feature-point training and window verification

use image::GrayImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use rgbd_common::{
    BoundingBox, Criteria, DetectError, Match, Neighbourhood, Point, Result, Template,
    TemplateSources, TemplateStore, Window,
};
use rgbd_features::{sobel_magnitude, SceneLevel};
use std::sync::Mutex;
use tracing::debug;

/// Sobel response above which a pixel becomes an edge-point candidate
const EDGE_MAGNITUDE_THRESHOLD: f32 = 0.3;
/// Intensity above which a low-gradient pixel becomes a stable candidate
const STABLE_INTENSITY_THRESHOLD: f32 = 0.2;

/// Result of running the cascade on one (window, template) pair.
///
/// `tests_run` counts the tests that actually executed; a failed test stops
/// the cascade, so `tests_run < 5` implies `passed == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub passed: bool,
    pub tests_run: usize,
    /// Passed-point counts for tests I..V (zero for tests never run)
    pub scores: [u32; 5],
}

/// Select the template's edge and stable feature points.
///
/// Edge candidates are strong-Sobel pixels sorted by response, stable
/// candidates are bright low-gradient pixels with valid depth, shuffled.
/// From each list exactly N points are cherry-picked so that kept points
/// stay `min_dist` apart, relaxing the distance until N fit. Fails when a
/// template cannot supply N candidates of either kind.
pub fn generate_feature_points(
    template: &mut Template,
    sources: &TemplateSources,
    criteria: &Criteria,
    rng: &mut StdRng,
) -> Result<()> {
    let n = criteria.points_count;
    let sobel = sobel_magnitude(&sources.gray);
    let bb = template.obj_bb;

    let mut edge_candidates: Vec<(Point, f32)> = Vec::new();
    let mut stable_candidates: Vec<(Point, f32)> = Vec::new();

    let x_end = (bb.x + bb.width as i32 - 1).min(sources.gray.width() as i32);
    let y_end = (bb.y + bb.height as i32 - 1).min(sources.gray.height() as i32);

    for y in (bb.y + 1).max(0)..y_end {
        for x in (bb.x + 1).max(0)..x_end {
            let (ux, uy) = (x as u32, y as u32);
            let magnitude = sobel.get_pixel(ux, uy)[0];
            let intensity = sources.gray.get_pixel(ux, uy)[0];
            let relative = Point::new(x - bb.x, y - bb.y);

            if magnitude > EDGE_MAGNITUDE_THRESHOLD {
                edge_candidates.push((relative, magnitude));
            } else if intensity > STABLE_INTENSITY_THRESHOLD
                && sources.depth.get_pixel(ux, uy)[0] != 0
            {
                stable_candidates.push((relative, intensity));
            }
        }
    }

    if edge_candidates.len() < n || stable_candidates.len() < n {
        return Err(DetectError::InvariantViolated(format!(
            "template {} has {} edge / {} stable candidates, need {}",
            template.id,
            edge_candidates.len(),
            stable_candidates.len(),
            n
        )));
    }

    edge_candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    stable_candidates.shuffle(rng);

    let edge_points: Vec<Point> = edge_candidates.iter().map(|&(p, _)| p).collect();
    let stable_points: Vec<Point> = stable_candidates.iter().map(|&(p, _)| p).collect();

    template.edge_points = cherry_pick(&edge_points, (edge_points.len() / n) as f32, n);
    template.stable_points = cherry_pick(&stable_points, (stable_points.len() / n) as f32, n);
    Ok(())
}

/// Greedily keep points at least `min_dist` apart, relaxing the distance by
/// 0.5 until `count` points fit
fn cherry_pick(candidates: &[Point], initial_min_dist: f32, count: usize) -> Vec<Point> {
    let mut min_dist = initial_min_dist + 0.5;
    let mut kept: Vec<Point> = Vec::with_capacity(count);

    loop {
        min_dist -= 0.5;
        kept.clear();

        for p in candidates {
            if kept.iter().all(|q| p.distance(q) >= min_dist) {
                kept.push(*p);
                if kept.len() == count {
                    return kept;
                }
            }
        }

        if kept.len() >= count || min_dist <= 0.0 {
            kept.truncate(count);
            return kept;
        }
    }
}

/// Record the per-point matching features at the selected points
pub fn extract_features(
    template: &mut Template,
    sources: &TemplateSources,
    criteria: &Criteria,
) -> Result<()> {
    let n = criteria.points_count;
    let bb = template.obj_bb;
    let mut features = rgbd_common::TemplateFeatures::default();
    let mut valid_depths: Vec<u16> = Vec::with_capacity(n);

    for i in 0..n {
        let stable = template.stable_points[i];
        let edge = template.edge_points[i];
        let (sx, sy) = ((stable.x + bb.x) as u32, (stable.y + bb.y) as u32);
        let (ex, ey) = ((edge.x + bb.x) as u32, (edge.y + bb.y) as u32);

        let depth = sources.depth.get_pixel(sx, sy)[0];
        features.depths.push(depth);
        features.gradients.push(sources.gradients.get_pixel(ex, ey)[0]);
        features.normals.push(sources.normals.get_pixel(sx, sy)[0]);
        features.hues.push(sources.hue.get_pixel(sx, sy)[0]);

        if depth != 0 {
            valid_depths.push(depth);
        }
    }

    if valid_depths.is_empty() {
        return Err(DetectError::InvariantViolated(format!(
            "template {} has no valid stable-point depths",
            template.id
        )));
    }
    features.depth_median = median(&mut valid_depths);
    template.features = features;
    Ok(())
}

fn median(values: &mut [u16]) -> u16 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        ((u32::from(values[mid - 1]) + u32::from(values[mid])) / 2) as u16
    } else {
        values[mid]
    }
}

/// True if any offset in the neighbourhood around `point` (anchored at the
/// window's top-left) satisfies the predicate; out-of-image offsets are
/// skipped
fn probe<F>(size: (u32, u32), window: &Window, point: Point, nb: Neighbourhood, pred: F) -> bool
where
    F: Fn(u32, u32) -> bool,
{
    for dy in nb.start..=nb.end {
        for dx in nb.start..=nb.end {
            let x = point.x + window.x + dx;
            let y = point.y + window.y + dy;
            if x < 0 || y < 0 || x >= size.0 as i32 || y >= size.1 as i32 {
                continue;
            }
            if pred(x as u32, y as u32) {
                return true;
            }
        }
    }
    false
}

/// Run the cascade for one candidate template at one window.
///
/// Tests execute in order I..V; each compares its passed-point count against
/// `⌈N · match_factor⌉` and aborts the cascade when below it.
#[must_use]
pub fn evaluate_candidate(
    template: &Template,
    window: &Window,
    level: &SceneLevel,
    criteria: &Criteria,
) -> CascadeOutcome {
    let n = criteria
        .points_count
        .min(template.stable_points.len())
        .min(template.edge_points.len());
    let min_score = criteria.min_test_score();
    let scale = level.scale;
    let size = level.depth.dimensions();
    let nb = criteria.neighbourhood;

    let mut scores = [0u32; 5];
    let mut tests_run = 0usize;
    let fail = |tests_run, scores| CascadeOutcome {
        passed: false,
        tests_run,
        scores,
    };

    // Test I: object size via depth agreement within sensor deviation
    tests_run += 1;
    for i in 0..n {
        let t_depth = f32::from(template.features.depths[i]);
        let hit = probe(size, window, template.stable_points[i], nb, |x, y| {
            let s_depth = level.depth.get_pixel(x, y)[0];
            if s_depth == 0 {
                return false;
            }
            let ratio = 1.0 - criteria.depth_deviation.ratio(s_depth);
            let expected = t_depth * scale;
            let s = f32::from(s_depth);
            s >= expected * ratio && s <= expected / ratio
        });
        scores[0] += u32::from(hit);
    }
    if scores[0] < min_score {
        return fail(tests_run, scores);
    }

    // Test II: quantized normal agreement against the spread map
    tests_run += 1;
    for i in 0..n {
        let t_normal = template.features.normals[i];
        let hit = t_normal != 0
            && probe(size, window, template.stable_points[i], nb, |x, y| {
                level.spread_normals.get_pixel(x, y)[0] & t_normal != 0
            });
        scores[1] += u32::from(hit);
    }
    if scores[1] < min_score {
        return fail(tests_run, scores);
    }

    // Test III: quantized gradient agreement with sufficient magnitude
    tests_run += 1;
    for i in 0..n {
        let t_gradient = template.features.gradients[i];
        let hit = t_gradient != 0
            && probe(size, window, template.edge_points[i], nb, |x, y| {
                level.spread_gradients.get_pixel(x, y)[0] & t_gradient != 0
                    && level.magnitudes.get_pixel(x, y)[0] > criteria.min_magnitude
            });
        scores[2] += u32::from(hit);
    }
    if scores[2] < min_score {
        return fail(tests_run, scores);
    }

    // Test IV: depth close to the template's depth median
    tests_run += 1;
    let depth_bound =
        criteria.depth_k * template.diameter * criteria.info.depth_scale_factor;
    let median_scaled = f32::from(template.features.depth_median) * scale;
    for i in 0..n {
        let hit = probe(size, window, template.stable_points[i], nb, |x, y| {
            f32::from(level.depth.get_pixel(x, y)[0]) - median_scaled < depth_bound
        });
        scores[3] += u32::from(hit);
    }
    if scores[3] < min_score {
        return fail(tests_run, scores);
    }

    // Test V: remapped hue agreement
    tests_run += 1;
    for i in 0..n {
        let t_hue = i32::from(template.features.hues[i]);
        let hit = probe(size, window, template.stable_points[i], nb, |x, y| {
            (t_hue - i32::from(level.hue.get_pixel(x, y)[0])).abs()
                < i32::from(criteria.color_tolerance)
        });
        scores[4] += u32::from(hit);
    }
    if scores[4] < min_score {
        return fail(tests_run, scores);
    }

    CascadeOutcome {
        passed: true,
        tests_run,
        scores,
    }
}

/// Match every window's candidates against the scene level.
///
/// Windows run in parallel; matches are appended to a shared list. Test I
/// gates admission only; the final score averages tests II..V.
#[must_use]
pub fn match_windows(
    level: &SceneLevel,
    windows: &[Window],
    store: &TemplateStore,
    criteria: &Criteria,
) -> Vec<Match> {
    let matches: Mutex<Vec<Match>> = Mutex::new(Vec::new());
    let n = criteria.points_count as f32;

    windows.par_iter().for_each(|window| {
        for &template_id in &window.candidates {
            let Some(template) = store.get(template_id) else {
                continue;
            };

            let outcome = evaluate_candidate(template, window, level, criteria);
            if !outcome.passed {
                continue;
            }

            let [_, s2, s3, s4, s5] = outcome.scores;
            let score = (s2 + s3 + s4 + s5) as f32 / (4.0 * n);
            let obj_bb = BoundingBox::new(
                window.x,
                window.y,
                template.obj_bb.width,
                template.obj_bb.height,
            );

            let found = Match {
                template_id,
                obj_id: template.obj_id,
                obj_bb,
                scale: level.scale,
                score,
                sub_scores: outcome.scores,
            };
            match matches.lock() {
                Ok(mut guard) => guard.push(found),
                Err(poisoned) => poisoned.into_inner().push(found),
            }
        }
    });

    let found = match matches.into_inner() {
        Ok(v) => v,
        Err(poisoned) => poisoned.into_inner(),
    };
    debug!(scale = level.scale, matches = found.len(), "cascade matches");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::SeedableRng;
    use rgbd_common::{DepthImage, GrayImageF32};
    use rgbd_features::{quantized_gradients, quantized_normals, spread};

    const SIDE: u32 = 64;

    /// Striped gray plus a sloped depth plane: rich in both edge and stable
    /// candidates, normals well-defined everywhere inside
    fn synthetic_sources() -> TemplateSources {
        let gray = GrayImageF32::from_fn(SIDE, SIDE, |x, _| {
            Luma([if (x / 4) % 2 == 0 { 0.1 } else { 0.9 }])
        });
        let depth = DepthImage::from_fn(SIDE, SIDE, |x, _| Luma([1000 + x as u16]));
        let hue = GrayImage::from_pixel(SIDE, SIDE, Luma([90]));

        let (gradients, magnitudes) = quantized_gradients(&gray, 0.1);
        let (normals, _) = quantized_normals(&depth, u16::MAX, 100);

        TemplateSources {
            gray,
            hue,
            depth,
            gradients,
            magnitudes,
            normals,
        }
    }

    fn level_from_sources(sources: &TemplateSources, criteria: &Criteria) -> SceneLevel {
        let (normals, normals_3d) = quantized_normals(&sources.depth, u16::MAX, 100);
        SceneLevel {
            scale: 1.0,
            camera: rgbd_common::Camera::default(),
            gray: sources.gray.clone(),
            hue: sources.hue.clone(),
            depth: sources.depth.clone(),
            gradients: sources.gradients.clone(),
            magnitudes: sources.magnitudes.clone(),
            normals,
            normals_3d,
            spread_gradients: spread(&sources.gradients, criteria.patch_offset),
            spread_normals: spread(&sources.normals, criteria.patch_offset),
            edgels: GrayImage::new(SIDE, SIDE),
        }
    }

    fn trained_template(id: u32, sources: &TemplateSources, criteria: &Criteria) -> Template {
        let mut template = Template {
            id,
            obj_id: id,
            diameter: 50.0,
            obj_bb: BoundingBox::new(0, 0, SIDE, SIDE),
            ..Template::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        generate_feature_points(&mut template, sources, criteria, &mut rng).unwrap();
        extract_features(&mut template, sources, criteria).unwrap();
        template
    }

    fn assert_points_inside(points: &[Point], bb: BoundingBox) {
        for p in points {
            let abs = Point::new(p.x + bb.x, p.y + bb.y);
            assert!(bb.contains(abs), "{abs:?} outside {bb:?}");
        }
    }

    #[test]
    fn training_selects_n_distinct_points() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let template = trained_template(1, &sources, &criteria);

        assert_eq!(template.edge_points.len(), criteria.points_count);
        assert_eq!(template.stable_points.len(), criteria.points_count);
        assert_points_inside(&template.edge_points, template.obj_bb);
        assert_points_inside(&template.stable_points, template.obj_bb);

        // Stable points always sit on valid depth
        for p in &template.stable_points {
            assert_ne!(sources.depth.get_pixel(p.x as u32, p.y as u32)[0], 0);
        }
    }

    #[test]
    fn training_fails_without_enough_candidates() {
        let criteria = Criteria::default();
        // Uniform gray: no edges at all
        let sources = TemplateSources {
            gray: GrayImageF32::from_pixel(SIDE, SIDE, Luma([0.5])),
            ..synthetic_sources()
        };
        let mut template = Template {
            obj_bb: BoundingBox::new(0, 0, SIDE, SIDE),
            ..Template::default()
        };
        let mut rng = StdRng::seed_from_u64(1);

        let err = generate_feature_points(&mut template, &sources, &criteria, &mut rng);
        assert!(matches!(err, Err(DetectError::InvariantViolated(_))));
    }

    #[test]
    fn extracted_features_have_length_n() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let template = trained_template(1, &sources, &criteria);

        let f = &template.features;
        assert_eq!(f.depths.len(), criteria.points_count);
        assert_eq!(f.gradients.len(), criteria.points_count);
        assert_eq!(f.normals.len(), criteria.points_count);
        assert_eq!(f.hues.len(), criteria.points_count);
        assert!(f.depth_median >= 1000);
        assert!(f.depth_median < 1000 + SIDE as u16);
    }

    #[test]
    fn identical_scene_passes_all_tests() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let template = trained_template(1, &sources, &criteria);
        let level = level_from_sources(&sources, &criteria);
        let window = Window::new(0, 0, SIDE, SIDE, 0);

        let outcome = evaluate_candidate(&template, &window, &level, &criteria);
        assert!(outcome.passed);
        assert_eq!(outcome.tests_run, 5);
        for score in outcome.scores {
            assert!(score >= criteria.min_test_score());
        }
    }

    #[test]
    fn cascade_stops_after_failed_normal_test() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let mut template = trained_template(1, &sources, &criteria);
        let level = level_from_sources(&sources, &criteria);
        let window = Window::new(0, 0, SIDE, SIDE, 0);

        // The scene's plane slopes along +x; claim every stable point had
        // the opposite octant so test II cannot find a single agreement
        let scene_code = level.normals.get_pixel(SIDE / 2, SIDE / 2)[0];
        let wrong_code = if scene_code == 1 { 128 } else { 1 };
        for normal in &mut template.features.normals {
            *normal = wrong_code;
        }

        let outcome = evaluate_candidate(&template, &window, &level, &criteria);
        assert!(!outcome.passed);
        // Test I ran and passed, test II ran and failed, III..V never ran
        assert_eq!(outcome.tests_run, 2);
        assert!(outcome.scores[0] >= criteria.min_test_score());
        assert_eq!(outcome.scores[1], 0);
        assert_eq!(outcome.scores[2], 0);
        assert_eq!(outcome.scores[3], 0);
        assert_eq!(outcome.scores[4], 0);
    }

    #[test]
    fn match_score_averages_tests_two_to_five() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let template = trained_template(3, &sources, &criteria);
        let level = level_from_sources(&sources, &criteria);

        let mut store = TemplateStore::new();
        store.insert(template);
        let mut window = Window::new(0, 0, SIDE, SIDE, 0);
        window.candidates = vec![3];

        let matches = match_windows(&level, &[window], &store, &criteria);
        assert_eq!(matches.len(), 1);

        let m = &matches[0];
        assert_eq!(m.template_id, 3);
        assert_eq!(m.obj_id, 3);
        assert_eq!(m.obj_bb, BoundingBox::new(0, 0, SIDE, SIDE));
        let [_, s2, s3, s4, s5] = m.sub_scores;
        let expected = (s2 + s3 + s4 + s5) as f32 / (4.0 * criteria.points_count as f32);
        assert!((m.score - expected).abs() < 1e-6);
        assert!(m.score > 0.0 && m.score <= 1.0);
    }

    #[test]
    fn failing_candidates_produce_no_matches() {
        let criteria = Criteria::default();
        let sources = synthetic_sources();
        let mut template = trained_template(4, &sources, &criteria);
        let level = level_from_sources(&sources, &criteria);

        for normal in &mut template.features.normals {
            *normal = 0;
        }
        let mut store = TemplateStore::new();
        store.insert(template);
        let mut window = Window::new(0, 0, SIDE, SIDE, 0);
        window.candidates = vec![4];

        assert!(match_windows(&level, &[window], &store, &criteria).is_empty());
    }

    #[test]
    fn cherry_pick_respects_distance() {
        let points: Vec<Point> = (0..50).map(|i| Point::new(i * 2, 0)).collect();
        let picked = cherry_pick(&points, 10.0, 5);
        assert_eq!(picked.len(), 5);
        for i in 0..picked.len() {
            for j in i + 1..picked.len() {
                assert!(picked[i].distance(&picked[j]) >= 9.5);
            }
        }
    }

    #[test]
    fn cherry_pick_relaxes_until_count_fits() {
        // Dense cluster: only distance 0.5 or below admits ten points
        let points: Vec<Point> = (0..10).map(|i| Point::new(i, 0)).collect();
        let picked = cherry_pick(&points, 100.0, 10);
        assert_eq!(picked.len(), 10);
    }
}
