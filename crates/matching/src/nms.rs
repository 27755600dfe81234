//! Non-maximum suppression over verified matches

use rayon::prelude::*;
use rgbd_common::Match;
use tracing::debug;

/// Prune overlapping matches, keeping the highest-scoring one of each
/// cluster.
///
/// Matches are sorted by descending score (ties broken deterministically),
/// then repeatedly the best remaining match is kept and every match whose
/// bounding-box overlap with it exceeds `overlap_factor` is suppressed.
/// Running the function on its own output returns it unchanged.
#[must_use]
pub fn nms(mut matches: Vec<Match>, overlap_factor: f32) -> Vec<Match> {
    if matches.is_empty() {
        return matches;
    }

    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.template_id.cmp(&b.template_id))
            .then(a.obj_bb.x.cmp(&b.obj_bb.x))
            .then(a.obj_bb.y.cmp(&b.obj_bb.y))
    });

    let before = matches.len();
    let mut picked = Vec::new();

    while !matches.is_empty() {
        let best = matches.remove(0);

        let survivors: Vec<bool> = matches
            .par_iter()
            .map(|m| best.obj_bb.overlap(&m.obj_bb) <= overlap_factor)
            .collect();
        matches = matches
            .into_iter()
            .zip(survivors)
            .filter_map(|(m, keep)| keep.then_some(m))
            .collect();

        picked.push(best);
    }

    debug!(before, after = picked.len(), "non-maximum suppression");
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgbd_common::BoundingBox;

    fn match_at(score: f32, x: i32, y: i32) -> Match {
        Match {
            template_id: (score * 100.0) as u32,
            obj_id: 1,
            obj_bb: BoundingBox::new(x, y, 40, 40),
            scale: 1.0,
            score,
            sub_scores: [0; 5],
        }
    }

    #[test]
    fn overlapping_cluster_keeps_only_the_best() {
        // Three heavily overlapping matches: only the 0.9 one survives
        let matches = vec![
            match_at(0.8, 10, 10),
            match_at(0.9, 0, 0),
            match_at(0.7, 5, 5),
        ];

        let picked = nms(matches, 0.1);
        assert_eq!(picked.len(), 1);
        assert!((picked[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn distant_matches_all_survive() {
        let matches = vec![
            match_at(0.9, 0, 0),
            match_at(0.8, 200, 0),
            match_at(0.7, 0, 200),
        ];

        let picked = nms(matches, 0.1);
        assert_eq!(picked.len(), 3);
        // Output is ordered by score
        assert!(picked[0].score > picked[1].score);
        assert!(picked[1].score > picked[2].score);
    }

    #[test]
    fn surviving_pairs_obey_the_overlap_bound() {
        let matches: Vec<Match> = (0..20)
            .map(|i| match_at(0.5 + i as f32 / 100.0, i * 13, (i % 5) * 17))
            .collect();

        let picked = nms(matches, 0.1);
        for i in 0..picked.len() {
            for j in i + 1..picked.len() {
                assert!(picked[i].obj_bb.overlap(&picked[j].obj_bb) <= 0.1);
            }
        }
    }

    #[test]
    fn nms_is_idempotent() {
        let matches: Vec<Match> = (0..20)
            .map(|i| match_at(0.5 + i as f32 / 100.0, i * 9, (i % 4) * 21))
            .collect();

        let once = nms(matches, 0.1);
        let twice = nms(once.clone(), 0.1);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(nms(Vec::new(), 0.1).is_empty());
    }
}
