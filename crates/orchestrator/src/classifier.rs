//! The classifier: train, load, detect and refine pipelines

use crate::dataset::{parse_object, parse_scene};
use crate::storage::{
    load_classifier_state, load_templates, save_classifier_state, save_templates,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rgbd_common::{Criteria, DetectError, Match, Result, Template, TemplateStore};
use rgbd_features::{ScenePyramid, SceneSources};
use rgbd_hashing::{HashTable, Hasher};
use rgbd_matching::{extract_features, find_windows, generate_feature_points, match_windows, nms};
use rgbd_pose::{Mesh, PoseRefiner, PoseRenderer, RefinedPose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// One reported detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub obj_id: u32,
    pub obj_bb: rgbd_common::BoundingBox,
    pub score: f32,
}

/// Per-scene result entry of the detection stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneResult {
    pub scene_id: u32,
    pub matches: Vec<DetectedObject>,
}

/// Owns the trained state: criteria, the template store and the hash tables
pub struct Classifier {
    criteria: Criteria,
    store: TemplateStore,
    tables: Vec<HashTable>,
}

impl Classifier {
    #[must_use]
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            store: TemplateStore::new(),
            tables: Vec::new(),
        }
    }

    #[must_use]
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Mutable criteria access for pre-detection overrides (pyramid shape,
    /// seed); discovered statistics should stay as trained
    #[must_use]
    pub fn criteria_mut(&mut self) -> &mut Criteria {
        &mut self.criteria
    }

    #[must_use]
    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    #[must_use]
    pub fn tables(&self) -> &[HashTable] {
        &self.tables
    }

    /// Train over the given object roots and persist everything into
    /// `output_dir`.
    ///
    /// Per object: parse templates, select feature points, extract matching
    /// features and update the discovered statistics. Afterwards the hash
    /// tables are trained jointly over all templates.
    pub fn train(
        &mut self,
        template_roots: &[PathBuf],
        output_dir: &Path,
        indices: Option<&[u32]>,
    ) -> Result<()> {
        if template_roots.is_empty() {
            return Err(DetectError::InvariantViolated(
                "no template roots given".into(),
            ));
        }

        let started = Instant::now();
        let mut rng = StdRng::seed_from_u64(self.criteria.seed);
        let mut next_id = 0u32;
        let mut all = Vec::new();

        for root in template_roots {
            let mut parsed = parse_object(root, &mut self.criteria, indices, &mut next_id)?;

            for (template, sources) in &mut parsed {
                generate_feature_points(template, sources, &self.criteria, &mut rng)?;
                extract_features(template, sources, &self.criteria)?;
            }

            // Group and persist by object id (one root can hold one object)
            let mut by_object: BTreeMap<u32, Vec<Template>> = BTreeMap::new();
            for (template, _) in &parsed {
                by_object
                    .entry(template.obj_id)
                    .or_default()
                    .push(template.clone());
            }
            for (obj_id, templates) in by_object {
                save_templates(output_dir, obj_id, &templates)?;
            }

            all.extend(parsed);
        }

        let (templates, sources): (Vec<_>, Vec<_>) = all.into_iter().unzip();

        let hasher = Hasher::new(&self.criteria);
        self.tables = hasher.train(&templates, &sources, &mut rng)?;

        self.store = TemplateStore::new();
        for template in templates {
            self.store.insert(template);
        }

        save_classifier_state(output_dir, &self.criteria, &self.tables)?;
        info!(
            templates = self.store.len(),
            tables = self.tables.len(),
            elapsed = ?started.elapsed(),
            "training finished"
        );
        Ok(())
    }

    /// Load persisted templates and classifier state, re-linking table
    /// references against the freshly filled store
    pub fn load(&mut self, trained_list: &[PathBuf], trained_dir: &Path) -> Result<()> {
        let started = Instant::now();

        self.store = TemplateStore::new();
        for file in trained_list {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                trained_dir.join(file)
            };
            for template in load_templates(&path)? {
                self.store.insert(template);
            }
        }

        let (criteria, tables) = load_classifier_state(trained_dir, &self.store)?;
        self.criteria = criteria;
        self.tables = tables;

        info!(
            templates = self.store.len(),
            tables = self.tables.len(),
            elapsed = ?started.elapsed(),
            "trained state loaded"
        );
        Ok(())
    }

    /// Detect trained objects in one scene.
    ///
    /// Per pyramid level: objectness, hashing verification, cascade
    /// matching. Match boxes are normalized to base-level coordinates and
    /// non-maximum suppression runs once across all levels.
    pub fn detect_scene(&self, scene_dir: &Path, scene_index: u32) -> Result<SceneResult> {
        let sources = parse_scene(scene_dir, scene_index)?;
        let matches = self.detect_in_sources(&sources);

        Ok(SceneResult {
            scene_id: scene_index,
            matches: matches
                .iter()
                .map(|m| DetectedObject {
                    obj_id: m.obj_id,
                    obj_bb: m.obj_bb,
                    score: m.score,
                })
                .collect(),
        })
    }

    /// Detection over already-decoded scene sources; returns the full
    /// matches (scores and sub-scores included) in base-level coordinates
    #[must_use]
    pub fn detect_in_sources(&self, sources: &SceneSources) -> Vec<Match> {
        let total = Instant::now();
        let pyramid = ScenePyramid::build(sources, &self.criteria);
        let t_pyramid = total.elapsed();

        let hasher = Hasher::new(&self.criteria);
        let mut all_matches: Vec<Match> = Vec::new();
        let mut t_objectness = std::time::Duration::ZERO;
        let mut t_verification = std::time::Duration::ZERO;
        let mut t_matching = std::time::Duration::ZERO;

        for level in &pyramid.levels {
            let t = Instant::now();
            let windows = find_windows(&level.edgels, &self.criteria);
            t_objectness += t.elapsed();
            if windows.is_empty() {
                continue;
            }

            let t = Instant::now();
            let windows =
                hasher.verify_windows(&self.tables, &level.depth, &level.normals, windows);
            t_verification += t.elapsed();
            if windows.is_empty() {
                continue;
            }

            let t = Instant::now();
            let mut matches = match_windows(level, &windows, &self.store, &self.criteria);
            t_matching += t.elapsed();

            // Normalize boxes so suppression compares across scales
            for m in &mut matches {
                m.obj_bb = m.bb_at_scale(1.0);
            }
            all_matches.extend(matches);
        }

        let t = Instant::now();
        let kept = nms(all_matches, self.criteria.overlap_factor);
        let t_nms = t.elapsed();

        info!(
            scene = sources.id,
            matches = kept.len(),
            pyramid = ?t_pyramid,
            objectness = ?t_objectness,
            verification = ?t_verification,
            matching = ?t_matching,
            nms = ?t_nms,
            total = ?total.elapsed(),
            "scene processed"
        );
        kept
    }

    /// Detect across many scenes, skipping none; the result stream carries
    /// one entry per scene
    pub fn detect(&self, scene_dir: &Path, scene_indices: &[u32]) -> Result<Vec<SceneResult>> {
        let mut results = Vec::with_capacity(scene_indices.len());
        for &index in scene_indices {
            results.push(self.detect_scene(scene_dir, index)?);
        }
        Ok(results)
    }

    /// Refine one surviving match with the particle swarm. The renderer is
    /// used exclusively for the duration of the call.
    pub fn refine(
        &self,
        renderer: &mut dyn PoseRenderer,
        meshes: &std::collections::HashMap<u32, Mesh>,
        found: &Match,
        pyramid: &ScenePyramid,
    ) -> Result<RefinedPose> {
        let template = self.store.get(found.template_id).ok_or_else(|| {
            DetectError::InvariantViolated(format!(
                "match references unknown template id {}",
                found.template_id
            ))
        })?;
        let mesh = meshes.get(&found.obj_id).ok_or_else(|| {
            DetectError::InvariantViolated(format!("no mesh for object {}", found.obj_id))
        })?;

        debug!(template = template.id, obj = found.obj_id, "refining pose");
        let refiner = PoseRefiner::new();
        let mut rng = StdRng::seed_from_u64(self.criteria.seed ^ u64::from(found.template_id));
        refiner.refine(
            renderer,
            mesh,
            found,
            template,
            pyramid.base_level(),
            &mut rng,
        )
    }
}
