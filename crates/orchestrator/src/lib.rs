//! Train, load and detect pipelines
//!
//! Ties the pipeline stages together:
//!
//! - **train** parses each object's templates, extracts feature points and
//!   matching features, discovers the dataset statistics, trains the hash
//!   tables jointly over all templates and persists everything,
//! - **load** reads the persisted state back and re-links hash-table
//!   references against the in-memory template store,
//! - **detect** builds a scene pyramid per scene and runs
//!   objectness → hashing verification → cascade matching per level, then
//!   non-maximum suppression across scales,
//! - **refine** hands surviving matches to the particle-swarm pose refiner.
//!
//! All persistence lives here; the cascade crates never touch the
//! filesystem.

mod classifier;
mod dataset;
mod storage;

pub use classifier::{Classifier, DetectedObject, SceneResult};
pub use dataset::{
    discover_scene_indices, parse_object, parse_scene, CameraRecord, TemplateRecord,
};
pub use storage::{load_classifier_state, load_templates, save_classifier_state, save_templates};
