//! Persistence of trained state
//!
//! Per object: an ordered list of serialized templates. Globally: the
//! criteria (tunables plus discovered statistics) and every hash table with
//! its triplet, bin ranges and key buckets. Buckets are written sorted by
//! key so persisting the same state twice yields identical files.

use rgbd_common::{Criteria, DetectError, Result, Template, TemplateStore};
use rgbd_hashing::{BinRanges, HashKey, HashTable, Triplet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const CLASSIFIER_FILE: &str = "classifier.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredBucket {
    key: [u8; 5],
    template_ids: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    triplet: Triplet,
    bin_ranges: Vec<(i32, i32)>,
    buckets: Vec<StoredBucket>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredClassifier {
    criteria: Criteria,
    tables: Vec<StoredTable>,
}

impl From<&HashTable> for StoredTable {
    fn from(table: &HashTable) -> Self {
        let mut buckets: Vec<StoredBucket> = table
            .buckets
            .iter()
            .map(|(key, ids)| StoredBucket {
                key: key.0,
                template_ids: ids.clone(),
            })
            .collect();
        buckets.sort_by(|a, b| a.key.cmp(&b.key));

        StoredTable {
            triplet: table.triplet,
            bin_ranges: table.bin_ranges.ranges().to_vec(),
            buckets,
        }
    }
}

impl From<StoredTable> for HashTable {
    fn from(stored: StoredTable) -> Self {
        let mut table = HashTable::new(stored.triplet, BinRanges::from_ranges(stored.bin_ranges));
        for bucket in stored.buckets {
            for id in bucket.template_ids {
                table.push_unique(HashKey(bucket.key), id);
            }
        }
        table
    }
}

/// Persist one object's templates as `{obj_id:02}.json`, returning the path
pub fn save_templates(output_dir: &Path, obj_id: u32, templates: &[Template]) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{obj_id:02}.json"));
    let json = serde_json::to_string(templates)
        .map_err(|e| DetectError::Persistence(e.to_string()))?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), count = templates.len(), "templates persisted");
    Ok(path)
}

pub fn load_templates(path: &Path) -> Result<Vec<Template>> {
    if !path.exists() {
        return Err(DetectError::InputMissing(path.to_path_buf()));
    }
    serde_json::from_str(&std::fs::read_to_string(path)?)
        .map_err(|e| DetectError::Persistence(format!("{}: {e}", path.display())))
}

/// Persist the criteria and hash tables as `classifier.json`
pub fn save_classifier_state(
    output_dir: &Path,
    criteria: &Criteria,
    tables: &[HashTable],
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(CLASSIFIER_FILE);
    let stored = StoredClassifier {
        criteria: criteria.clone(),
        tables: tables.iter().map(StoredTable::from).collect(),
    };
    let json =
        serde_json::to_string(&stored).map_err(|e| DetectError::Persistence(e.to_string()))?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), tables = stored.tables.len(), "classifier state persisted");
    Ok(path)
}

/// Load the criteria and hash tables and re-link every bucket against the
/// template store. An id referencing no loaded template aborts loading.
pub fn load_classifier_state(
    trained_dir: &Path,
    store: &TemplateStore,
) -> Result<(Criteria, Vec<HashTable>)> {
    let path = trained_dir.join(CLASSIFIER_FILE);
    if !path.exists() {
        return Err(DetectError::InputMissing(path));
    }

    let stored: StoredClassifier = serde_json::from_str(&std::fs::read_to_string(&path)?)
        .map_err(|e| DetectError::Persistence(format!("{}: {e}", path.display())))?;

    let tables: Vec<HashTable> = stored.tables.into_iter().map(HashTable::from).collect();
    for table in &tables {
        for ids in table.buckets.values() {
            for &id in ids {
                if !store.contains(id) {
                    return Err(DetectError::InvariantViolated(format!(
                        "hash table references unknown template id {id}"
                    )));
                }
            }
        }
    }

    Ok((stored.criteria, tables))
}
