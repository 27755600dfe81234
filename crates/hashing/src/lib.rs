//! Randomized-triplet hashing index
//!
//! Maps per-window depth/normal quintuples to candidate templates. Each of
//! the `tables_count` hash tables owns one random triplet of grid positions;
//! a table's key quantizes the two relative depths (via per-table calibrated
//! bin ranges) and the three normal octants sampled at the triplet. At
//! detect time every admitted window polls all tables and keeps the
//! templates that collected at least `min_votes` votes.
//!
//! Tables reference templates by id only; they are built once over all
//! trained templates and never mutated afterwards.

mod hasher;
mod table;
mod triplet;

pub use hasher::Hasher;
pub use table::{BinRanges, HashKey, HashTable};
pub use triplet::{Triplet, TripletLayout};
