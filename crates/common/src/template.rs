//! Trained templates and the id-keyed store that owns them

use crate::camera::Camera;
use crate::geometry::{BoundingBox, Point};
use crate::{DepthImage, GrayImageF32};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-point matching features extracted at training time.
///
/// All vectors have the template's feature-point count N; `gradients` is
/// indexed by edge point, the rest by stable point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateFeatures {
    /// Median over the non-zero stable-point depths
    pub depth_median: u16,
    /// Quantized gradient codes at edge points
    pub gradients: Vec<u8>,
    /// Quantized normal codes at stable points
    pub normals: Vec<u8>,
    /// Raw depth samples at stable points
    pub depths: Vec<u16>,
    /// Remapped hue samples at stable points
    pub hues: Vec<u8>,
}

/// One trained view of an object.
///
/// Immutable once training finishes; feature-point coordinates are relative
/// to `obj_bb`'s top-left corner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique id across all trained objects
    pub id: u32,
    pub obj_id: u32,
    pub file_name: String,
    /// Object diameter in object units (mm)
    pub diameter: f32,
    pub resize_ratio: f32,
    pub obj_bb: BoundingBox,
    pub camera: Camera,
    /// Depth extremes of the object within this view
    pub min_depth: u16,
    pub max_depth: u16,
    /// Area the object covers relative to its window
    pub obj_area: f32,
    pub edge_points: Vec<Point>,
    pub stable_points: Vec<Point>,
    pub features: TemplateFeatures,
}

/// Source imagery and feature maps of a template during training.
///
/// Not persisted; the hasher and the feature extractor read from these while
/// the training pass is alive.
#[derive(Debug, Clone)]
pub struct TemplateSources {
    pub gray: GrayImageF32,
    pub hue: GrayImage,
    pub depth: DepthImage,
    /// Quantized gradient orientations
    pub gradients: GrayImage,
    /// Gradient magnitudes matching `gradients`
    pub magnitudes: GrayImageF32,
    /// Quantized surface normals
    pub normals: GrayImage,
}

/// Arena of templates keyed by id.
///
/// Hash tables, windows and matches store ids into this arena instead of
/// references, which keeps persistence trivial and sharing across worker
/// threads free.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: Vec<Template>,
    by_id: HashMap<u32, usize>,
}

impl TemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: Template) {
        self.by_id.insert(template.id, self.templates.len());
        self.templates.push(template);
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Template> {
        self.by_id.get(&id).map(|&i| &self.templates[i])
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }
}
