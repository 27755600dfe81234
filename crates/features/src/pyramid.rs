//! Scale pyramid over one RGB-D scene

use crate::maps::{depth_edgels, gray_f32, quantized_gradients, quantized_normals, rgb_to_hue};
use crate::spread;
use image::imageops::{resize, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::median_filter;
use ndarray::Array3;
use rayon::prelude::*;
use rgbd_common::{Camera, Criteria, DepthImage, GrayImageF32, Size};
use tracing::debug;

/// Raw scene inputs handed over by the orchestrator
#[derive(Debug, Clone)]
pub struct SceneSources {
    pub id: u32,
    pub rgb: RgbImage,
    pub depth: DepthImage,
    pub camera: Camera,
}

/// One pyramid level with every feature map the cascade reads
#[derive(Debug, Clone)]
pub struct SceneLevel {
    pub scale: f32,
    pub camera: Camera,
    pub gray: GrayImageF32,
    /// Remapped hue (0..180)
    pub hue: GrayImage,
    /// Depth divided by scale so values stay metric across levels
    pub depth: DepthImage,
    /// Quantized gradient orientations
    pub gradients: GrayImage,
    pub magnitudes: GrayImageF32,
    /// Quantized surface normals
    pub normals: GrayImage,
    /// Unit normal field (h, w, 3), zero where undefined
    pub normals_3d: Array3<f32>,
    pub spread_gradients: GrayImage,
    pub spread_normals: GrayImage,
    /// Depth-edgel mask for the objectness pre-filter
    pub edgels: GrayImage,
}

impl SceneLevel {
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.depth.width(), self.depth.height())
    }
}

/// Scale pyramid of one scene
#[derive(Debug, Clone)]
pub struct ScenePyramid {
    pub scene_id: u32,
    pub levels: Vec<SceneLevel>,
    /// Index of the unscaled level
    pub base_index: usize,
}

impl ScenePyramid {
    /// Build all levels; feature maps are materialised eagerly so detection
    /// stages only ever read.
    #[must_use]
    pub fn build(sources: &SceneSources, criteria: &Criteria) -> Self {
        let gray = gray_f32(&sources.rgb);
        let hue = rgb_to_hue(&sources.rgb);

        let levels: Vec<SceneLevel> = (0..criteria.pyramid_levels())
            .into_par_iter()
            .map(|level| {
                build_level(
                    criteria.level_scale(level),
                    &gray,
                    &hue,
                    &sources.depth,
                    &sources.camera,
                    criteria,
                )
            })
            .collect();

        debug!(
            scene = sources.id,
            levels = levels.len(),
            "scene pyramid built"
        );

        ScenePyramid {
            scene_id: sources.id,
            levels,
            base_index: criteria.pyramid_levels_down,
        }
    }

    /// The unscaled level (scale 1.0)
    #[must_use]
    pub fn base_level(&self) -> &SceneLevel {
        &self.levels[self.base_index]
    }
}

fn build_level(
    scale: f32,
    gray: &GrayImageF32,
    hue: &GrayImage,
    depth: &DepthImage,
    camera: &Camera,
    criteria: &Criteria,
) -> SceneLevel {
    let (gray, hue, depth) = if (scale - 1.0).abs() < f32::EPSILON {
        (gray.clone(), hue.clone(), depth.clone())
    } else {
        let w = (gray.width() as f32 * scale).round() as u32;
        let h = (gray.height() as f32 * scale).round() as u32;
        let resized_depth = resize(depth, w, h, FilterType::Triangle);
        // Dividing by scale keeps depth values metric at every level
        let rescaled_depth = DepthImage::from_fn(w, h, |x, y| {
            let v = f32::from(resized_depth.get_pixel(x, y)[0]) / scale;
            Luma([v.round().min(f32::from(u16::MAX)) as u16])
        });
        (
            resize(gray, w, h, FilterType::Triangle),
            resize(hue, w, h, FilterType::Triangle),
            rescaled_depth,
        )
    };

    let depth = median_filter(&depth, 2, 2);
    let camera = camera.rescaled(scale);

    let (gradients, magnitudes) = quantized_gradients(&gray, criteria.min_magnitude);
    let max_diff = (criteria.max_depth_diff as f32 / scale) as i32;
    let (normals, normals_3d) = quantized_normals(&depth, criteria.info.max_depth, max_diff);

    let spread_gradients = spread(&gradients, criteria.patch_offset);
    let spread_normals = spread(&normals, criteria.patch_offset);

    let edgels = depth_edgels(
        &depth,
        criteria.info.min_depth,
        criteria.info.max_depth,
        criteria.edgel_magnitude_threshold(),
    );

    SceneLevel {
        scale,
        camera,
        gray,
        hue,
        depth,
        gradients,
        magnitudes,
        normals,
        normals_3d,
        spread_gradients,
        spread_normals,
        edgels,
    }
}
