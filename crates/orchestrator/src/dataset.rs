//! Dataset parsing: per-object template roots and RGB-D scenes
//!
//! An object root holds `rgb/NNNN.png`, `depth/NNNN.png`, an `info.yml`
//! listing the template records and a `gt.yml` with ground-truth boxes (the
//! evaluation harness reads the latter; training only checks it exists).

use image::GrayImage;
use imageproc::filter::median_filter;
use rgbd_common::{BoundingBox, Camera, Criteria, DetectError, Result, Template, TemplateSources};
use rgbd_features::{
    depth_edgels, gray_f32, quantized_gradients, quantized_normals, rgb_to_hue, SceneSources,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// One template entry of an object's `info.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: u32,
    pub obj_id: u32,
    pub file_name: String,
    pub diameter: f32,
    #[serde(default = "default_resize_ratio")]
    pub resize_ratio: f32,
    pub obj_bb: BoundingBox,
    pub min_depth: u16,
    pub max_depth: u16,
    #[serde(default)]
    pub obj_area: f32,
    pub camera: CameraRecord,
}

fn default_resize_ratio() -> f32 {
    1.0
}

/// Camera block of a template or scene record (row-major matrices)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRecord {
    pub k: [f32; 9],
    pub r: [f32; 9],
    pub t: [f32; 3],
    #[serde(default)]
    pub elev: i32,
    #[serde(default)]
    pub azimuth: i32,
    #[serde(default)]
    pub mode: i32,
}

impl CameraRecord {
    fn to_camera(&self) -> Camera {
        let mut camera = Camera::from_rows(&self.k, &self.r, &self.t);
        camera.elev = self.elev;
        camera.azimuth = self.azimuth;
        camera.mode = self.mode;
        camera
    }
}

#[derive(Debug, Deserialize)]
struct ObjectInfoFile {
    templates: Vec<TemplateRecord>,
}

/// Scene entry of a scene directory's `info.yml`, keyed `scene_N`
#[derive(Debug, Clone, Deserialize)]
struct SceneInfoRecord {
    #[serde(rename = "cam_K")]
    cam_k: [f32; 9],
    #[serde(rename = "cam_R_w2c")]
    cam_r: [f32; 9],
    #[serde(rename = "cam_t_w2c")]
    cam_t: [f32; 3],
    #[serde(default)]
    elev: i32,
    #[serde(default)]
    mode: i32,
}

/// Parse one object root: load every template's imagery, derive its feature
/// maps and fold the object's statistics into the criteria.
///
/// Global template ids are assigned sequentially from `next_id`. `indices`
/// restricts parsing to the listed per-view record ids.
pub fn parse_object(
    root: &Path,
    criteria: &mut Criteria,
    indices: Option<&[u32]>,
    next_id: &mut u32,
) -> Result<Vec<(Template, TemplateSources)>> {
    let info_path = root.join("info.yml");
    if !info_path.exists() {
        return Err(DetectError::InputMissing(info_path));
    }
    let gt_path = root.join("gt.yml");
    if !gt_path.exists() {
        return Err(DetectError::InputMissing(gt_path));
    }

    let info: ObjectInfoFile = serde_yaml::from_str(&std::fs::read_to_string(&info_path)?)
        .map_err(|e| DetectError::Persistence(format!("{}: {e}", info_path.display())))?;

    let mut out = Vec::new();
    let mut object_edgels: Vec<u32> = Vec::new();

    for record in &info.templates {
        if let Some(wanted) = indices {
            if !wanted.contains(&record.id) {
                continue;
            }
        }

        let (template, sources, edgels_in_box) =
            parse_template(root, record, criteria, *next_id)?;
        *next_id += 1;

        update_statistics(criteria, &template);
        object_edgels.push(edgels_in_box);
        out.push((template, sources));
    }

    if out.is_empty() {
        return Err(DetectError::InvariantViolated(format!(
            "object root {} produced no templates",
            root.display()
        )));
    }

    // Fold the smallest trustworthy edgel count into the criteria
    remove_outliers(&mut object_edgels, 2.0);
    if let Some(&min) = object_edgels.iter().filter(|&&e| e > 0).min() {
        if min < criteria.info.min_edgels {
            criteria.info.min_edgels = min;
        }
    }

    info!(
        root = %root.display(),
        templates = out.len(),
        "object templates parsed"
    );
    Ok(out)
}

fn parse_template(
    root: &Path,
    record: &TemplateRecord,
    criteria: &Criteria,
    id: u32,
) -> Result<(Template, TemplateSources, u32)> {
    let rgb_path = root.join("rgb").join(format!("{}.png", record.file_name));
    let depth_path = root.join("depth").join(format!("{}.png", record.file_name));
    if !rgb_path.exists() {
        return Err(DetectError::InputMissing(rgb_path));
    }
    if !depth_path.exists() {
        return Err(DetectError::InputMissing(depth_path));
    }

    let rgb = image::open(&rgb_path)?.to_rgb8();
    let depth = image::open(&depth_path)?.to_luma16();
    let depth = median_filter(&depth, 2, 2);

    let gray = gray_f32(&rgb);
    let hue = rgb_to_hue(&rgb);
    let (gradients, magnitudes) = quantized_gradients(&gray, criteria.min_magnitude);
    let max_diff = (criteria.max_depth_diff as f32 / record.resize_ratio) as i32;
    let (normals, _) = quantized_normals(&depth, record.max_depth, max_diff);

    // Edgel count inside the object box feeds the objectness statistics
    let edgel_threshold = (criteria.objectness_diameter_threshold
        * record.diameter
        * criteria.info.depth_scale_factor) as i32;
    let edgel_mask = depth_edgels(
        &depth,
        record.min_depth.saturating_sub(1000),
        record.max_depth.saturating_add(1000),
        edgel_threshold,
    );
    let edgels_in_box = count_in_box(&edgel_mask, record.obj_bb);

    let template = Template {
        id,
        obj_id: record.obj_id,
        file_name: record.file_name.clone(),
        diameter: record.diameter,
        resize_ratio: record.resize_ratio,
        obj_bb: record.obj_bb,
        camera: record.camera.to_camera(),
        min_depth: record.min_depth,
        max_depth: record.max_depth,
        obj_area: record.obj_area,
        edge_points: Vec::new(),
        stable_points: Vec::new(),
        features: Default::default(),
    };
    let sources = TemplateSources {
        gray,
        hue,
        depth,
        gradients,
        magnitudes,
        normals,
    };

    debug!(template = id, file = %record.file_name, "template parsed");
    Ok((template, sources, edgels_in_box))
}

fn update_statistics(criteria: &mut Criteria, template: &Template) {
    let info = &mut criteria.info;
    let bb = template.obj_bb;

    if bb.area() < info.smallest_template.area() {
        info.smallest_template = bb.size();
    }
    if bb.width > info.largest_template.width {
        info.largest_template.width = bb.width;
    }
    if bb.height > info.largest_template.height {
        info.largest_template.height = bb.height;
    }

    // Widen the working depth range a little beyond the observed extremes
    let widened_max = (f32::from(template.max_depth) * 1.1) as u16;
    let widened_min = (f32::from(template.min_depth) * 0.9) as u16;
    if widened_max > info.max_depth {
        info.max_depth = widened_max;
    }
    if widened_min < info.min_depth {
        info.min_depth = widened_min;
    }

    if template.diameter < info.smallest_diameter {
        info.smallest_diameter = template.diameter;
    }
}

fn count_in_box(mask: &GrayImage, bb: BoundingBox) -> u32 {
    let (w, h) = mask.dimensions();
    let x0 = bb.x.max(0) as u32;
    let y0 = bb.y.max(0) as u32;
    let x1 = ((bb.x + bb.width as i32) as u32).min(w);
    let y1 = ((bb.y + bb.height as i32) as u32).min(h);

    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            if mask.get_pixel(x, y)[0] != 0 {
                count += 1;
            }
        }
    }
    count
}

/// Drop values farther than `sigmas` standard deviations from the mean
fn remove_outliers(values: &mut Vec<u32>, sigmas: f32) {
    if values.len() < 3 {
        return;
    }
    let mean = values.iter().sum::<u32>() as f32 / values.len() as f32;
    let variance = values
        .iter()
        .map(|&v| (v as f32 - mean).powi(2))
        .sum::<f32>()
        / values.len() as f32;
    let sd = variance.sqrt();
    values.retain(|&v| (v as f32 - mean).abs() <= sigmas * sd);
}

/// Parse one scene's RGB-D pair and camera
pub fn parse_scene(scene_dir: &Path, index: u32) -> Result<SceneSources> {
    let rgb_path = scene_dir.join("rgb").join(format!("{index:04}.png"));
    let depth_path = scene_dir.join("depth").join(format!("{index:04}.png"));
    if !rgb_path.exists() {
        return Err(DetectError::InputMissing(rgb_path));
    }
    if !depth_path.exists() {
        return Err(DetectError::InputMissing(depth_path));
    }

    let rgb = image::open(&rgb_path)?.to_rgb8();
    let depth = image::open(&depth_path)?.to_luma16();

    let info_path = scene_dir.join("info.yml");
    let camera = if info_path.exists() {
        let records: HashMap<String, SceneInfoRecord> =
            serde_yaml::from_str(&std::fs::read_to_string(&info_path)?)
                .map_err(|e| DetectError::Persistence(format!("{}: {e}", info_path.display())))?;
        match records.get(&format!("scene_{index}")) {
            Some(r) => {
                let mut camera = Camera::from_rows(&r.cam_k, &r.cam_r, &r.cam_t);
                camera.elev = r.elev;
                camera.mode = r.mode;
                camera
            }
            None => Camera::default(),
        }
    } else {
        Camera::default()
    };

    Ok(SceneSources {
        id: index,
        rgb,
        depth,
        camera,
    })
}

/// Scene indices found on disk, sorted ascending
pub fn discover_scene_indices(scene_dir: &Path) -> Result<Vec<u32>> {
    let rgb_dir = scene_dir.join("rgb");
    if !rgb_dir.exists() {
        return Err(DetectError::InputMissing(rgb_dir));
    }

    let mut indices = Vec::new();
    for entry in std::fs::read_dir(&rgb_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(".png") {
            if let Ok(index) = stem.parse::<u32>() {
                indices.push(index);
            }
        }
    }
    indices.sort_unstable();
    Ok(indices)
}
