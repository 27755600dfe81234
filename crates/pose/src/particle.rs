//! Swarm particles and the render-comparison objective

use crate::renderer::RenderedPose;
use glam::{Mat4, Vec3};
use image::GrayImage;
use imageproc::distance_transform::euclidean_squared_distance_transform;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rgbd_common::GrayImageF32;

/// Depth differences above this tolerance contribute only vanishingly
const DEPTH_TOLERANCE: f32 = 10.0;
const VANISHING: f32 = 1.0 / f32::MAX;

/// Best pose a particle has visited
#[derive(Debug, Clone, Copy)]
pub struct ParticleBest {
    pub pose: [f32; 6],
    pub velocity: [f32; 6],
    pub fitness: f32,
}

/// One swarm member: a 6-vector pose offset `(tx, ty, tz, rx, ry, rz)`, its
/// velocity, the current fitness and the per-particle best record.
///
/// Every particle owns its generator so its sequence of update draws stays
/// reproducible independently of the rest of the swarm.
#[derive(Debug, Clone)]
pub struct Particle {
    pub pose: [f32; 6],
    pub velocity: [f32; 6],
    pub fitness: f32,
    pub best: ParticleBest,
    rng: StdRng,
}

impl Particle {
    #[must_use]
    pub fn new(pose: [f32; 6], velocity: [f32; 6], seed: u64) -> Self {
        Self {
            pose,
            velocity,
            fitness: f32::INFINITY,
            best: ParticleBest {
                pose,
                velocity,
                fitness: f32::INFINITY,
            },
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Model matrix of the pose offset
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        pose_matrix(&self.pose)
    }

    /// Record the current position as the particle's best
    pub fn update_best(&mut self) {
        self.best = ParticleBest {
            pose: self.pose,
            velocity: self.velocity,
            fitness: self.fitness,
        };
    }

    /// One PSO step: `v ← w·v + c1·r1·(pBest − x) + c2·r2·(gBest − x)`,
    /// then `x ← x + v`, with fresh draws per dimension from the particle's
    /// own generator
    pub fn advance(&mut self, w: f32, c1: f32, c2: f32, g_best: &[f32; 6]) {
        for i in 0..6 {
            let r1: f32 = self.rng.gen();
            let r2: f32 = self.rng.gen();
            self.velocity[i] = w * self.velocity[i]
                + c1 * r1 * (self.best.pose[i] - self.pose[i])
                + c2 * r2 * (g_best[i] - self.pose[i]);
        }
        for i in 0..6 {
            self.pose[i] += self.velocity[i];
        }
    }
}

/// Model matrix of a 6-vector pose offset: rotations about x, y, z applied
/// to a translation
#[must_use]
pub fn pose_matrix(pose: &[f32; 6]) -> Mat4 {
    let [tx, ty, tz, rx, ry, rz] = *pose;
    let rotation =
        Mat4::from_rotation_x(rx) * Mat4::from_rotation_y(ry) * Mat4::from_rotation_z(rz);
    rotation * Mat4::from_translation(Vec3::new(tx, ty, tz))
}

/// Fitness of a rendered pose against the observed sub-image.
///
/// Three accumulators run over all pixels: depth agreement (`sum_d`),
/// surface-orientation agreement (`sum_u`) and silhouette distance
/// (`sum_e`, over the distance transform of the rendered edge image).
/// Fitness is `−sum_d · sum_u · sum_e`; lower is better.
#[must_use]
pub fn objective(
    gt_depth: &GrayImageF32,
    gt_normals: &Array3<f32>,
    gt_edges: &GrayImage,
    rendered: &RenderedPose,
) -> f32 {
    let (w, h) = gt_depth.dimensions();
    let edge_dt = silhouette_distance(&rendered.depth);

    let mut sum_d = 0.0f32;
    let mut sum_u = 0.0f32;
    let mut sum_e = 0.0f32;

    for y in 0..h {
        for x in 0..w {
            if gt_edges.get_pixel(x, y)[0] > 0 {
                sum_e += 1.0 / (edge_dt.get_pixel(x, y)[0] as f32 + 1.0);
            }

            let pose_depth = rendered.depth.get_pixel(x, y)[0];
            if pose_depth <= 0.0 {
                continue;
            }

            let depth_diff = (gt_depth.get_pixel(x, y)[0] - pose_depth).abs();
            if depth_diff > DEPTH_TOLERANCE {
                sum_d += VANISHING;
            } else {
                sum_d += 1.0 / (depth_diff + 1.0);
            }

            let (yi, xi) = (y as usize, x as usize);
            let dot = gt_normals[[yi, xi, 0]] * rendered.normals[[yi, xi, 0]]
                + gt_normals[[yi, xi, 1]] * rendered.normals[[yi, xi, 1]]
                + gt_normals[[yi, xi, 2]] * rendered.normals[[yi, xi, 2]];
            let dot = dot.abs();
            sum_u += if dot.is_nan() {
                VANISHING
            } else {
                1.0 / (dot + 1.0)
            };
        }
    }

    -sum_d * sum_u * sum_e
}

/// Distance transform of the rendered silhouette's edges: per pixel, the
/// distance to the nearest depth discontinuity of the render
fn silhouette_distance(pose_depth: &GrayImageF32) -> image::ImageBuffer<image::Luma<f64>, Vec<f64>> {
    let (w, h) = pose_depth.dimensions();
    let mut edges = GrayImage::new(w, h);

    // Laplacian response of the rendered depth marks the silhouette
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let c = pose_depth.get_pixel(x, y)[0];
            let lap = 4.0 * c
                - pose_depth.get_pixel(x - 1, y)[0]
                - pose_depth.get_pixel(x + 1, y)[0]
                - pose_depth.get_pixel(x, y - 1)[0]
                - pose_depth.get_pixel(x, y + 1)[0];
            if lap.abs() > 0.5 {
                edges.put_pixel(x, y, image::Luma([255]));
            }
        }
    }

    let squared = euclidean_squared_distance_transform(&edges);
    image::ImageBuffer::from_fn(w, h, |x, y| {
        image::Luma([squared.get_pixel(x, y)[0].sqrt()])
    })
}
