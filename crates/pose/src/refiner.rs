//! Particle-swarm refinement of matched poses

use crate::particle::{objective, pose_matrix, Particle, ParticleBest};
use crate::renderer::{
    model_view, model_view_projection, projection_matrix, rescale_k, view_matrix, Mesh,
    PoseRenderer,
};
use glam::{Mat3, Vec3};
use image::GrayImage;
use imageproc::edges::canny;
use ndarray::s;
use rand::rngs::StdRng;
use rand::Rng;
use rgbd_common::{DetectError, GrayImageF32, Match, Result, Template};
use rgbd_features::SceneLevel;
use tracing::debug;

/// Swarm configuration
#[derive(Debug, Clone, Copy)]
pub struct PsoParams {
    pub particles: usize,
    pub iterations: usize,
    /// Inertia weight
    pub w: f32,
    /// Cognitive acceleration
    pub c1: f32,
    /// Social acceleration
    pub c2: f32,
    /// Pixels added around the match box before refinement
    pub bb_margin: i32,
    pub near: f32,
    pub far: f32,
}

impl Default for PsoParams {
    fn default() -> Self {
        Self {
            particles: 100,
            iterations: 100,
            w: 0.85,
            c1: 0.2,
            c2: 0.2,
            bb_margin: 15,
            near: 10.0,
            far: 65_535.0,
        }
    }
}

/// Refined 6-DoF pose of one match: the optimised offset and the resulting
/// model-to-camera rotation/translation on the template's camera
#[derive(Debug, Clone)]
pub struct RefinedPose {
    pub template_id: u32,
    pub obj_id: u32,
    pub pose_offset: [f32; 6],
    pub rotation: Mat3,
    pub translation: Vec3,
    pub fitness: f32,
}

/// Runs the swarm for surviving matches. Render calls go through a single
/// renderer handle and are serialised.
pub struct PoseRefiner {
    params: PsoParams,
}

impl Default for PoseRefiner {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseRefiner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: PsoParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(params: PsoParams) -> Self {
        Self { params }
    }

    /// Refine one match against the scene level it was found in (bounding
    /// box in that level's coordinates).
    ///
    /// Fails with `RendererFailure` only when every particle of the initial
    /// population renders degenerately; individual bad renders just poison
    /// that particle's fitness.
    pub fn refine(
        &self,
        renderer: &mut dyn PoseRenderer,
        mesh: &Mesh,
        found: &Match,
        template: &Template,
        level: &SceneLevel,
        rng: &mut StdRng,
    ) -> Result<RefinedPose> {
        let bb = found.obj_bb.inflated(self.params.bb_margin, level.size());
        if bb.area() == 0 {
            return Err(DetectError::InvariantViolated(
                "match bounding box has no area".into(),
            ));
        }
        let (w, h) = (bb.width, bb.height);
        let (x0, y0) = (bb.x as u32, bb.y as u32);

        // Observed triplet: depth, 3-D normals and edges of the sub-image
        let gt_depth = GrayImageF32::from_fn(w, h, |x, y| {
            image::Luma([f32::from(level.depth.get_pixel(x0 + x, y0 + y)[0])])
        });
        let gt_normals = level
            .normals_3d
            .slice(s![
                y0 as usize..(y0 + h) as usize,
                x0 as usize..(x0 + w) as usize,
                ..
            ])
            .to_owned();
        let gray_u8 = GrayImage::from_fn(w, h, |x, y| {
            image::Luma([(level.gray.get_pixel(x0 + x, y0 + y)[0] * 255.0) as u8])
        });
        let gt_edges = canny(&gray_u8, 80.0, 120.0);

        // Camera for the sub-image
        let k = rescale_k(template.camera.k, template.obj_bb.size(), bb.size());
        let view = view_matrix(template.camera.r, template.camera.t);
        let projection = projection_matrix(
            k,
            0.0,
            0.0,
            w as f32,
            h as f32,
            self.params.near,
            self.params.far,
        );

        let evaluate = |particle: &Particle, renderer: &mut dyn PoseRenderer| -> f32 {
            let model = particle.model_matrix();
            let mv = model_view(model, view);
            let mvp = model_view_projection(model, view, projection);
            match renderer.render(mesh, mv, mvp, w, h, self.params.near, self.params.far) {
                Ok(rendered) if !rendered.is_degenerate() => {
                    objective(&gt_depth, &gt_normals, &gt_edges, &rendered)
                }
                _ => f32::INFINITY,
            }
        };

        // Quasi-random initial population
        let mut particles = self.population(rng);
        let mut g_best = ParticleBest {
            pose: [0.0; 6],
            velocity: [0.0; 6],
            fitness: f32::INFINITY,
        };
        for particle in &mut particles {
            particle.fitness = evaluate(particle, renderer);
            particle.update_best();
            if particle.best.fitness < g_best.fitness {
                g_best = particle.best;
            }
        }
        if g_best.fitness.is_infinite() {
            return Err(DetectError::RendererFailure(format!(
                "all {} initial renders degenerate for template {}",
                particles.len(),
                template.id
            )));
        }

        for _ in 0..self.params.iterations {
            for particle in &mut particles {
                let attractor = g_best.pose;
                particle.advance(self.params.w, self.params.c1, self.params.c2, &attractor);
                particle.fitness = evaluate(particle, renderer);
                if particle.fitness < particle.best.fitness {
                    particle.update_best();
                }
                if particle.best.fitness < g_best.fitness {
                    g_best = particle.best;
                }
            }
        }

        debug!(
            template = template.id,
            fitness = g_best.fitness,
            "pose refined"
        );

        // Compose the offset into the template camera and convert the
        // model-view back out of the GL convention
        let mv = model_view(pose_matrix(&g_best.pose), view);
        let flip = Mat3::from_diagonal(Vec3::new(1.0, -1.0, -1.0));
        let rotation = flip * Mat3::from_mat4(mv);
        let translation = flip * mv.w_axis.truncate();

        Ok(RefinedPose {
            template_id: found.template_id,
            obj_id: found.obj_id,
            pose_offset: g_best.pose,
            rotation,
            translation,
            fitness: g_best.fitness,
        })
    }

    /// Initial swarm: positions from a 6-D Sobol sequence scaled to tens of
    /// millimetres / fractions of a radian, velocities uniform and modest
    fn population(&self, rng: &mut StdRng) -> Vec<Particle> {
        let sobol_seed: u32 = rng.gen();
        (0..self.params.particles)
            .map(|i| {
                let q =
                    |d: u32| sobol_burley::sample(i as u32, d, sobol_seed);
                let pose = [
                    (q(0) - 0.5) * 50.0,
                    (q(1) - 0.5) * 50.0,
                    (q(2) - 0.8) * 200.0,
                    q(3) - 0.5,
                    q(4) - 0.5,
                    q(5) - 0.5,
                ];
                let velocity = [
                    rng.gen::<f32>() * 20.0,
                    rng.gen::<f32>() * 20.0,
                    rng.gen::<f32>() * 40.0,
                    rng.gen::<f32>() * 0.2,
                    rng.gen::<f32>() * 0.2,
                    rng.gen::<f32>() * 0.2,
                ];
                Particle::new(pose, velocity, rng.gen())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderedPose;
    use glam::Mat4;
    use image::Luma;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rgbd_common::{BoundingBox, Camera, DepthImage};
    use rgbd_features::{quantized_gradients, quantized_normals, spread};

    const SIDE: u32 = 64;

    fn test_level() -> SceneLevel {
        let gray = rgbd_common::GrayImageF32::from_fn(SIDE, SIDE, |x, _| {
            Luma([if (x / 4) % 2 == 0 { 0.1 } else { 0.9 }])
        });
        let depth = DepthImage::from_pixel(SIDE, SIDE, Luma([1000]));
        let (gradients, magnitudes) = quantized_gradients(&gray, 0.1);
        let (normals, normals_3d) = quantized_normals(&depth, u16::MAX, 100);

        SceneLevel {
            scale: 1.0,
            camera: Camera::default(),
            hue: GrayImage::from_pixel(SIDE, SIDE, Luma([90])),
            spread_gradients: spread(&gradients, 2),
            spread_normals: spread(&normals, 2),
            edgels: GrayImage::new(SIDE, SIDE),
            gray,
            depth,
            gradients,
            magnitudes,
            normals,
            normals_3d,
        }
    }

    fn test_match() -> Match {
        Match {
            template_id: 1,
            obj_id: 1,
            obj_bb: BoundingBox::new(20, 20, 16, 16),
            scale: 1.0,
            score: 0.9,
            sub_scores: [0; 5],
        }
    }

    fn test_template() -> Template {
        Template {
            id: 1,
            obj_id: 1,
            obj_bb: BoundingBox::new(0, 0, 16, 16),
            camera: Camera::from_rows(
                &[500.0, 0.0, 8.0, 0.0, 500.0, 8.0, 0.0, 0.0, 1.0],
                &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                &[0.0, 0.0, 1000.0],
            ),
            ..Template::default()
        }
    }

    fn small_params() -> PsoParams {
        PsoParams {
            particles: 10,
            iterations: 5,
            bb_margin: 4,
            ..PsoParams::default()
        }
    }

    /// Stand-in rasterizer: a square object whose depth drifts with the
    /// model-view's distance from a target transform
    struct MockRenderer {
        target: Mat4,
    }

    impl PoseRenderer for MockRenderer {
        fn render(
            &mut self,
            _mesh: &Mesh,
            mv: Mat4,
            _mvp: Mat4,
            width: u32,
            height: u32,
            _near: f32,
            _far: f32,
        ) -> Result<RenderedPose> {
            let drift = (mv.w_axis.truncate() - self.target.w_axis.truncate()).length();
            let depth_value = 1000.0 + drift;

            let mut normals = Array3::zeros((height as usize, width as usize, 3));
            let inside = |x: u32, y: u32| {
                x >= width / 4 && x < width - width / 4 && y >= height / 4 && y < height - height / 4
            };
            for y in 0..height {
                for x in 0..width {
                    if inside(x, y) {
                        normals[[y as usize, x as usize, 2]] = 1.0;
                    }
                }
            }
            Ok(RenderedPose {
                depth: rgbd_common::GrayImageF32::from_fn(width, height, |x, y| {
                    Luma([if inside(x, y) { depth_value } else { 0.0 }])
                }),
                normals,
            })
        }
    }

    struct FailingRenderer;

    impl PoseRenderer for FailingRenderer {
        fn render(
            &mut self,
            _mesh: &Mesh,
            _mv: Mat4,
            _mvp: Mat4,
            _width: u32,
            _height: u32,
            _near: f32,
            _far: f32,
        ) -> Result<RenderedPose> {
            Err(DetectError::RendererFailure("no context".into()))
        }
    }

    #[test]
    fn refinement_returns_a_finite_pose() {
        let refiner = PoseRefiner::with_params(small_params());
        let level = test_level();
        let template = test_template();
        let view = view_matrix(template.camera.r, template.camera.t);
        let mut renderer = MockRenderer {
            target: view * pose_matrix(&[2.0, -3.0, 5.0, 0.0, 0.0, 0.0]),
        };
        let mut rng = StdRng::seed_from_u64(1);

        let refined = refiner
            .refine(
                &mut renderer,
                &Mesh::default(),
                &test_match(),
                &template,
                &level,
                &mut rng,
            )
            .unwrap();

        assert!(refined.fitness.is_finite());
        assert!(refined.fitness < 0.0);
        assert_eq!(refined.template_id, 1);
        assert!(refined.pose_offset.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn refinement_is_deterministic_under_seed() {
        let refiner = PoseRefiner::with_params(small_params());
        let level = test_level();
        let template = test_template();
        let view = view_matrix(template.camera.r, template.camera.t);

        let run = || {
            let mut renderer = MockRenderer {
                target: view * pose_matrix(&[2.0, -3.0, 5.0, 0.0, 0.0, 0.0]),
            };
            let mut rng = StdRng::seed_from_u64(99);
            refiner
                .refine(
                    &mut renderer,
                    &Mesh::default(),
                    &test_match(),
                    &template,
                    &level,
                    &mut rng,
                )
                .unwrap()
        };

        let a = run();
        let b = run();
        assert_eq!(a.pose_offset, b.pose_offset);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn total_renderer_failure_is_surfaced() {
        let refiner = PoseRefiner::with_params(small_params());
        let level = test_level();
        let template = test_template();
        let mut rng = StdRng::seed_from_u64(1);

        let result = refiner.refine(
            &mut FailingRenderer,
            &Mesh::default(),
            &test_match(),
            &template,
            &level,
            &mut rng,
        );
        assert!(matches!(result, Err(DetectError::RendererFailure(_))));
    }
}
