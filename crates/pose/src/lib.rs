//! Particle-swarm pose refinement
//!
//! Refines a 6-DoF pose offset on top of a matched template's stored camera
//! pose by comparing synthetic renders of the object mesh against the
//! observed depth, surface normals and edges. Rendering itself is behind the
//! [`PoseRenderer`] contract; any rasterizer producing metric depth and
//! camera-space normals works.
//!
//! The swarm draws its initial population from a 6-D Sobol sequence and runs
//! a standard velocity/position update; fitness multiplies depth-,
//! orientation- and silhouette-distance terms and is minimised.

mod particle;
mod refiner;
mod renderer;

pub use particle::{objective, pose_matrix, Particle, ParticleBest};
pub use refiner::{PoseRefiner, PsoParams, RefinedPose};
pub use renderer::{
    model_view, model_view_projection, normal_matrix, projection_matrix, rescale_k, view_matrix,
    Mesh, PoseRenderer, RenderedPose,
};
