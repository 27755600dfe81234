//! Renderer contract and camera matrix construction

use glam::{Mat3, Mat4, Vec3};
use ndarray::Array3;
use rgbd_common::{GrayImageF32, Result, Size};

/// Triangle mesh of one object, in model space
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
}

/// Output of one render call: single-channel depth in scene depth units
/// (zero where background) and a camera-space unit-normal field (h, w, 3)
#[derive(Debug, Clone)]
pub struct RenderedPose {
    pub depth: GrayImageF32,
    pub normals: Array3<f32>,
}

impl RenderedPose {
    /// A render with no foreground pixels carries no pose information
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.depth.pixels().all(|p| p[0] <= 0.0)
    }
}

/// Contract the refiner renders through.
///
/// Implementations rasterize the mesh under the given model-view and
/// model-view-projection matrices into a `width`×`height` target clipped to
/// `[near, far]`. The refiner serialises calls; implementations may hold a
/// single-threaded GPU context.
pub trait PoseRenderer {
    fn render(
        &mut self,
        mesh: &Mesh,
        model_view: Mat4,
        model_view_projection: Mat4,
        width: u32,
        height: u32,
        near: f32,
        far: f32,
    ) -> Result<RenderedPose>;
}

/// View matrix from a model-to-camera rotation and translation, converted
/// from the CV camera convention (y down, z forward) to GL (y up, z back)
#[must_use]
pub fn view_matrix(r: Mat3, t: Vec3) -> Mat4 {
    let flip = Mat3::from_diagonal(Vec3::new(1.0, -1.0, -1.0));
    let r = flip * r;
    let t = flip * t;
    Mat4::from_cols(
        r.x_axis.extend(0.0),
        r.y_axis.extend(0.0),
        r.z_axis.extend(0.0),
        t.extend(1.0),
    )
}

/// Projection matrix from camera intrinsics for a `width`×`height` viewport
/// with its origin at `(x0, y0)`, y growing downwards
#[must_use]
pub fn projection_matrix(
    k: Mat3,
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    let fx = k.x_axis.x;
    let fy = k.y_axis.y;
    let cx = k.z_axis.x;
    let cy = k.z_axis.y;
    let skew = k.y_axis.x;

    let depth = far - near;
    let q = -(far + near) / depth;
    let qn = -2.0 * far * near / depth;

    // Rows of the projection, transposed below into glam's column-major form
    #[rustfmt::skip]
    let rows = [
        2.0 * fx / width, -2.0 * skew / width, (-2.0 * cx + width + 2.0 * x0) / width, 0.0,
        0.0,              2.0 * fy / height,   (2.0 * cy - height + 2.0 * y0) / height, 0.0,
        0.0,              0.0,                 q,                                       qn,
        0.0,              0.0,                 -1.0,                                    0.0,
    ];
    Mat4::from_cols_array(&rows).transpose()
}

#[must_use]
pub fn model_view(model: Mat4, view: Mat4) -> Mat4 {
    view * model
}

#[must_use]
pub fn model_view_projection(model: Mat4, view: Mat4, projection: Mat4) -> Mat4 {
    projection * view * model
}

/// Normal matrix of a model-view transform
#[must_use]
pub fn normal_matrix(model_view: Mat4) -> Mat4 {
    model_view.inverse().transpose()
}

/// Intrinsics rescaled from one viewport size to another (pose refinement
/// renders into the inflated match sub-image)
#[must_use]
pub fn rescale_k(k: Mat3, from: Size, to: Size) -> Mat3 {
    let sx = to.width as f32 / from.width as f32;
    let sy = to.height as f32 / from.height as f32;
    let mut out = k;
    out.x_axis.x *= sx;
    out.z_axis.x *= sx;
    out.y_axis.y *= sy;
    out.z_axis.y *= sy;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn view_matrix_flips_y_and_z() {
        let v = view_matrix(Mat3::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        let p = v * Vec4::new(1.0, 1.0, 1.0, 1.0);

        assert!((p.x - 2.0).abs() < 1e-6);
        assert!((p.y + 3.0).abs() < 1e-6);
        assert!((p.z + 4.0).abs() < 1e-6);
    }

    #[test]
    fn projection_centres_the_principal_point() {
        let k = Mat3::from_cols(
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(0.0, 500.0, 0.0),
            Vec3::new(50.0, 50.0, 1.0),
        );
        let p = projection_matrix(k, 0.0, 0.0, 100.0, 100.0, 10.0, 10_000.0);

        // A point on the optical axis projects to NDC (0, 0)
        let q = p * Vec4::new(0.0, 0.0, -1000.0, 1.0);
        assert!((q.x / q.w).abs() < 1e-4);
        assert!((q.y / q.w).abs() < 1e-4);

        // Depths between the planes land in [-1, 1]
        let z = q.z / q.w;
        assert!(z > -1.0 && z < 1.0);
    }

    #[test]
    fn rescale_k_scales_axes_independently() {
        let k = Mat3::from_cols(
            Vec3::new(400.0, 0.0, 0.0),
            Vec3::new(0.0, 600.0, 0.0),
            Vec3::new(40.0, 60.0, 1.0),
        );
        let out = rescale_k(k, Size::new(100, 200), Size::new(200, 100));

        assert!((out.x_axis.x - 800.0).abs() < 1e-4);
        assert!((out.z_axis.x - 80.0).abs() < 1e-4);
        assert!((out.y_axis.y - 300.0).abs() < 1e-4);
        assert!((out.z_axis.y - 30.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_render_detection() {
        let empty = RenderedPose {
            depth: GrayImageF32::new(8, 8),
            normals: Array3::zeros((8, 8, 3)),
        };
        assert!(empty.is_degenerate());

        let mut ok = empty.clone();
        ok.depth.put_pixel(3, 3, image::Luma([1000.0]));
        assert!(!ok.is_degenerate());
    }
}
