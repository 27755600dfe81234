//! Camera intrinsics and extrinsics at capture time

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole camera: intrinsic matrix `K`, model-to-camera rotation `R` and
/// translation `t`, plus the capture-ring metadata of the training rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Intrinsic matrix (column-major, `fx = k.x_axis.x`, `cx = k.z_axis.x`)
    pub k: Mat3,
    /// Rotation matrix R m2c
    pub r: Mat3,
    /// Translation vector t m2c
    pub t: Vec3,
    pub elev: i32,
    pub azimuth: i32,
    pub mode: i32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            k: Mat3::IDENTITY,
            r: Mat3::IDENTITY,
            t: Vec3::ZERO,
            elev: 0,
            azimuth: 0,
            mode: 0,
        }
    }
}

impl Camera {
    /// Build from row-major 3x3 `K`, row-major 3x3 `R` and 3-vector `t`
    #[must_use]
    pub fn from_rows(k: &[f32; 9], r: &[f32; 9], t: &[f32; 3]) -> Self {
        Self {
            k: Mat3::from_cols_array(k).transpose(),
            r: Mat3::from_cols_array(r).transpose(),
            t: Vec3::from_array(*t),
            elev: 0,
            azimuth: 0,
            mode: 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn fx(&self) -> f32 {
        self.k.x_axis.x
    }

    #[must_use]
    #[inline]
    pub fn fy(&self) -> f32 {
        self.k.y_axis.y
    }

    #[must_use]
    #[inline]
    pub fn cx(&self) -> f32 {
        self.k.z_axis.x
    }

    #[must_use]
    #[inline]
    pub fn cy(&self) -> f32 {
        self.k.z_axis.y
    }

    /// Intrinsics rescaled for a resized image (pyramid levels)
    #[must_use]
    pub fn rescaled(&self, scale: f32) -> Camera {
        let mut k = self.k;
        k.x_axis.x *= scale;
        k.y_axis.y *= scale;
        k.z_axis.x *= scale;
        k.z_axis.y *= scale;
        Camera { k, ..*self }
    }
}
