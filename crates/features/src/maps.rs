//! Per-pixel feature maps derived from RGB-D imagery

use crate::quantize::{quantize_gradient, quantize_normal_slopes};
use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use ndarray::Array3;
use rgbd_common::{DepthImage, GrayImageF32};

const SOBEL_X: [i32; 9] = [-1, 0, 1, -2, 0, 2, -1, 0, 1];
const SOBEL_Y: [i32; 9] = [-1, -2, -1, 0, 0, 0, 1, 2, 1];

/// Fixed hue assigned to near-black pixels (blue on the 0..180 scale)
const HUE_BLACK: u8 = 120;
/// Fixed hue assigned to washed-out pixels (yellow on the 0..180 scale)
const HUE_WHITE: u8 = 30;
const VALUE_THRESHOLD: u8 = 30;
const SATURATION_THRESHOLD: u8 = 40;

/// Gray image normalized to [0, 1] from an RGB source (BT.601 weights)
#[must_use]
pub fn gray_f32(rgb: &RgbImage) -> GrayImageF32 {
    GrayImageF32::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        let luma =
            0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]);
        Luma([luma / 255.0])
    })
}

/// Sobel response magnitude of a gray image, noise-reduced with a small blur
#[must_use]
pub fn sobel_magnitude(src: &GrayImageF32) -> GrayImageF32 {
    let blurred = gaussian_blur_f32(src, 0.8);
    let (w, h) = blurred.dimensions();
    let mut dst = GrayImageF32::new(w, h);

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let (sx, sy) = sobel_at(&blurred, x, y);
            dst.put_pixel(x, y, Luma([(sx * sx + sy * sy).sqrt()]));
        }
    }
    dst
}

/// Gradient magnitude and orientation (degrees, [0, 360)) per pixel
#[must_use]
pub fn orientation_gradients(src: &GrayImageF32) -> (GrayImageF32, GrayImageF32) {
    let blurred = gaussian_blur_f32(src, 0.8);
    let (w, h) = blurred.dimensions();
    let mut magnitude = GrayImageF32::new(w, h);
    let mut angle = GrayImageF32::new(w, h);

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let (sx, sy) = sobel_at(&blurred, x, y);
            magnitude.put_pixel(x, y, Luma([(sx * sx + sy * sy).sqrt()]));
            angle.put_pixel(x, y, Luma([sy.atan2(sx).to_degrees().rem_euclid(360.0)]));
        }
    }
    (magnitude, angle)
}

fn sobel_at(src: &GrayImageF32, x: u32, y: u32) -> (f32, f32) {
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut i = 0;
    for yy in 0..3 {
        for xx in 0..3 {
            let px = src.get_pixel(x + xx - 1, y + yy - 1)[0];
            sx += px * SOBEL_X[i] as f32;
            sy += px * SOBEL_Y[i] as f32;
            i += 1;
        }
    }
    (sx, sy)
}

/// Quantized gradient orientations plus the magnitude map they were derived
/// from. Pixels below `min_magnitude` quantize to 0.
#[must_use]
pub fn quantized_gradients(gray: &GrayImageF32, min_magnitude: f32) -> (GrayImage, GrayImageF32) {
    let (magnitude, angle) = orientation_gradients(gray);
    let quantized = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if magnitude.get_pixel(x, y)[0] > min_magnitude {
            Luma([quantize_gradient(angle.get_pixel(x, y)[0])])
        } else {
            Luma([0])
        }
    });
    (quantized, magnitude)
}

/// Depth map smoothed for normal estimation
#[must_use]
pub fn smooth_depth(depth: &DepthImage) -> GrayImageF32 {
    let as_f32 = GrayImageF32::from_fn(depth.width(), depth.height(), |x, y| {
        Luma([f32::from(depth.get_pixel(x, y)[0])])
    });
    gaussian_blur_f32(&as_f32, 2.0)
}

/// Quantized surface normals and the raw unit-normal field.
///
/// The byte map holds one octant bit per defined pixel and 0 where the
/// normal is undefined: depth 0, depth beyond `max_depth`, or any 4-neighbour
/// missing or differing from the centre by more than `max_diff`.
#[must_use]
pub fn quantized_normals(
    depth: &DepthImage,
    max_depth: u16,
    max_diff: i32,
) -> (GrayImage, Array3<f32>) {
    let (w, h) = depth.dimensions();
    let smoothed = smooth_depth(depth);
    let mut codes = GrayImage::new(w, h);
    let mut field = Array3::<f32>::zeros((h as usize, w as usize, 3));

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let center = depth.get_pixel(x, y)[0];
            if center == 0 || center > max_depth {
                continue;
            }

            let neighbours = [
                depth.get_pixel(x - 1, y)[0],
                depth.get_pixel(x + 1, y)[0],
                depth.get_pixel(x, y - 1)[0],
                depth.get_pixel(x, y + 1)[0],
            ];
            let supported = neighbours.iter().all(|&n| {
                n != 0 && (i32::from(n) - i32::from(center)).abs() <= max_diff
            });
            if !supported {
                continue;
            }

            let dzdx =
                (smoothed.get_pixel(x + 1, y)[0] - smoothed.get_pixel(x - 1, y)[0]) / 2.0;
            let dzdy =
                (smoothed.get_pixel(x, y + 1)[0] - smoothed.get_pixel(x, y - 1)[0]) / 2.0;

            let norm = (dzdx * dzdx + dzdy * dzdy + 1.0).sqrt();
            let nx = -dzdx / norm;
            let ny = -dzdy / norm;
            let nz = 1.0 / norm;

            field[[y as usize, x as usize, 0]] = nx;
            field[[y as usize, x as usize, 1]] = ny;
            field[[y as usize, x as usize, 2]] = nz;
            codes.put_pixel(x, y, Luma([quantize_normal_slopes(nx, ny)]));
        }
    }
    (codes, field)
}

/// Binary (0/255) mask of depth discontinuities within the working depth
/// range. A pixel is an edgel when its depth lies in `[min_depth, max_depth]`
/// and the Sobel response of the depth map exceeds `min_mag`.
#[must_use]
pub fn depth_edgels(depth: &DepthImage, min_depth: u16, max_depth: u16, min_mag: i32) -> GrayImage {
    let (w, h) = depth.dimensions();
    let mut mask = GrayImage::new(w, h);
    let threshold = (min_mag.max(0) as f32).powi(2);

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let center = depth.get_pixel(x, y)[0];
            if center < min_depth || center > max_depth {
                continue;
            }

            let mut sx = 0i64;
            let mut sy = 0i64;
            let mut i = 0;
            for yy in 0..3 {
                for xx in 0..3 {
                    let px = i64::from(depth.get_pixel(x + xx - 1, y + yy - 1)[0]);
                    sx += px * i64::from(SOBEL_X[i]);
                    sy += px * i64::from(SOBEL_Y[i]);
                    i += 1;
                }
            }

            if (sx * sx + sy * sy) as f32 > threshold {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
    mask
}

/// Hue remap making black and white regions distinguishable in hue space:
/// dark pixels become blue, washed-out ones yellow, the rest pass through.
#[must_use]
pub fn remap_hue(h: u8, s: u8, v: u8) -> u8 {
    if v <= VALUE_THRESHOLD {
        HUE_BLACK
    } else if s < SATURATION_THRESHOLD {
        HUE_WHITE
    } else {
        h
    }
}

/// Remapped hue image (0..180 scale) from an RGB source
#[must_use]
pub fn rgb_to_hue(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        let (h, s, v) = rgb_to_hsv(p[0], p[1], p[2]);
        Luma([remap_hue(h, s, v)])
    })
}

/// RGB to HSV with hue on the 0..180 scale, saturation/value on 0..255
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = f32::from(r);
    let gf = f32::from(g);
    let bf = f32::from(b);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };

    let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };
    ((h / 2.0).round() as u8, s.round() as u8, max as u8)
}

/// Bitwise-OR of each pixel's `(2·patch_offset+1)²` neighbourhood.
///
/// Matching against a spread map tolerates misalignments up to
/// `patch_offset` pixels with a single bit-AND per probe.
#[must_use]
pub fn spread(src: &GrayImage, patch_offset: u32) -> GrayImage {
    let (w, h) = src.dimensions();
    let offset = patch_offset as i32;
    let mut dst = GrayImage::new(w, h);

    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let mut acc = 0u8;
            for dy in -offset..=offset {
                for dx in -offset..=offset {
                    let sx = x + dx;
                    let sy = y + dy;
                    if sx >= 0 && sy >= 0 && sx < w as i32 && sy < h as i32 {
                        acc |= src.get_pixel(sx as u32, sy as u32)[0];
                    }
                }
            }
            dst.put_pixel(x as u32, y as u32, Luma([acc]));
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sloped_depth(w: u32, h: u32) -> DepthImage {
        // Plane rising along x, well within support limits
        DepthImage::from_fn(w, h, |x, _| Luma([1000 + (x * 2) as u16]))
    }

    #[test]
    fn normals_have_at_most_one_bit() {
        let depth = sloped_depth(32, 32);
        let (codes, _) = quantized_normals(&depth, 5000, 100);
        for p in codes.pixels() {
            assert!(p[0].count_ones() <= 1);
        }
    }

    #[test]
    fn flat_plane_quantizes_to_one_octant() {
        let depth = sloped_depth(32, 32);
        let (codes, field) = quantized_normals(&depth, 5000, 100);

        let mut seen = std::collections::HashSet::new();
        for y in 2..30u32 {
            for x in 2..30u32 {
                let code = codes.get_pixel(x, y)[0];
                assert_ne!(code, 0);
                seen.insert(code);
                // Unit length
                let n = [
                    field[[y as usize, x as usize, 0]],
                    field[[y as usize, x as usize, 1]],
                    field[[y as usize, x as usize, 2]],
                ];
                let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
                assert!((len - 1.0).abs() < 1e-4);
            }
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn zero_depth_is_undefined() {
        let mut depth = sloped_depth(16, 16);
        depth.put_pixel(8, 8, Luma([0]));
        let (codes, _) = quantized_normals(&depth, 5000, 100);

        // The hole and its 4-neighbours lose their normals
        assert_eq!(codes.get_pixel(8, 8)[0], 0);
        assert_eq!(codes.get_pixel(7, 8)[0], 0);
        assert_eq!(codes.get_pixel(8, 7)[0], 0);
    }

    #[test]
    fn depth_step_breaks_support() {
        let mut depth = sloped_depth(16, 16);
        for y in 0..16 {
            for x in 8..16 {
                depth.put_pixel(x, y, Luma([3000]));
            }
        }
        let (codes, _) = quantized_normals(&depth, 5000, 100);
        // Pixels adjacent to the jump have no support
        assert_eq!(codes.get_pixel(8, 8)[0], 0);
        assert_eq!(codes.get_pixel(7, 8)[0], 0);
        // Far from the jump the plane is still defined
        assert_ne!(codes.get_pixel(3, 8)[0], 0);
    }

    #[test]
    fn edgels_mark_depth_discontinuities() {
        let mut depth = DepthImage::from_pixel(20, 20, Luma([1000]));
        for y in 0..20 {
            for x in 10..20 {
                depth.put_pixel(x, y, Luma([2000]));
            }
        }
        let mask = depth_edgels(&depth, 500, 5000, 300);

        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(3, 10)[0], 0);
        assert_eq!(mask.get_pixel(17, 10)[0], 0);
    }

    #[test]
    fn edgels_respect_depth_range() {
        let mut depth = DepthImage::from_pixel(20, 20, Luma([100]));
        for y in 0..20 {
            for x in 10..20 {
                depth.put_pixel(x, y, Luma([200]));
            }
        }
        // Discontinuity exists but both sides are below min_depth
        let mask = depth_edgels(&depth, 500, 5000, 50);
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn hue_remap_rules() {
        // Dark pixel becomes blue regardless of hue
        assert_eq!(remap_hue(77, 200, 10), 120);
        // Bright but unsaturated becomes yellow
        assert_eq!(remap_hue(77, 10, 200), 30);
        // Saturated and bright passes through
        assert_eq!(remap_hue(77, 200, 200), 77);
    }

    #[test]
    fn hue_of_pure_colors() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        let hue = rgb_to_hue(&rgb);

        assert_eq!(hue.get_pixel(0, 0)[0], 0);
        assert_eq!(hue.get_pixel(1, 0)[0], 60);
        assert_eq!(hue.get_pixel(2, 0)[0], 120);
    }

    #[test]
    fn spread_is_neighbourhood_or() {
        let mut src = GrayImage::new(9, 9);
        src.put_pixel(2, 2, Luma([1]));
        src.put_pixel(4, 4, Luma([4]));
        src.put_pixel(8, 8, Luma([16]));
        let dst = spread(&src, 2);

        let offset = 2i32;
        for y in 0..9i32 {
            for x in 0..9i32 {
                let mut expected = 0u8;
                for dy in -offset..=offset {
                    for dx in -offset..=offset {
                        let (sx, sy) = (x + dx, y + dy);
                        if sx >= 0 && sy >= 0 && sx < 9 && sy < 9 {
                            expected |= src.get_pixel(sx as u32, sy as u32)[0];
                        }
                    }
                }
                assert_eq!(dst.get_pixel(x as u32, y as u32)[0], expected);
            }
        }
    }

    #[test]
    fn quantized_gradients_filter_by_magnitude() {
        // Vertical step edge at x = 8
        let gray = GrayImageF32::from_fn(16, 16, |x, _| {
            Luma([if x < 8 { 0.0 } else { 1.0 }])
        });
        let (quantized, magnitudes) = quantized_gradients(&gray, 0.1);

        // On the edge: strong horizontal gradient, orientation bin 0
        assert_eq!(quantized.get_pixel(8, 8)[0], 1);
        assert!(magnitudes.get_pixel(8, 8)[0] > 0.1);
        // Flat areas are undefined
        assert_eq!(quantized.get_pixel(3, 8)[0], 0);
        for p in quantized.pixels() {
            assert!(p[0].count_ones() <= 1);
            assert!(p[0] <= 16);
        }
    }
}
