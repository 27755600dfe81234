//! Sliding-window objectness over the depth-edgel mask

use image::GrayImage;
use ndarray::Array2;
use rgbd_common::{Criteria, Window};
use tracing::debug;

/// Slide a largest-template-sized window over the edgel mask and admit
/// positions holding at least `objectness_factor × min_edgels` set pixels.
///
/// Counts use an integral image so each window costs four lookups. Admitted
/// windows leave with empty candidate lists; hashing verification fills
/// them.
#[must_use]
pub fn find_windows(edgels: &GrayImage, criteria: &Criteria) -> Vec<Window> {
    let (w, h) = edgels.dimensions();
    let win_w = criteria.info.largest_template.width;
    let win_h = criteria.info.largest_template.height;
    if win_w == 0 || win_h == 0 || win_w > w || win_h > h {
        return Vec::new();
    }

    let integral = integral_image(edgels);
    let min_count = criteria.objectness_factor * criteria.info.min_edgels as f32;
    let step = criteria.window_step.max(1) as usize;

    let mut windows = Vec::new();
    for y in (0..=(h - win_h) as usize).step_by(step) {
        for x in (0..=(w - win_w) as usize).step_by(step) {
            let count = window_sum(&integral, x, y, win_w as usize, win_h as usize);
            if count as f32 >= min_count {
                windows.push(Window::new(x as i32, y as i32, win_w, win_h, count));
            }
        }
    }

    debug!(windows = windows.len(), "objectness admitted windows");
    windows
}

/// Summed-area table with a zero top row and left column
fn integral_image(mask: &GrayImage) -> Array2<u32> {
    let (w, h) = mask.dimensions();
    let mut integral = Array2::<u32>::zeros((h as usize + 1, w as usize + 1));

    for y in 0..h as usize {
        let mut row_sum = 0u32;
        for x in 0..w as usize {
            if mask.get_pixel(x as u32, y as u32)[0] != 0 {
                row_sum += 1;
            }
            integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
        }
    }
    integral
}

#[inline]
fn window_sum(integral: &Array2<u32>, x: usize, y: usize, w: usize, h: usize) -> u32 {
    integral[[y + h, x + w]] + integral[[y, x]] - integral[[y, x + w]] - integral[[y + h, x]]
}
