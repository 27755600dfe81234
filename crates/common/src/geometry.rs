//! Integer pixel geometry: points, sizes and bounding boxes

use serde::{Deserialize, Serialize};

/// Integer pixel position, possibly relative to a template bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Integer pixel extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[must_use]
    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[must_use]
    pub fn bottom_right(&self) -> Point {
        Point::new(self.x + self.width as i32, self.y + self.height as i32)
    }

    /// True if the point lies strictly inside the box
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x > self.x
            && p.y > self.y
            && p.x < self.x + self.width as i32
            && p.y < self.y + self.height as i32
    }

    /// Intersection area with another box, in pixels
    #[must_use]
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width as i32).min(other.x + other.width as i32);
        let y2 = (self.y + self.height as i32).min(other.y + other.height as i32);

        let w = (x2 - x1).max(0) as u64;
        let h = (y2 - y1).max(0) as u64;
        w * h
    }

    /// Overlap ratio `area(A ∩ B) / min(area(A), area(B))`
    #[must_use]
    pub fn overlap(&self, other: &BoundingBox) -> f32 {
        let min_area = self.area().min(other.area());
        if min_area == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f32 / min_area as f32
    }

    /// Box scaled by a pyramid factor, anchored at the scaled origin
    #[must_use]
    pub fn scaled(&self, scale: f32) -> BoundingBox {
        BoundingBox::new(
            (self.x as f32 * scale).round() as i32,
            (self.y as f32 * scale).round() as i32,
            (self.width as f32 * scale).round() as u32,
            (self.height as f32 * scale).round() as u32,
        )
    }

    /// Box grown by `margin` pixels on every side, clamped to `bounds`
    #[must_use]
    pub fn inflated(&self, margin: i32, bounds: Size) -> BoundingBox {
        let x = (self.x - margin).max(0);
        let y = (self.y - margin).max(0);
        let x2 = (self.x + self.width as i32 + margin).min(bounds.width as i32);
        let y2 = (self.y + self.height as i32 + margin).min(bounds.height as i32);
        BoundingBox::new(x, y, (x2 - x).max(0) as u32, (y2 - y).max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_uses_smaller_area() {
        let a = BoundingBox::new(0, 0, 100, 100);
        let b = BoundingBox::new(50, 50, 10, 10);

        // b lies fully inside a, so overlap against the smaller box is 1
        assert_eq!(a.overlap(&b), 1.0);
        assert_eq!(b.overlap(&a), 1.0);
    }

    #[test]
    fn overlap_disjoint_is_zero() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 10, 10);
        assert_eq!(a.overlap(&b), 0.0);
    }

    #[test]
    fn overlap_partial() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        assert!((a.overlap(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn inflate_clamps_to_bounds() {
        let bb = BoundingBox::new(5, 5, 20, 20);
        let grown = bb.inflated(15, Size::new(30, 30));
        assert_eq!(grown.x, 0);
        assert_eq!(grown.y, 0);
        assert_eq!(grown.width, 30);
        assert_eq!(grown.height, 30);
    }

    #[test]
    fn contains_is_strict() {
        let bb = BoundingBox::new(0, 0, 10, 10);
        assert!(bb.contains(Point::new(5, 5)));
        assert!(!bb.contains(Point::new(0, 5)));
        assert!(!bb.contains(Point::new(10, 5)));
    }
}
