//! # Contour Extraction
//!
//! External contour extraction over a binary mask. Only the outermost border of each
//! foreground region is kept; borders of holes and of regions nested inside holes are
//! dropped. Boundary chains are compressed so that straight horizontal, vertical and
//! diagonal runs keep only their end points.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use serde::Serialize;

/// Axis-aligned bounding box in image coordinates.
///
/// `width` and `height` count pixels, so a single pixel has a 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box enclosing all points. Returns `None` for an empty slice.
    pub fn enclosing(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);

        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }

    /// Last column covered by the box
    pub fn right(&self) -> u32 {
        self.x + self.width.saturating_sub(1)
    }

    /// Last row covered by the box
    pub fn bottom(&self) -> u32 {
        self.y + self.height.saturating_sub(1)
    }
}

/// An external grain boundary with its derived measurements.
#[derive(Debug, Clone)]
pub struct GrainContour {
    /// Compressed boundary chain
    pub points: Vec<Point<i32>>,
    /// Area enclosed by the boundary polygon
    pub area: f64,
    /// Bounding box of the boundary
    pub bbox: BoundingBox,
}

/// Finds the external contours of all foreground regions of `mask`.
///
/// Non-zero pixels are foreground and everything outside the image counts as
/// background, so regions touching the border still have an outer contour. The order
/// of the returned contours follows the raster scan of the border-following pass and
/// carries no meaning.
pub fn find_external_contours(mask: &GrayImage) -> Vec<GrainContour> {
    let contours: Vec<Contour<i32>> = find_contours(&pad_with_background(mask));

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let unpadded: Vec<Point<i32>> = c
                .points
                .iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            let points = simplify_chain(&unpadded);
            let bbox = BoundingBox::enclosing(&points)?;
            let area = polygon_area(&points);
            Some(GrainContour { points, area, bbox })
        })
        .collect()
}

/// Copy of `mask` with a one pixel background frame on every side
fn pad_with_background(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width + 2, height + 2, |x, y| {
        if x == 0 || y == 0 || x > width || y > height {
            Luma([0])
        } else {
            *mask.get_pixel(x - 1, y - 1)
        }
    })
}

/// Drops chain points lying strictly inside a straight run.
///
/// The chain is treated as closed. A point survives when the step direction into it
/// differs from the step direction out of it.
pub fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());

    points
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, **p) != step(**p, next)
        })
        .map(|(_, p)| *p)
        .collect()
}

/// Area of the closed polygon through `points` (shoelace formula).
///
/// Degenerate chains with fewer than three points have zero area.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let n = points.len();
    let mut twice_area = 0i64;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x as i64 * points[j].y as i64;
        twice_area -= points[j].x as i64 * points[i].y as i64;
    }

    (twice_area as f64 * 0.5).abs()
}
