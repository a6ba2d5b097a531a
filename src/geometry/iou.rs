//! Intersection-over-union for rotated rectangles.
//!
//! Computed exactly by clipping one rectangle against the other
//! (Sutherland-Hodgman, both inputs are convex) and taking the shoelace
//! area of the resulting polygon.

use super::rbox::{Point, RotatedBox};

const DEGENERATE_AREA: f64 = 1e-9;

/// Overlap ratio between two rotated rectangles, in `[0, 1]`.
///
/// Degenerate inputs (near-zero area, non-finite fields) yield `0.0`.
pub fn iou(a: &RotatedBox, b: &RotatedBox) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    let area_a = a.area();
    let area_b = b.area();
    if area_a < DEGENERATE_AREA || area_b < DEGENERATE_AREA {
        return 0.0;
    }

    let inter = intersection_area(&a.corners(), &b.corners());
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    (inter / union).clamp(0.0, 1.0)
}

/// Area of the intersection of two convex polygons.
fn intersection_area(subject: &[Point; 4], clip: &[Point; 4]) -> f64 {
    let mut polygon: Vec<Point> = subject.to_vec();
    for i in 0..4 {
        let a = clip[i];
        let b = clip[(i + 1) % 4];
        polygon = clip_against_edge(&polygon, a, b);
        if polygon.is_empty() {
            return 0.0;
        }
    }
    shoelace_area(&polygon)
}

/// Keeps the part of `polygon` on the inner side of the directed edge
/// `a -> b`. Corner ordering is clockwise in image coordinates (y down),
/// which makes the inner side the non-negative cross-product side.
fn clip_against_edge(polygon: &[Point], a: Point, b: Point) -> Vec<Point> {
    let inside = |p: Point| cross(a, b, p) >= 0.0;

    let mut out = Vec::with_capacity(polygon.len() + 1);
    for i in 0..polygon.len() {
        let current = polygon[i];
        let next = polygon[(i + 1) % polygon.len()];
        let current_in = inside(current);
        let next_in = inside(next);

        if current_in {
            out.push(current);
        }
        if current_in != next_in {
            if let Some(p) = line_intersection(a, b, current, next) {
                out.push(p);
            }
        }
    }
    out
}

#[inline]
fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn line_intersection(a: Point, b: Point, c: Point, d: Point) -> Option<Point> {
    let r = Point::new(b.x - a.x, b.y - a.y);
    let s = Point::new(d.x - c.x, d.y - c.y);
    let denom = r.x * s.y - r.y * s.x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let t = ((c.x - a.x) * s.y - (c.y - a.y) * s.x) / denom;
    Some(Point::new(a.x + t * r.x, a.y + t * r.y))
}

fn shoelace_area(polygon: &[Point]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..polygon.len() {
        let p = polygon[i];
        let q = polygon[(i + 1) % polygon.len()];
        sum += p.x * q.y - q.x * p.y;
    }
    sum.abs() / 2.0
}
