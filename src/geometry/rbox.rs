//! The rotated rectangle type and its basic transforms.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

/// A 2D point in image-pixel coordinates.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An oriented bounding box: center, size and rotation angle.
///
/// The angle is in radians and is always stored in the canonical half-open
/// range `[-PI/2, PI/2)`. A rectangle rotated by `theta` and one rotated by
/// `theta - PI` cover the same pixels, so constructors fold the angle by
/// multiples of `PI`; width and height are unaffected by that fold.
///
/// Like the rest of the data model, construction is permissive: a zero-area
/// box can be represented (it shows up mid-drag in the editor), but the
/// annotation store rejects degenerate boxes at commit time.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
    pub theta: f64,
}

impl RotatedBox {
    /// Creates a box, folding `theta` into the canonical range.
    pub fn new(cx: f64, cy: f64, w: f64, h: f64, theta: f64) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            theta: canonical_angle(theta),
        }
    }

    /// Creates an axis-aligned box from two opposite drag corners.
    pub fn from_drag(a: Point, b: Point) -> Self {
        Self::new(
            (a.x + b.x) / 2.0,
            (a.y + b.y) / 2.0,
            (a.x - b.x).abs(),
            (a.y - b.y).abs(),
            0.0,
        )
    }

    #[inline]
    pub fn center(&self) -> Point {
        Point::new(self.cx, self.cy)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Returns true if all fields are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.cx.is_finite()
            && self.cy.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.theta.is_finite()
    }

    /// The four corners in a fixed order: clockwise starting from the
    /// top-left of the box's local (unrotated) frame. Codecs rely on this
    /// ordering, so it must not change.
    pub fn corners(&self) -> [Point; 4] {
        let (hw, hh) = (self.w / 2.0, self.h / 2.0);
        let local = [
            Point::new(-hw, -hh),
            Point::new(hw, -hh),
            Point::new(hw, hh),
            Point::new(-hw, hh),
        ];
        local.map(|p| self.to_world(p))
    }

    /// Transforms a local-frame point into image coordinates.
    #[inline]
    pub fn to_world(&self, p: Point) -> Point {
        let (sin, cos) = self.theta.sin_cos();
        Point::new(
            self.cx + p.x * cos - p.y * sin,
            self.cy + p.x * sin + p.y * cos,
        )
    }

    /// Transforms an image-coordinate point into the box's local frame.
    #[inline]
    pub fn to_local(&self, p: Point) -> Point {
        let (sin, cos) = self.theta.sin_cos();
        let (dx, dy) = (p.x - self.cx, p.y - self.cy);
        Point::new(dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Point-in-box test via the local frame.
    pub fn contains(&self, p: Point) -> bool {
        let local = self.to_local(p);
        local.x.abs() <= self.w / 2.0 && local.y.abs() <= self.h / 2.0
    }

    /// Returns a copy rotated by `delta` around its own center.
    pub fn rotate_around_center(&self, delta: f64) -> Self {
        Self::new(self.cx, self.cy, self.w, self.h, self.theta + delta)
    }

    /// Returns a copy translated by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            ..*self
        }
    }

    /// Axis-aligned envelope as `(xmin, ymin, xmax, ymax)`.
    pub fn envelope(&self) -> (f64, f64, f64, f64) {
        let corners = self.corners();
        let mut xmin = f64::INFINITY;
        let mut ymin = f64::INFINITY;
        let mut xmax = f64::NEG_INFINITY;
        let mut ymax = f64::NEG_INFINITY;
        for c in corners {
            xmin = xmin.min(c.x);
            ymin = ymin.min(c.y);
            xmax = xmax.max(c.x);
            ymax = ymax.max(c.y);
        }
        (xmin, ymin, xmax, ymax)
    }

    /// Reconstructs a box from four corners in the ordering produced by
    /// [`RotatedBox::corners`]. The inverse of `corners` up to float error
    /// and the canonical angle fold.
    pub fn from_corners(corners: &[Point; 4]) -> Self {
        let cx = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let cy = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;

        // Top edge carries the width and the angle; the left edge the height.
        let top = Point::new(corners[1].x - corners[0].x, corners[1].y - corners[0].y);
        let left = Point::new(corners[3].x - corners[0].x, corners[3].y - corners[0].y);

        let w = top.x.hypot(top.y);
        let h = left.x.hypot(left.y);
        let theta = if w > 0.0 { top.y.atan2(top.x) } else { 0.0 };

        Self::new(cx, cy, w, h, theta)
    }

    /// Approximate equality on all five fields, with the angle compared on
    /// the canonical circle (so `-PI/2` and `PI/2 - eps` count as close).
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        let dt = (self.theta - other.theta).abs();
        let dt = dt.min((dt - PI).abs());
        (self.cx - other.cx).abs() <= eps
            && (self.cy - other.cy).abs() <= eps
            && (self.w - other.w).abs() <= eps
            && (self.h - other.h).abs() <= eps
            && dt <= eps
    }
}

impl std::fmt::Debug for RotatedBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatedBox")
            .field("cx", &self.cx)
            .field("cy", &self.cy)
            .field("w", &self.w)
            .field("h", &self.h)
            .field("theta", &self.theta)
            .finish()
    }
}

/// Folds an angle into `[-PI/2, PI/2)`.
pub(crate) fn canonical_angle(theta: f64) -> f64 {
    if !theta.is_finite() {
        return theta;
    }
    let mut t = theta.rem_euclid(PI);
    if t >= FRAC_PI_2 {
        t -= PI;
    }
    t
}
