//! Interactive control handles on a selected box.
//!
//! A selected box exposes four corner handles, four edge-midpoint handles and
//! one rotation handle floating above the top edge in the box's local frame.
//! Handle indices follow the corner ordering of [`RotatedBox::corners`]:
//! corner 0 is the local top-left, edge `i` runs from corner `i` to corner
//! `(i + 1) % 4`, so edge 0 is the top edge and edge 1 the right edge.

use super::rbox::{Point, RotatedBox};

/// Distance from the top edge midpoint to the rotation handle, in image
/// pixels along the box's local up direction.
pub const ROTATION_HANDLE_OFFSET: f64 = 20.0;

/// An interactive control on a selected box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    /// Corner index 0..4, in the ordering of [`RotatedBox::corners`].
    Corner(usize),
    /// Edge index 0..4; edge `i` joins corner `i` and corner `(i + 1) % 4`.
    Edge(usize),
    /// The rotation grip above the top edge.
    Rotation,
}

fn edge_midpoints(b: &RotatedBox) -> [Point; 4] {
    let c = b.corners();
    std::array::from_fn(|i| {
        let a = c[i];
        let d = c[(i + 1) % 4];
        Point::new((a.x + d.x) / 2.0, (a.y + d.y) / 2.0)
    })
}

/// Image-space position of the rotation handle.
pub fn rotation_handle_point(b: &RotatedBox) -> Point {
    b.to_world(Point::new(0.0, -b.h / 2.0 - ROTATION_HANDLE_OFFSET))
}

/// Returns the closest handle within `tolerance` pixels of `p`, or `None`.
///
/// Ties are broken deterministically: corners beat edge midpoints, which
/// beat the rotation handle. Within a category the lowest index wins.
pub fn nearest_handle(b: &RotatedBox, p: Point, tolerance: f64) -> Option<Handle> {
    let mut best: Option<(f64, Handle)> = None;

    let mut consider = |dist: f64, handle: Handle| {
        if dist > tolerance {
            return;
        }
        // Strict improvement only, so earlier candidates win ties.
        if best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, handle));
        }
    };

    for (i, corner) in b.corners().iter().enumerate() {
        consider(p.distance(*corner), Handle::Corner(i));
    }
    for (i, mid) in edge_midpoints(b).iter().enumerate() {
        consider(p.distance(*mid), Handle::Edge(i));
    }
    consider(p.distance(rotation_handle_point(b)), Handle::Rotation);

    best.map(|(_, h)| h)
}

/// Recomputes the box after dragging `handle` to `new_point`, holding the
/// opposite handle fixed. Rotation never changes here. If either resulting
/// side would fall below `min_side` the original box is returned unchanged.
///
/// Dragging the rotation handle does not resize; it returns the box as-is
/// (the editor applies rotation via [`RotatedBox::rotate_around_center`]).
pub fn resize_from_handle(
    b: &RotatedBox,
    handle: Handle,
    new_point: Point,
    min_side: f64,
) -> RotatedBox {
    match handle {
        Handle::Corner(i) => {
            let fixed = b.corners()[(i + 2) % 4];
            resize_against_anchor(b, fixed, new_point, true, true, min_side)
        }
        Handle::Edge(i) => {
            let fixed = edge_midpoints(b)[(i + 2) % 4];
            // Top/bottom edges move only the height axis, left/right only width.
            let horizontal = i % 2 == 1;
            resize_against_anchor(b, fixed, new_point, horizontal, !horizontal, min_side)
        }
        Handle::Rotation => *b,
    }
}

fn resize_against_anchor(
    b: &RotatedBox,
    anchor: Point,
    dragged: Point,
    resize_w: bool,
    resize_h: bool,
    min_side: f64,
) -> RotatedBox {
    // Work in the unrotated frame: the anchor stays put, the dragged point
    // defines the new extent along the resized axes.
    let (sin, cos) = b.theta.sin_cos();
    let (dx, dy) = (dragged.x - anchor.x, dragged.y - anchor.y);
    let local = Point::new(dx * cos + dy * sin, -dx * sin + dy * cos);

    let new_w = if resize_w { local.x.abs() } else { b.w };
    let new_h = if resize_h { local.y.abs() } else { b.h };
    if new_w < min_side || new_h < min_side {
        return *b;
    }

    let half = Point::new(
        if resize_w { local.x / 2.0 } else { 0.0 },
        if resize_h { local.y / 2.0 } else { 0.0 },
    );
    let center = Point::new(
        anchor.x + half.x * cos - half.y * sin,
        anchor.y + half.x * sin + half.y * cos,
    );

    RotatedBox::new(center.x, center.y, new_w, new_h, b.theta)
}
