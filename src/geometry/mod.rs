//! Geometry core for oriented bounding boxes.
//!
//! Everything downstream — hit-testing in the editor, deduplication in the
//! auto-label adapter, corner emission in the codecs — goes through the types
//! defined here. The canonical box representation is center + size + angle,
//! with the angle folded into `[-PI/2, PI/2)` so a box and its half-turn
//! twin never coexist as distinct states.

mod handles;
mod iou;
mod rbox;

pub use handles::{nearest_handle, resize_from_handle, rotation_handle_point, Handle};
pub use iou::iou;
pub use rbox::{Point, RotatedBox};
