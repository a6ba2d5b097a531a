//! A single labeled oriented box and its identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::RotatedBox;

/// A unique identifier for an annotation, stable within one image's set.
///
/// Assigned from a per-image monotonic counter at creation and never reused,
/// so undo entries and auto-label results can refer to annotations across
/// deletes without ambiguity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl AnnotationId {
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnotationId({})", self.0)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an annotation came from.
///
/// Model proposals enter as `AutoPending` and only become `AutoAccepted`
/// through an explicit user confirmation; any manual edit of a pending
/// annotation reclassifies it as `Manual`. This keeps unreviewed detector
/// output from silently contaminating an exported dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Manual,
    AutoAccepted,
    AutoPending,
}

/// A labeled oriented bounding box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Identifier unique within the owning image's annotation set.
    pub id: AnnotationId,

    /// The oriented box in image-pixel coordinates.
    pub bbox: RotatedBox,

    /// Index into the project's class list.
    pub class_index: usize,

    /// Detector confidence; `None` for manual annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Origin tag, see [`Provenance`].
    #[serde(default)]
    pub provenance: Provenance,
}

impl Annotation {
    /// Creates a manual annotation.
    pub fn new(id: impl Into<AnnotationId>, bbox: RotatedBox, class_index: usize) -> Self {
        Self {
            id: id.into(),
            bbox,
            class_index,
            confidence: None,
            provenance: Provenance::Manual,
        }
    }

    /// Adds a confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the provenance tag.
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

impl From<u64> for AnnotationId {
    fn from(id: u64) -> Self {
        AnnotationId::new(id)
    }
}
