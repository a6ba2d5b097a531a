//! Per-image metadata and the owned annotation sequence.

use serde::{Deserialize, Serialize};

use super::annotation::{Annotation, AnnotationId};

/// Intrinsic metadata of a source image. The engine never decodes pixels;
/// collaborators hand over path, dimensions and an optional crc32c checksum
/// of the file contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Normalized relative path; doubles as the image key in the store.
    pub path: String,

    /// Width of the image in pixels.
    pub width: u32,

    /// Height of the image in pixels.
    pub height: u32,

    /// crc32c of the image file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
}

impl ImageMeta {
    pub fn new(path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            checksum: None,
        }
    }

    /// Attaches a checksum computed from the raw file bytes.
    pub fn with_checksum_of(mut self, bytes: &[u8]) -> Self {
        self.checksum = Some(crc32c::crc32c(bytes));
        self
    }
}

/// The ordered annotations of one image, plus the bookkeeping the store
/// needs: a never-reused identifier counter and a dirty flag.
#[derive(Clone, Debug)]
pub struct ImageAnnotationSet {
    meta: ImageMeta,
    annotations: Vec<Annotation>,
    next_id: u64,
    dirty: bool,
}

impl ImageAnnotationSet {
    pub fn new(meta: ImageMeta) -> Self {
        Self {
            meta,
            annotations: Vec::new(),
            next_id: 1,
            dirty: false,
        }
    }

    /// Rebuilds a set from persisted parts. The identifier counter resumes
    /// past both the persisted counter and the largest loaded id, so ids are
    /// never reused even if the persisted counter was lost.
    pub fn from_parts(meta: ImageMeta, annotations: Vec<Annotation>, next_id: u64) -> Self {
        let max_seen = annotations.iter().map(|a| a.id.as_u64()).max().unwrap_or(0);
        Self {
            meta,
            annotations,
            next_id: next_id.max(max_seen + 1),
            dirty: false,
        }
    }

    #[inline]
    pub fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    #[inline]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub(crate) fn allocate_id(&mut self) -> AnnotationId {
        let id = AnnotationId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, annotation: Annotation) {
        debug_assert!(self.get(annotation.id).is_none(), "duplicate annotation id");
        self.annotations.push(annotation);
        self.dirty = true;
    }

    /// Inserts at a specific sequence position, clamped to the current
    /// length; used when undoing a deletion.
    pub(crate) fn insert_at(&mut self, index: usize, annotation: Annotation) {
        debug_assert!(self.get(annotation.id).is_none(), "duplicate annotation id");
        let index = index.min(self.annotations.len());
        self.annotations.insert(index, annotation);
        self.dirty = true;
    }

    pub(crate) fn replace(&mut self, annotation: Annotation) -> Option<Annotation> {
        let slot = self.annotations.iter_mut().find(|a| a.id == annotation.id)?;
        let before = std::mem::replace(slot, annotation);
        self.dirty = true;
        Some(before)
    }

    /// Removes by id, returning the annotation and the sequence position it
    /// held.
    pub(crate) fn remove(&mut self, id: AnnotationId) -> Option<(usize, Annotation)> {
        let pos = self.annotations.iter().position(|a| a.id == id)?;
        self.dirty = true;
        Some((pos, self.annotations.remove(pos)))
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
