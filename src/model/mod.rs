//! Core data model for the annotation engine.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: newtype IDs and enums keep image keys, annotation
//!    identifiers and provenance states from being mixed up.
//!
//! 2. **Single Owner**: every entity here is owned exclusively by the
//!    [`AnnotationStore`](crate::store::AnnotationStore); reads hand out
//!    clones, mutation happens only through store commits.
//!
//! 3. **Permissive Representation**: like the geometry types, the model can
//!    represent data the store would reject, so that importers can load
//!    first and report problems instead of panicking.

mod annotation;
mod classes;
mod image_set;
mod split;

pub use annotation::{Annotation, AnnotationId, Provenance};
pub use classes::ClassList;
pub use image_set::{ImageAnnotationSet, ImageMeta};
pub use split::Split;
