//! The annotation store: the single owner of all per-image annotation state.
//!
//! Every mutation funnels through [`AnnotationStore::commit`], which
//! validates against the geometry invariants and the class list, applies the
//! change atomically, pushes exactly one undo entry and marks the image
//! dirty. Reads hand out clones so no caller can bypass `commit`.
//!
//! The store is written for a single-threaded interactive sequence (see the
//! crate docs); background work communicates results back over channels and
//! never touches the store directly.

mod history;

pub use history::{AnnChange, History, UndoEntry};

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::RotatedBox;
use crate::model::{
    Annotation, AnnotationId, ClassList, ImageAnnotationSet, ImageMeta, Provenance, Split,
};

/// Payload for creating an annotation through a commit.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAnnotation {
    pub bbox: RotatedBox,
    pub class_index: usize,
    pub confidence: Option<f64>,
    pub provenance: Provenance,
}

impl NewAnnotation {
    /// A manually drawn annotation.
    pub fn manual(bbox: RotatedBox, class_index: usize) -> Self {
        Self {
            bbox,
            class_index,
            confidence: None,
            provenance: Provenance::Manual,
        }
    }
}

/// A described mutation of one image's annotation set.
///
/// Batch variants exist so multi-annotation gestures (auto-label ingestion,
/// paste, batch delete/reclassify) land as a single undo entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Create(NewAnnotation),
    CreateBatch(Vec<NewAnnotation>),
    Update {
        id: AnnotationId,
        bbox: Option<RotatedBox>,
        class_index: Option<usize>,
    },
    Delete(AnnotationId),
    DeleteBatch(Vec<AnnotationId>),
    ReclassifyBatch {
        ids: Vec<AnnotationId>,
        class_index: usize,
    },
}

/// What a successful commit produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitOutcome {
    /// Ids assigned to newly created annotations, in input order.
    pub created: Vec<AnnotationId>,
}

/// Result of an undo or redo request. An empty stack is reported, not an
/// error: hammering Ctrl+Z past the bottom is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    Applied,
    EmptyStack,
}

/// Summary of a cascading class deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassDeletionSummary {
    pub removed_annotations: usize,
    pub remapped_annotations: usize,
}

/// In-memory collection of per-image annotation sets with mutation history.
#[derive(Debug)]
pub struct AnnotationStore {
    classes: ClassList,
    sets: BTreeMap<String, ImageAnnotationSet>,
    histories: BTreeMap<String, History>,
    splits: BTreeMap<String, Split>,
    clipboard: Vec<Annotation>,
    undo_depth: usize,
    min_box_side: f64,
}

impl AnnotationStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            classes: ClassList::new(),
            sets: BTreeMap::new(),
            histories: BTreeMap::new(),
            splits: BTreeMap::new(),
            clipboard: Vec::new(),
            undo_depth: config.undo_depth,
            min_box_side: config.min_box_side,
        }
    }

    pub fn with_classes(config: &EngineConfig, classes: ClassList) -> Self {
        Self {
            classes,
            ..Self::new(config)
        }
    }

    /// Rebuilds a store from loaded parts; used by the project loader and
    /// the format importers.
    pub fn from_parts(
        config: &EngineConfig,
        classes: ClassList,
        sets: Vec<ImageAnnotationSet>,
        splits: BTreeMap<String, Split>,
    ) -> Self {
        let mut store = Self::with_classes(config, classes);
        for set in sets {
            let key = set.meta().path.clone();
            store.histories.insert(key.clone(), History::new(store.undo_depth));
            store.sets.insert(key, set);
        }
        store.splits = splits;
        store
    }

    // ---- images ----

    pub fn add_image(&mut self, meta: ImageMeta) -> Result<(), OrilabelError> {
        let key = meta.path.clone();
        if self.sets.contains_key(&key) {
            return Err(OrilabelError::DuplicateImage { key });
        }
        self.histories
            .insert(key.clone(), History::new(self.undo_depth));
        self.sets.insert(key, ImageAnnotationSet::new(meta));
        Ok(())
    }

    pub fn remove_image(&mut self, key: &str) -> Result<(), OrilabelError> {
        if self.sets.remove(key).is_none() {
            return Err(OrilabelError::UnknownImage {
                key: key.to_string(),
            });
        }
        self.histories.remove(key);
        self.splits.remove(key);
        Ok(())
    }

    pub fn contains_image(&self, key: &str) -> bool {
        self.sets.contains_key(key)
    }

    /// Image keys in deterministic (sorted) order.
    pub fn image_keys(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }

    pub fn image_count(&self) -> usize {
        self.sets.len()
    }

    pub fn meta(&self, key: &str) -> Result<ImageMeta, OrilabelError> {
        Ok(self.set(key)?.meta().clone())
    }

    /// Defensive snapshot of one image's annotations.
    pub fn annotations(&self, key: &str) -> Result<Vec<Annotation>, OrilabelError> {
        Ok(self.set(key)?.annotations().to_vec())
    }

    pub fn annotation(&self, key: &str, id: AnnotationId) -> Result<Annotation, OrilabelError> {
        self.set(key)?
            .get(id)
            .cloned()
            .ok_or_else(|| OrilabelError::UnknownAnnotation {
                key: key.to_string(),
                id: id.as_u64(),
            })
    }

    pub fn annotation_count(&self, key: &str) -> Result<usize, OrilabelError> {
        Ok(self.set(key)?.annotations().len())
    }

    // ---- splits ----

    pub fn set_split(&mut self, key: &str, split: Split) -> Result<(), OrilabelError> {
        let set = self.set_mut(key)?;
        set.mark_dirty();
        self.splits.insert(key.to_string(), split);
        Ok(())
    }

    pub fn split_of(&self, key: &str) -> Split {
        self.splits.get(key).copied().unwrap_or_default()
    }

    // ---- classes ----

    pub fn classes(&self) -> &ClassList {
        &self.classes
    }

    pub fn add_class(&mut self, name: impl Into<String>) -> usize {
        self.classes.push(name)
    }

    pub fn rename_class(
        &mut self,
        index: usize,
        name: impl Into<String>,
    ) -> Result<(), OrilabelError> {
        self.classes.rename(index, name)
    }

    /// Number of annotations across all images referencing `class_index`.
    pub fn class_reference_count(&self, class_index: usize) -> usize {
        self.sets
            .values()
            .flat_map(|set| set.annotations())
            .filter(|ann| ann.class_index == class_index)
            .count()
    }

    /// Deletes a class. Without `cascade` the call fails if any annotation
    /// still references the class. With `cascade`, referencing annotations
    /// are removed and higher class indices are shifted down to keep the
    /// class list contiguous.
    ///
    /// All undo histories are cleared: surviving entries could resurrect
    /// annotations that reference the removed class.
    pub fn delete_class(
        &mut self,
        class_index: usize,
        cascade: bool,
    ) -> Result<ClassDeletionSummary, OrilabelError> {
        if !self.classes.contains_index(class_index) {
            return Err(OrilabelError::UnknownClass {
                class_index,
                class_count: self.classes.len(),
            });
        }

        let references = self.class_reference_count(class_index);
        if references > 0 && !cascade {
            return Err(OrilabelError::ClassDeletionConflict {
                class_index,
                references,
            });
        }

        let mut summary = ClassDeletionSummary::default();
        for set in self.sets.values_mut() {
            let doomed: Vec<AnnotationId> = set
                .annotations()
                .iter()
                .filter(|ann| ann.class_index == class_index)
                .map(|ann| ann.id)
                .collect();
            let remap: Vec<Annotation> = set
                .annotations()
                .iter()
                .filter(|ann| ann.class_index > class_index)
                .cloned()
                .collect();

            if doomed.is_empty() && remap.is_empty() {
                continue;
            }
            for id in doomed {
                set.remove(id);
                summary.removed_annotations += 1;
            }
            for mut ann in remap {
                ann.class_index -= 1;
                set.replace(ann);
                summary.remapped_annotations += 1;
            }
        }

        self.classes.remove(class_index)?;
        for history in self.histories.values_mut() {
            *history = History::new(self.undo_depth);
        }
        Ok(summary)
    }

    // ---- mutation ----

    /// Applies a mutation atomically: everything is validated before any
    /// state changes, so a failed commit leaves the store untouched.
    pub fn commit(
        &mut self,
        key: &str,
        mutation: Mutation,
    ) -> Result<CommitOutcome, OrilabelError> {
        // Validation pass over an immutable borrow.
        let changes = self.plan(key, &mutation)?;

        let set = self
            .sets
            .get_mut(key)
            .expect("planned against existing set");
        let mut outcome = CommitOutcome::default();
        let mut entry = UndoEntry::default();

        for planned in changes {
            match planned {
                PlannedChange::Create(new_ann) => {
                    let id = set.allocate_id();
                    let ann = Annotation {
                        id,
                        bbox: new_ann.bbox,
                        class_index: new_ann.class_index,
                        confidence: new_ann.confidence,
                        provenance: new_ann.provenance,
                    };
                    entry.changes.push(AnnChange::created(ann.clone()));
                    set.insert(ann);
                    outcome.created.push(id);
                }
                PlannedChange::Replace(after) => {
                    let before = set.replace(after.clone()).expect("validated existing id");
                    entry.changes.push(AnnChange::modified(before, after));
                }
                PlannedChange::Remove(id) => {
                    let (index, before) = set.remove(id).expect("validated existing id");
                    entry.changes.push(AnnChange::deleted(before, index));
                }
            }
        }

        set.mark_dirty();
        self.histories
            .get_mut(key)
            .expect("history exists for every image")
            .record(entry);
        Ok(outcome)
    }

    fn plan(&self, key: &str, mutation: &Mutation) -> Result<Vec<PlannedChange>, OrilabelError> {
        let set = self.set(key)?;

        let mut planned = Vec::new();
        match mutation {
            Mutation::Create(new_ann) => {
                self.validate_new(new_ann)?;
                planned.push(PlannedChange::Create(new_ann.clone()));
            }
            Mutation::CreateBatch(batch) => {
                for new_ann in batch {
                    self.validate_new(new_ann)?;
                    planned.push(PlannedChange::Create(new_ann.clone()));
                }
            }
            Mutation::Update {
                id,
                bbox,
                class_index,
            } => {
                let existing = self.require(set, key, *id)?;
                let mut after = existing.clone();
                if let Some(bbox) = bbox {
                    after.bbox = *bbox;
                }
                if let Some(class_index) = class_index {
                    after.class_index = *class_index;
                }
                // Touching a pending proposal turns it into a manual
                // annotation: the user has reviewed it.
                if after.provenance == Provenance::AutoPending {
                    after.provenance = Provenance::Manual;
                    after.confidence = None;
                }
                self.validate_box(&after.bbox)?;
                self.validate_class(after.class_index)?;
                planned.push(PlannedChange::Replace(after));
            }
            Mutation::Delete(id) => {
                self.require(set, key, *id)?;
                planned.push(PlannedChange::Remove(*id));
            }
            Mutation::DeleteBatch(ids) => {
                for id in ids {
                    self.require(set, key, *id)?;
                    planned.push(PlannedChange::Remove(*id));
                }
            }
            Mutation::ReclassifyBatch { ids, class_index } => {
                self.validate_class(*class_index)?;
                for id in ids {
                    let existing = self.require(set, key, *id)?;
                    let mut after = existing.clone();
                    after.class_index = *class_index;
                    if after.provenance == Provenance::AutoPending {
                        after.provenance = Provenance::Manual;
                        after.confidence = None;
                    }
                    planned.push(PlannedChange::Replace(after));
                }
            }
        }
        Ok(planned)
    }

    /// Reverts the most recent commit for `key`.
    pub fn undo(&mut self, key: &str) -> Result<UndoOutcome, OrilabelError> {
        if !self.sets.contains_key(key) {
            return Err(OrilabelError::UnknownImage {
                key: key.to_string(),
            });
        }
        let history = self.histories.get_mut(key).expect("history per image");
        let Some(entry) = history.pop_undo() else {
            return Ok(UndoOutcome::EmptyStack);
        };

        let set = self.sets.get_mut(key).expect("checked above");
        // Apply the before-side, newest change first.
        for change in entry.changes.iter().rev() {
            match (&change.before, &change.after) {
                (None, Some(after)) => {
                    set.remove(after.id);
                }
                (Some(before), None) => match change.index {
                    Some(index) => set.insert_at(index, before.clone()),
                    None => set.insert(before.clone()),
                },
                (Some(before), Some(_)) => {
                    set.replace(before.clone());
                }
                (None, None) => {}
            }
        }
        set.mark_dirty();
        Ok(UndoOutcome::Applied)
    }

    /// Reapplies the most recently undone commit for `key`.
    pub fn redo(&mut self, key: &str) -> Result<UndoOutcome, OrilabelError> {
        if !self.sets.contains_key(key) {
            return Err(OrilabelError::UnknownImage {
                key: key.to_string(),
            });
        }
        let history = self.histories.get_mut(key).expect("history per image");
        let Some(entry) = history.pop_redo() else {
            return Ok(UndoOutcome::EmptyStack);
        };

        let set = self.sets.get_mut(key).expect("checked above");
        for change in &entry.changes {
            match (&change.before, &change.after) {
                (None, Some(after)) => {
                    set.insert(after.clone());
                }
                (Some(before), None) => {
                    set.remove(before.id);
                }
                (Some(_), Some(after)) => {
                    set.replace(after.clone());
                }
                (None, None) => {}
            }
        }
        set.mark_dirty();
        Ok(UndoOutcome::Applied)
    }

    pub fn can_undo(&self, key: &str) -> bool {
        self.histories.get(key).is_some_and(History::can_undo)
    }

    pub fn can_redo(&self, key: &str) -> bool {
        self.histories.get(key).is_some_and(History::can_redo)
    }

    // ---- provenance ----

    /// Batch-accepts every pending auto-label proposal on one image,
    /// flipping provenance to `AutoAccepted` as a single undo entry.
    pub fn accept_pending(&mut self, key: &str) -> Result<usize, OrilabelError> {
        let pending: Vec<Annotation> = self
            .set(key)?
            .annotations()
            .iter()
            .filter(|ann| ann.provenance == Provenance::AutoPending)
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let set = self.sets.get_mut(key).expect("checked above");
        let mut entry = UndoEntry::default();
        let count = pending.len();
        for before in pending {
            let mut after = before.clone();
            after.provenance = Provenance::AutoAccepted;
            entry.changes.push(AnnChange::modified(before, after.clone()));
            set.replace(after);
        }
        set.mark_dirty();
        self.histories
            .get_mut(key)
            .expect("history per image")
            .record(entry);
        Ok(count)
    }

    // ---- clipboard ----

    /// Deep-copies the given annotations into the internal clipboard.
    pub fn copy_to_clipboard(
        &mut self,
        key: &str,
        ids: &[AnnotationId],
    ) -> Result<usize, OrilabelError> {
        let mut copied = Vec::with_capacity(ids.len());
        for id in ids {
            copied.push(self.annotation(key, *id)?);
        }
        let count = copied.len();
        self.clipboard = copied;
        Ok(count)
    }

    /// Pastes the clipboard into `key` as one batch-create commit; pasted
    /// annotations get fresh ids.
    pub fn paste_from_clipboard(&mut self, key: &str) -> Result<CommitOutcome, OrilabelError> {
        if self.clipboard.is_empty() {
            return Ok(CommitOutcome::default());
        }
        let batch: Vec<NewAnnotation> = self
            .clipboard
            .iter()
            .map(|ann| NewAnnotation {
                bbox: ann.bbox,
                class_index: ann.class_index,
                confidence: ann.confidence,
                provenance: ann.provenance,
            })
            .collect();
        self.commit(key, Mutation::CreateBatch(batch))
    }

    // ---- dirty tracking ----

    pub fn is_dirty(&self, key: &str) -> bool {
        self.sets.get(key).is_some_and(ImageAnnotationSet::is_dirty)
    }

    pub fn dirty_keys(&self) -> Vec<String> {
        self.sets
            .iter()
            .filter(|(_, set)| set.is_dirty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear_dirty(&mut self, key: &str) -> Result<(), OrilabelError> {
        self.set_mut(key)?.clear_dirty();
        Ok(())
    }

    pub fn mark_all_clean(&mut self) {
        for set in self.sets.values_mut() {
            set.clear_dirty();
        }
    }

    pub(crate) fn mark_dirty(&mut self, key: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.mark_dirty();
        }
    }

    /// Replaces one image's set wholesale; used by crash recovery.
    pub(crate) fn restore_set(&mut self, set: ImageAnnotationSet, split: Split) {
        let key = set.meta().path.clone();
        self.histories
            .insert(key.clone(), History::new(self.undo_depth));
        self.splits.insert(key.clone(), split);
        self.sets.insert(key, set);
    }

    pub(crate) fn set(&self, key: &str) -> Result<&ImageAnnotationSet, OrilabelError> {
        self.sets.get(key).ok_or_else(|| OrilabelError::UnknownImage {
            key: key.to_string(),
        })
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut ImageAnnotationSet, OrilabelError> {
        self.sets
            .get_mut(key)
            .ok_or_else(|| OrilabelError::UnknownImage {
                key: key.to_string(),
            })
    }

    fn require<'a>(
        &self,
        set: &'a ImageAnnotationSet,
        key: &str,
        id: AnnotationId,
    ) -> Result<&'a Annotation, OrilabelError> {
        set.get(id).ok_or_else(|| OrilabelError::UnknownAnnotation {
            key: key.to_string(),
            id: id.as_u64(),
        })
    }

    fn validate_new(&self, new_ann: &NewAnnotation) -> Result<(), OrilabelError> {
        self.validate_box(&new_ann.bbox)?;
        self.validate_class(new_ann.class_index)
    }

    fn validate_box(&self, bbox: &RotatedBox) -> Result<(), OrilabelError> {
        if !bbox.is_finite() {
            return Err(OrilabelError::InvalidGeometry {
                reason: "box has non-finite coordinates".to_string(),
            });
        }
        if bbox.w < self.min_box_side || bbox.h < self.min_box_side {
            return Err(OrilabelError::InvalidGeometry {
                reason: format!(
                    "box sides {:.2}x{:.2} below minimum {:.2}",
                    bbox.w, bbox.h, self.min_box_side
                ),
            });
        }
        Ok(())
    }

    fn validate_class(&self, class_index: usize) -> Result<(), OrilabelError> {
        if !self.classes.contains_index(class_index) {
            return Err(OrilabelError::UnknownClass {
                class_index,
                class_count: self.classes.len(),
            });
        }
        Ok(())
    }
}

enum PlannedChange {
    Create(NewAnnotation),
    Replace(Annotation),
    Remove(AnnotationId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_image() -> AnnotationStore {
        let config = EngineConfig::default();
        let mut store =
            AnnotationStore::with_classes(&config, ClassList::from_names(["car", "plane"]));
        store
            .add_image(ImageMeta::new("img/a.jpg", 640, 480))
            .expect("add image");
        store
    }

    fn a_box() -> RotatedBox {
        RotatedBox::new(100.0, 100.0, 40.0, 20.0, 0.2)
    }

    #[test]
    fn create_assigns_id_and_marks_dirty() {
        let mut store = store_with_image();
        let outcome = store
            .commit("img/a.jpg", Mutation::Create(NewAnnotation::manual(a_box(), 0)))
            .expect("commit create");
        assert_eq!(outcome.created.len(), 1);
        assert!(store.is_dirty("img/a.jpg"));
        assert_eq!(store.annotation_count("img/a.jpg").unwrap(), 1);
    }

    #[test]
    fn degenerate_box_is_rejected_and_state_intact() {
        let mut store = store_with_image();
        let thin = RotatedBox::new(10.0, 10.0, 0.5, 20.0, 0.0);
        let err = store
            .commit("img/a.jpg", Mutation::Create(NewAnnotation::manual(thin, 0)))
            .unwrap_err();
        assert!(matches!(err, OrilabelError::InvalidGeometry { .. }));
        assert_eq!(store.annotation_count("img/a.jpg").unwrap(), 0);
        assert!(!store.is_dirty("img/a.jpg"));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let mut store = store_with_image();
        let err = store
            .commit("img/a.jpg", Mutation::Create(NewAnnotation::manual(a_box(), 9)))
            .unwrap_err();
        assert!(matches!(err, OrilabelError::UnknownClass { class_index: 9, .. }));
    }

    #[test]
    fn batch_create_is_atomic() {
        let mut store = store_with_image();
        let bad = NewAnnotation::manual(RotatedBox::new(0.0, 0.0, 0.1, 0.1, 0.0), 0);
        let err = store
            .commit(
                "img/a.jpg",
                Mutation::CreateBatch(vec![NewAnnotation::manual(a_box(), 0), bad]),
            )
            .unwrap_err();
        assert!(matches!(err, OrilabelError::InvalidGeometry { .. }));
        // Nothing from the batch landed.
        assert_eq!(store.annotation_count("img/a.jpg").unwrap(), 0);
    }

    #[test]
    fn undo_redo_roundtrip_restores_exact_state() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        let id = store
            .commit(key, Mutation::Create(NewAnnotation::manual(a_box(), 0)))
            .unwrap()
            .created[0];
        store
            .commit(
                key,
                Mutation::Update {
                    id,
                    bbox: Some(a_box().translate(5.0, 0.0)),
                    class_index: Some(1),
                },
            )
            .unwrap();
        let after_update = store.annotations(key).unwrap();

        assert_eq!(store.undo(key).unwrap(), UndoOutcome::Applied);
        let after_undo = store.annotation(key, id).unwrap();
        assert_eq!(after_undo.class_index, 0);
        assert!(after_undo.bbox.approx_eq(&a_box(), 1e-12));

        assert_eq!(store.redo(key).unwrap(), UndoOutcome::Applied);
        assert_eq!(store.annotations(key).unwrap(), after_update);
    }

    #[test]
    fn undo_of_delete_restores_sequence_position() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        for dx in [0.0, 60.0, 120.0] {
            store
                .commit(
                    key,
                    Mutation::Create(NewAnnotation::manual(a_box().translate(dx, 0.0), 0)),
                )
                .unwrap();
        }
        let order: Vec<AnnotationId> = store
            .annotations(key)
            .unwrap()
            .iter()
            .map(|ann| ann.id)
            .collect();

        store.commit(key, Mutation::Delete(order[1])).unwrap();
        assert_eq!(store.undo(key).unwrap(), UndoOutcome::Applied);
        let restored: Vec<AnnotationId> = store
            .annotations(key)
            .unwrap()
            .iter()
            .map(|ann| ann.id)
            .collect();
        // The middle annotation comes back in the middle, not at the end;
        // stacking order and export line order both follow the sequence.
        assert_eq!(restored, order);

        store.redo(key).unwrap();
        store.undo(key).unwrap();
        let again: Vec<AnnotationId> = store
            .annotations(key)
            .unwrap()
            .iter()
            .map(|ann| ann.id)
            .collect();
        assert_eq!(again, order);
    }

    #[test]
    fn undo_of_batch_delete_restores_every_position() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        let ids = store
            .commit(
                key,
                Mutation::CreateBatch(vec![
                    NewAnnotation::manual(a_box(), 0),
                    NewAnnotation::manual(a_box().translate(60.0, 0.0), 0),
                    NewAnnotation::manual(a_box().translate(120.0, 0.0), 0),
                ]),
            )
            .unwrap()
            .created;

        store
            .commit(key, Mutation::DeleteBatch(vec![ids[0], ids[2]]))
            .unwrap();
        store.undo(key).unwrap();
        let restored: Vec<AnnotationId> = store
            .annotations(key)
            .unwrap()
            .iter()
            .map(|ann| ann.id)
            .collect();
        assert_eq!(restored, ids);
    }

    #[test]
    fn undo_on_empty_stack_is_reported_not_fatal() {
        let mut store = store_with_image();
        assert_eq!(store.undo("img/a.jpg").unwrap(), UndoOutcome::EmptyStack);
        assert_eq!(store.redo("img/a.jpg").unwrap(), UndoOutcome::EmptyStack);
    }

    #[test]
    fn undo_depth_is_bounded() {
        let config = EngineConfig {
            undo_depth: 2,
            ..EngineConfig::default()
        };
        let mut store = AnnotationStore::with_classes(&config, ClassList::from_names(["car"]));
        store.add_image(ImageMeta::new("a.jpg", 64, 64)).unwrap();
        for _ in 0..5 {
            store
                .commit("a.jpg", Mutation::Create(NewAnnotation::manual(a_box(), 0)))
                .unwrap();
        }
        assert_eq!(store.undo("a.jpg").unwrap(), UndoOutcome::Applied);
        assert_eq!(store.undo("a.jpg").unwrap(), UndoOutcome::Applied);
        // Only the two most recent commits are reversible.
        assert_eq!(store.undo("a.jpg").unwrap(), UndoOutcome::EmptyStack);
        assert_eq!(store.annotation_count("a.jpg").unwrap(), 3);
    }

    #[test]
    fn editing_pending_proposal_reclassifies_to_manual() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        let id = store
            .commit(
                key,
                Mutation::Create(NewAnnotation {
                    bbox: a_box(),
                    class_index: 0,
                    confidence: Some(0.7),
                    provenance: Provenance::AutoPending,
                }),
            )
            .unwrap()
            .created[0];
        store
            .commit(
                key,
                Mutation::Update {
                    id,
                    bbox: Some(a_box().translate(1.0, 1.0)),
                    class_index: None,
                },
            )
            .unwrap();
        let ann = store.annotation(key, id).unwrap();
        assert_eq!(ann.provenance, Provenance::Manual);
        assert_eq!(ann.confidence, None);
    }

    #[test]
    fn accept_pending_flips_provenance_in_one_entry() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        for dx in [0.0, 60.0] {
            store
                .commit(
                    key,
                    Mutation::Create(NewAnnotation {
                        bbox: a_box().translate(dx, 0.0),
                        class_index: 0,
                        confidence: Some(0.9),
                        provenance: Provenance::AutoPending,
                    }),
                )
                .unwrap();
        }
        assert_eq!(store.accept_pending(key).unwrap(), 2);
        for ann in store.annotations(key).unwrap() {
            assert_eq!(ann.provenance, Provenance::AutoAccepted);
        }
        // One undo entry reverts both.
        store.undo(key).unwrap();
        for ann in store.annotations(key).unwrap() {
            assert_eq!(ann.provenance, Provenance::AutoPending);
        }
    }

    #[test]
    fn delete_class_without_cascade_conflicts() {
        let mut store = store_with_image();
        store
            .commit("img/a.jpg", Mutation::Create(NewAnnotation::manual(a_box(), 0)))
            .unwrap();
        let err = store.delete_class(0, false).unwrap_err();
        assert!(matches!(
            err,
            OrilabelError::ClassDeletionConflict {
                class_index: 0,
                references: 1
            }
        ));
        assert_eq!(store.classes().len(), 2);
    }

    #[test]
    fn delete_class_with_cascade_removes_and_remaps() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        store
            .commit(key, Mutation::Create(NewAnnotation::manual(a_box(), 0)))
            .unwrap();
        store
            .commit(
                key,
                Mutation::Create(NewAnnotation::manual(a_box().translate(60.0, 0.0), 1)),
            )
            .unwrap();

        let summary = store.delete_class(0, true).unwrap();
        assert_eq!(summary.removed_annotations, 1);
        assert_eq!(summary.remapped_annotations, 1);
        assert_eq!(store.classes().names(), &["plane".to_string()]);

        let remaining = store.annotations(key).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].class_index, 0);
        // Histories were cleared; undo cannot resurrect the deleted class.
        assert_eq!(store.undo(key).unwrap(), UndoOutcome::EmptyStack);
    }

    #[test]
    fn paste_assigns_fresh_ids_as_one_entry() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        let outcome = store
            .commit(
                key,
                Mutation::CreateBatch(vec![
                    NewAnnotation::manual(a_box(), 0),
                    NewAnnotation::manual(a_box().translate(60.0, 0.0), 1),
                ]),
            )
            .unwrap();
        store.copy_to_clipboard(key, &outcome.created).unwrap();

        let pasted = store.paste_from_clipboard(key).unwrap();
        assert_eq!(pasted.created.len(), 2);
        assert!(pasted.created.iter().all(|id| !outcome.created.contains(id)));
        assert_eq!(store.annotation_count(key).unwrap(), 4);

        store.undo(key).unwrap();
        assert_eq!(store.annotation_count(key).unwrap(), 2);
    }

    #[test]
    fn reclassify_batch_is_one_entry() {
        let mut store = store_with_image();
        let key = "img/a.jpg";
        let ids = store
            .commit(
                key,
                Mutation::CreateBatch(vec![
                    NewAnnotation::manual(a_box(), 0),
                    NewAnnotation::manual(a_box().translate(60.0, 0.0), 0),
                ]),
            )
            .unwrap()
            .created;
        store
            .commit(
                key,
                Mutation::ReclassifyBatch {
                    ids: ids.clone(),
                    class_index: 1,
                },
            )
            .unwrap();
        for id in &ids {
            assert_eq!(store.annotation(key, *id).unwrap().class_index, 1);
        }
        store.undo(key).unwrap();
        for id in &ids {
            assert_eq!(store.annotation(key, *id).unwrap().class_index, 0);
        }
    }
}
