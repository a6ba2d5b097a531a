//! Interactive editing state machine.
//!
//! The editor translates pointer and key events into store commits. It owns
//! no annotation data: while a gesture is in flight the provisional geometry
//! lives in the state machine as a preview, and only `pointer_up` turns it
//! into a single commit. Escape abandons the preview without touching the
//! store, which is what makes "one gesture, one undo entry" hold.

use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::{nearest_handle, resize_from_handle, Handle, Point, RotatedBox};
use crate::model::AnnotationId;
use crate::store::{AnnotationStore, Mutation, NewAnnotation};

/// What kind of transform a drag is performing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransformKind {
    Move,
    Resize(Handle),
    Rotate { start_angle: f64 },
}

/// The editor's interaction state.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorState {
    Idle,
    /// Rubber-banding a new axis-aligned box.
    Drawing { origin: Point, current: Point },
    Selected {
        id: AnnotationId,
    },
    /// Mid-drag on an existing annotation; `preview` is shown but not
    /// committed until the pointer is released.
    Transforming {
        id: AnnotationId,
        kind: TransformKind,
        before: RotatedBox,
        preview: RotatedBox,
        grab: Point,
    },
    MultiSelect {
        ids: Vec<AnnotationId>,
    },
}

/// Non-pointer input the editor reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Delete,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
}

/// Pointer/keyboard driven editor for one image at a time.
#[derive(Debug)]
pub struct Editor {
    image_key: String,
    state: EditorState,
    active_class: usize,
    handle_tolerance: f64,
    min_drag_distance: f64,
    min_box_side: f64,
    nudge_step: f64,
}

impl Editor {
    pub fn new(config: &EngineConfig, image_key: impl Into<String>) -> Self {
        Self {
            image_key: image_key.into(),
            state: EditorState::Idle,
            active_class: 0,
            handle_tolerance: config.handle_tolerance,
            min_drag_distance: config.min_drag_distance,
            min_box_side: config.min_box_side,
            nudge_step: config.nudge_step,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn image_key(&self) -> &str {
        &self.image_key
    }

    /// Switches the active image, abandoning any in-flight gesture.
    pub fn set_image(&mut self, image_key: impl Into<String>) {
        self.image_key = image_key.into();
        self.state = EditorState::Idle;
    }

    /// Class assigned to newly drawn boxes.
    pub fn set_active_class(&mut self, class_index: usize) {
        self.active_class = class_index;
    }

    /// Currently selected annotation ids, in selection order.
    pub fn selection(&self) -> Vec<AnnotationId> {
        match &self.state {
            EditorState::Selected { id } => vec![*id],
            EditorState::Transforming { id, .. } => vec![*id],
            EditorState::MultiSelect { ids } => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Provisional geometry to render during a gesture, if any.
    pub fn preview(&self) -> Option<RotatedBox> {
        match &self.state {
            EditorState::Drawing { origin, current } => {
                Some(RotatedBox::from_drag(*origin, *current))
            }
            EditorState::Transforming { preview, .. } => Some(*preview),
            _ => None,
        }
    }

    pub fn pointer_down(
        &mut self,
        store: &AnnotationStore,
        p: Point,
        shift: bool,
    ) -> Result<(), OrilabelError> {
        // A handle on the selected box wins over everything else.
        if let EditorState::Selected { id } = self.state {
            let bbox = store.annotation(&self.image_key, id)?.bbox;
            if let Some(handle) = nearest_handle(&bbox, p, self.handle_tolerance) {
                let kind = match handle {
                    Handle::Rotation => TransformKind::Rotate {
                        start_angle: bbox.theta,
                    },
                    other => TransformKind::Resize(other),
                };
                self.state = EditorState::Transforming {
                    id,
                    kind,
                    before: bbox,
                    preview: bbox,
                    grab: p,
                };
                return Ok(());
            }
        }

        match self.hit_test(store, p)? {
            Some(hit) => {
                if shift {
                    self.toggle_multi(hit);
                } else {
                    let bbox = store.annotation(&self.image_key, hit)?.bbox;
                    self.state = EditorState::Transforming {
                        id: hit,
                        kind: TransformKind::Move,
                        before: bbox,
                        preview: bbox,
                        grab: p,
                    };
                }
            }
            None => {
                if !shift {
                    // Empty space: deselect and start rubber-banding.
                    self.state = EditorState::Drawing {
                        origin: p,
                        current: p,
                    };
                }
            }
        }
        Ok(())
    }

    pub fn pointer_move(&mut self, p: Point) {
        match &mut self.state {
            EditorState::Drawing { current, .. } => *current = p,
            EditorState::Transforming {
                kind,
                before,
                preview,
                grab,
                ..
            } => {
                *preview = match *kind {
                    TransformKind::Move => before.translate(p.x - grab.x, p.y - grab.y),
                    TransformKind::Resize(handle) => {
                        resize_from_handle(before, handle, p, self.min_box_side)
                    }
                    TransformKind::Rotate { start_angle } => {
                        let center = before.center();
                        let from = (grab.y - center.y).atan2(grab.x - center.x);
                        let to = (p.y - center.y).atan2(p.x - center.x);
                        RotatedBox::new(
                            before.cx,
                            before.cy,
                            before.w,
                            before.h,
                            start_angle + (to - from),
                        )
                    }
                };
            }
            _ => {}
        }
    }

    /// Ends the current gesture, committing at most one mutation.
    pub fn pointer_up(
        &mut self,
        store: &mut AnnotationStore,
        p: Point,
    ) -> Result<(), OrilabelError> {
        match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::Drawing { origin, .. } => {
                if origin.distance(p) < self.min_drag_distance {
                    // A click, not a draw.
                    return Ok(());
                }
                let bbox = RotatedBox::from_drag(origin, p);
                let outcome = store.commit(
                    &self.image_key,
                    Mutation::Create(NewAnnotation::manual(bbox, self.active_class)),
                )?;
                self.state = EditorState::Selected {
                    id: outcome.created[0],
                };
                Ok(())
            }
            EditorState::Transforming {
                id,
                before,
                preview,
                ..
            } => {
                self.state = EditorState::Selected { id };
                if !preview.approx_eq(&before, 1e-9) {
                    store.commit(
                        &self.image_key,
                        Mutation::Update {
                            id,
                            bbox: Some(preview),
                            class_index: None,
                        },
                    )?;
                }
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    pub fn handle_key(
        &mut self,
        store: &mut AnnotationStore,
        key: Key,
    ) -> Result<(), OrilabelError> {
        match key {
            Key::Escape => {
                // Abandon any in-flight gesture; collapse selection.
                self.state = match std::mem::replace(&mut self.state, EditorState::Idle) {
                    EditorState::Transforming { id, .. } => EditorState::Selected { id },
                    _ => EditorState::Idle,
                };
                Ok(())
            }
            Key::Delete => self.delete_selection(store),
            Key::ArrowLeft => self.nudge(store, -self.nudge_step, 0.0),
            Key::ArrowRight => self.nudge(store, self.nudge_step, 0.0),
            Key::ArrowUp => self.nudge(store, 0.0, -self.nudge_step),
            Key::ArrowDown => self.nudge(store, 0.0, self.nudge_step),
        }
    }

    /// Reassigns every selected annotation to `class_index` as one commit.
    pub fn reclassify_selection(
        &mut self,
        store: &mut AnnotationStore,
        class_index: usize,
    ) -> Result<(), OrilabelError> {
        let ids = self.selection();
        if ids.is_empty() {
            return Ok(());
        }
        store.commit(
            &self.image_key,
            Mutation::ReclassifyBatch { ids, class_index },
        )?;
        Ok(())
    }

    fn delete_selection(&mut self, store: &mut AnnotationStore) -> Result<(), OrilabelError> {
        match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::Selected { id } => {
                store.commit(&self.image_key, Mutation::Delete(id))?;
                Ok(())
            }
            EditorState::MultiSelect { ids } => {
                store.commit(&self.image_key, Mutation::DeleteBatch(ids))?;
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    /// Each arrow keypress is its own gesture and so its own undo entry.
    fn nudge(
        &mut self,
        store: &mut AnnotationStore,
        dx: f64,
        dy: f64,
    ) -> Result<(), OrilabelError> {
        let EditorState::Selected { id } = self.state else {
            return Ok(());
        };
        let bbox = store.annotation(&self.image_key, id)?.bbox;
        store.commit(
            &self.image_key,
            Mutation::Update {
                id,
                bbox: Some(bbox.translate(dx, dy)),
                class_index: None,
            },
        )?;
        Ok(())
    }

    fn toggle_multi(&mut self, id: AnnotationId) {
        let mut ids = self.selection();
        if let Some(pos) = ids.iter().position(|existing| *existing == id) {
            ids.remove(pos);
        } else {
            ids.push(id);
        }
        self.state = match ids.len() {
            0 => EditorState::Idle,
            1 => EditorState::Selected { id: ids[0] },
            _ => EditorState::MultiSelect { ids },
        };
    }

    /// Topmost annotation under the pointer; later annotations draw on top.
    fn hit_test(
        &self,
        store: &AnnotationStore,
        p: Point,
    ) -> Result<Option<AnnotationId>, OrilabelError> {
        Ok(store
            .annotations(&self.image_key)?
            .iter()
            .rev()
            .find(|ann| ann.bbox.contains(p))
            .map(|ann| ann.id))
    }
}
