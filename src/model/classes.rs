//! The project-wide ordered class list.

use serde::{Deserialize, Serialize};

use crate::error::OrilabelError;

/// Ordered list of class names; the position of a name is its canonical
/// class index, contiguous from 0, and the label written by every exporter.
///
/// Renaming preserves indices. Removal shifts the indices above the removed
/// entry down by one; the store is responsible for remapping annotations
/// accordingly (see `AnnotationStore::delete_class`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassList {
    names: Vec<String>,
}

impl ClassList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.names.len()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Appends a class, returning its index.
    pub fn push(&mut self, name: impl Into<String>) -> usize {
        self.names.push(name.into());
        self.names.len() - 1
    }

    /// Renames a class in place; the index is preserved.
    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> Result<(), OrilabelError> {
        let count = self.names.len();
        match self.names.get_mut(index) {
            Some(slot) => {
                *slot = name.into();
                Ok(())
            }
            None => Err(OrilabelError::UnknownClass {
                class_index: index,
                class_count: count,
            }),
        }
    }

    /// Removes a class, shifting higher indices down by one. The caller must
    /// have already handled annotations referencing the removed class.
    pub(crate) fn remove(&mut self, index: usize) -> Result<String, OrilabelError> {
        if index >= self.names.len() {
            return Err(OrilabelError::UnknownClass {
                class_index: index,
                class_count: self.names.len(),
            });
        }
        Ok(self.names.remove(index))
    }
}
