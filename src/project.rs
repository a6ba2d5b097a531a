//! Project file persistence.
//!
//! A project is one JSON document: format version, project name, class list
//! and per-image records. Writes go through a temp-file-then-rename so a
//! crash mid-write can never leave a truncated project behind.
//!
//! Loading is deliberately forgiving: unknown fields are ignored and a
//! malformed image or annotation record is skipped and counted rather than
//! failing the whole load. A labeling session with one corrupt record is
//! still worth opening.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::model::{Annotation, ClassList, ImageAnnotationSet, ImageMeta, Split};
use crate::store::AnnotationStore;

/// Version written into every project file. Readers reject files from a
/// newer engine rather than guessing at their semantics.
pub const FORMAT_VERSION: u32 = 1;

/// Persisted form of one image and its annotations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
    #[serde(default)]
    pub split: Split,
    #[serde(default)]
    pub next_annotation_id: u64,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct ProjectDocument {
    format_version: u32,
    name: String,
    classes: ClassList,
    images: Vec<serde_json::Value>,
}

/// What a forgiving load had to drop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub skipped_images: usize,
    pub skipped_annotations: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_images == 0 && self.skipped_annotations == 0
    }
}

/// A loaded project: name, rebuilt store, and what was skipped.
#[derive(Debug)]
pub struct LoadedProject {
    pub name: String,
    pub store: AnnotationStore,
    pub report: LoadReport,
}

/// Serializes and saves a project atomically.
pub fn save(path: &Path, name: &str, store: &AnnotationStore) -> Result<(), OrilabelError> {
    let mut images = Vec::with_capacity(store.image_count());
    for key in store.image_keys() {
        let record = image_record(store, &key)?;
        images.push(serde_json::to_value(record).map_err(|source| {
            OrilabelError::ProjectWrite {
                path: path.to_path_buf(),
                source,
            }
        })?);
    }
    let document = ProjectDocument {
        format_version: FORMAT_VERSION,
        name: name.to_string(),
        classes: store.classes().clone(),
        images,
    };
    let json =
        serde_json::to_string_pretty(&document).map_err(|source| OrilabelError::ProjectWrite {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, json.as_bytes())
}

/// Loads a project file, rebuilding the store and reporting skipped records.
pub fn load(path: &Path, config: &EngineConfig) -> Result<LoadedProject, OrilabelError> {
    let data = fs::read_to_string(path)?;
    let document: ProjectDocument =
        serde_json::from_str(&data).map_err(|source| OrilabelError::ProjectParse {
            path: path.to_path_buf(),
            source,
        })?;
    if document.format_version > FORMAT_VERSION {
        return Err(OrilabelError::UnsupportedFormat(format!(
            "project format version {} (this build reads up to {FORMAT_VERSION})",
            document.format_version
        )));
    }

    let mut report = LoadReport::default();
    let mut store = AnnotationStore::with_classes(config, document.classes);

    for value in document.images {
        let record: ImageRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("skipping malformed image record in {}: {err}", path.display());
                report.skipped_images += 1;
                continue;
            }
        };
        let (set, split, skipped) = restore_record(record, path);
        report.skipped_annotations += skipped;
        store.restore_set(set, split);
    }

    if !report.is_clean() {
        log::warn!(
            "loaded {} with {} image record(s) and {} annotation(s) skipped",
            path.display(),
            report.skipped_images,
            report.skipped_annotations
        );
    }
    Ok(LoadedProject {
        name: document.name,
        store,
        report,
    })
}

/// Builds the persisted record for one image.
pub(crate) fn image_record(
    store: &AnnotationStore,
    key: &str,
) -> Result<ImageRecord, OrilabelError> {
    let set = store.set(key)?;
    let meta = set.meta();
    let annotations = set
        .annotations()
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| OrilabelError::ProjectWrite {
            path: Path::new(key).to_path_buf(),
            source,
        })?;
    Ok(ImageRecord {
        path: meta.path.clone(),
        width: meta.width,
        height: meta.height,
        checksum: meta.checksum,
        split: store.split_of(key),
        next_annotation_id: set.next_id(),
        annotations,
    })
}

/// Turns a persisted record back into a live set, skipping annotations that
/// fail to parse. Returns the set, its split and the skip count.
pub(crate) fn restore_record(
    record: ImageRecord,
    origin: &Path,
) -> (ImageAnnotationSet, Split, usize) {
    let mut annotations = Vec::with_capacity(record.annotations.len());
    let mut skipped = 0;
    for value in record.annotations {
        match serde_json::from_value::<Annotation>(value) {
            Ok(ann) => annotations.push(ann),
            Err(err) => {
                log::warn!(
                    "skipping malformed annotation for {} in {}: {err}",
                    record.path,
                    origin.display()
                );
                skipped += 1;
            }
        }
    }
    let meta = ImageMeta {
        path: record.path,
        width: record.width,
        height: record.height,
        checksum: record.checksum,
    };
    let set = ImageAnnotationSet::from_parts(meta, annotations, record.next_annotation_id);
    (set, record.split, skipped)
}

/// Writes `contents` to a sibling temp file and renames it into place.
/// Rename within one directory is atomic on the platforms we care about.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OrilabelError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| OrilabelError::PersistenceFailed {
            path: path.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let fail = |message: String| OrilabelError::PersistenceFailed {
        path: path.to_path_buf(),
        message,
    };
    fs::write(&tmp, contents).map_err(|err| fail(format!("writing temp file: {err}")))?;
    fs::rename(&tmp, path).map_err(|err| {
        // Leave no temp droppings behind on failure.
        let _ = fs::remove_file(&tmp);
        fail(format!("renaming temp file into place: {err}"))
    })?;
    Ok(())
}
