use std::path::PathBuf;
use thiserror::Error;

/// The main error type for orilabel operations.
#[derive(Debug, Error)]
pub enum OrilabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Unknown class index {class_index} (class list has {class_count} entries)")]
    UnknownClass {
        class_index: usize,
        class_count: usize,
    },

    #[error("Class {class_index} is still referenced by {references} annotation(s); pass cascade to delete them")]
    ClassDeletionConflict {
        class_index: usize,
        references: usize,
    },

    #[error("Auto-labeling failed: {message}")]
    AutoLabelFailed { message: String },

    #[error("Failed to persist {path}: {message}")]
    PersistenceFailed { path: PathBuf, message: String },

    #[error("Unknown image '{key}'")]
    UnknownImage { key: String },

    #[error("Image '{key}' is already registered")]
    DuplicateImage { key: String },

    #[error("Unknown annotation {id} in image '{key}'")]
    UnknownAnnotation { key: String, id: u64 },

    #[error("Failed to parse project file {path}: {source}")]
    ProjectParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write project file {path}: {source}")]
    ProjectWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse VOC XML from {path}: {message}")]
    VocXmlParse { path: PathBuf, message: String },

    #[error("Failed to parse label file {path} at line {line}: {message}")]
    LabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid dataset layout at {path}: {message}")]
    LayoutInvalid { path: PathBuf, message: String },

    #[error("Failed to parse data.yaml at {path}: {source}")]
    DataYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
