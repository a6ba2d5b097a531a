//! Interchange formats for oriented-box datasets.
//!
//! Three codecs share the same contract: export walks the store and writes
//! files, import rebuilds a store and reports everything it had to skip.
//! Import never fails on a single malformed record; it fails only when the
//! overall layout is unusable (missing directory, unparseable top-level
//! document).
//!
//! Rotation fidelity varies by format. YOLO-OBB and the rotated-box VOC
//! extension carry the angle exactly; plain VOC boxes do not, and every
//! import that had to assume an axis-aligned box is counted in
//! [`ImportReport::lossy_rotation`].

pub mod coco;
pub mod voc;
pub mod yolo_obb;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::store::AnnotationStore;

/// A dataset format the engine can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    YoloObb,
    Coco,
    Voc,
}

/// A dataset format the engine can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportFormat {
    YoloObb,
    Coco,
    Voc,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::YoloObb => "yolo-obb",
            ExportFormat::Coco => "coco",
            ExportFormat::Voc => "voc",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = OrilabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yolo-obb" | "yolo_obb" | "yolo" => Ok(ExportFormat::YoloObb),
            "coco" => Ok(ExportFormat::Coco),
            "voc" | "pascal-voc" => Ok(ExportFormat::Voc),
            other => Err(OrilabelError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl FromStr for ImportFormat {
    type Err = OrilabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let export: ExportFormat = s.parse()?;
        Ok(match export {
            ExportFormat::YoloObb => ImportFormat::YoloObb,
            ExportFormat::Coco => ImportFormat::Coco,
            ExportFormat::Voc => ImportFormat::Voc,
        })
    }
}

/// One record an import had to drop, with enough context to find it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportIssue {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub message: String,
}

impl ImportIssue {
    fn new(path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

/// What an import read and what it skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    pub images: usize,
    pub annotations: usize,
    pub skipped: Vec<ImportIssue>,
    /// Annotations whose rotation the source format could not represent;
    /// they were imported axis-aligned.
    pub lossy_rotation: usize,
}

impl ImportReport {
    fn issue(&mut self, path: &Path, line: Option<usize>, message: impl Into<String>) {
        let issue = ImportIssue::new(path, line, message);
        log::warn!(
            "import skipped {}{}: {}",
            issue.path.display(),
            issue.line.map(|l| format!(":{l}")).unwrap_or_default(),
            issue.message
        );
        self.skipped.push(issue);
    }
}

/// What an export wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub images: usize,
    pub annotations: usize,
}

/// Claims an output file name for `key` within one directory. Per-image
/// exports name files by the image's stem; two keys can share a stem
/// (`scenes/a.jpg`, `city/a.jpg`), in which case the later one gets its full
/// key flattened into the name so no file is silently overwritten.
pub(crate) fn claim_file_name(
    used: &mut std::collections::BTreeSet<String>,
    key: &str,
    ext: &str,
) -> String {
    let stem = Path::new(key)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string());
    let mut name = format!("{stem}.{ext}");
    if used.contains(&name) {
        let flat: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        name = format!("{flat}.{ext}");
        let mut n = 2;
        while used.contains(&name) {
            name = format!("{flat}-{n}.{ext}");
            n += 1;
        }
    }
    used.insert(name.clone());
    name
}

/// Exports the store into `dir` in the given format.
pub fn export_dataset(
    store: &AnnotationStore,
    format: ExportFormat,
    dir: &Path,
) -> Result<ExportSummary, OrilabelError> {
    match format {
        ExportFormat::YoloObb => yolo_obb::export(store, dir),
        ExportFormat::Coco => coco::export(store, dir),
        ExportFormat::Voc => voc::export(store, dir),
    }
}

/// Imports a dataset from `dir`, rebuilding a store from scratch.
pub fn import_dataset(
    format: ImportFormat,
    dir: &Path,
    config: &EngineConfig,
) -> Result<(AnnotationStore, ImportReport), OrilabelError> {
    match format {
        ImportFormat::YoloObb => yolo_obb::import(dir, config),
        ImportFormat::Coco => coco::import(dir, config),
        ImportFormat::Voc => voc::import(dir, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_stems_get_qualified_names() {
        let mut used = std::collections::BTreeSet::new();
        assert_eq!(claim_file_name(&mut used, "scenes/a.jpg", "txt"), "a.txt");
        assert_eq!(
            claim_file_name(&mut used, "city/a.jpg", "txt"),
            "city_a.jpg.txt"
        );
        // Unrelated stems are untouched.
        assert_eq!(claim_file_name(&mut used, "b.jpg", "txt"), "b.txt");
    }

    #[test]
    fn format_names_parse_and_display() {
        for name in ["yolo-obb", "coco", "voc"] {
            let format: ExportFormat = name.parse().expect("known format");
            assert_eq!(format.to_string(), name);
            assert!(name.parse::<ImportFormat>().is_ok());
        }
        assert!(matches!(
            "labelme".parse::<ExportFormat>(),
            Err(OrilabelError::UnsupportedFormat(_))
        ));
    }
}
