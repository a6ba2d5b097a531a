//! YOLO-OBB label files.
//!
//! One text file per image, one annotation per line:
//!
//! ```text
//! <class> <x1> <y1> <x2> <y2> <x3> <y3> <x4> <y4>
//! ```
//!
//! Corners are normalized by the image dimensions and written in the fixed
//! clockwise order of [`RotatedBox::corners`], so the rotation survives the
//! round trip exactly (up to the six written decimals). The dataset layout
//! follows the ultralytics convention: `labels/<split>/`, `images/<split>/`,
//! a `classes.txt` and a `data.yaml` naming the classes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use super::{ExportSummary, ImportReport};
use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::{Point, RotatedBox};
use crate::model::{Annotation, ClassList, ImageAnnotationSet, ImageMeta, Split};
use crate::store::AnnotationStore;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Writes the store as a YOLO-OBB dataset under `dir`.
///
/// Labels only: the engine never owns pixel data, so callers that want the
/// conventional `images/` tree alongside copy the files themselves.
pub fn export(store: &AnnotationStore, dir: &Path) -> Result<ExportSummary, OrilabelError> {
    let mut summary = ExportSummary::default();
    let mut used_names: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();

    for key in store.image_keys() {
        let meta = store.meta(&key)?;
        let split = store.split_of(&key);
        let mut label_dir = dir.join("labels");
        if let Some(split_dir) = split.dir_name() {
            label_dir = label_dir.join(split_dir);
        }
        fs::create_dir_all(&label_dir)?;

        let mut lines = String::new();
        for ann in store.annotations(&key)? {
            lines.push_str(&format_label_line(&ann, meta.width, meta.height));
            lines.push('\n');
            summary.annotations += 1;
        }
        let file_name = super::claim_file_name(
            used_names.entry(label_dir.clone()).or_default(),
            &key,
            "txt",
        );
        fs::write(label_dir.join(file_name), lines)?;
        summary.images += 1;
    }

    write_class_files(store, dir)?;
    log::info!(
        "exported {} image(s), {} annotation(s) as YOLO-OBB to {}",
        summary.images,
        summary.annotations,
        dir.display()
    );
    Ok(summary)
}

/// Reads a YOLO-OBB dataset from `dir`. Malformed lines and label files
/// without a resolvable image are skipped and reported.
pub fn import(
    dir: &Path,
    config: &EngineConfig,
) -> Result<(AnnotationStore, ImportReport), OrilabelError> {
    let classes = read_classes(dir)?;
    let labels_root = dir.join("labels");
    if !labels_root.is_dir() {
        return Err(OrilabelError::LayoutInvalid {
            path: dir.to_path_buf(),
            message: "no labels/ directory".to_string(),
        });
    }

    let mut store = AnnotationStore::with_classes(config, classes);
    let mut report = ImportReport::default();

    let mut label_files: Vec<PathBuf> = WalkDir::new(&labels_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    label_files.sort();

    for label_path in label_files {
        let split = split_of_label(&label_path);
        let Some((image_rel, width, height)) = resolve_image(dir, &label_path, split) else {
            report.issue(&label_path, None, "no matching image file to take dimensions from");
            continue;
        };

        let mut annotations = Vec::new();
        let mut next_id = 1u64;
        let data = fs::read_to_string(&label_path)?;
        for (index, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_label_line(line) {
                Ok((class_index, corners)) => {
                    if !store.classes().contains_index(class_index) {
                        report.issue(
                            &label_path,
                            Some(index + 1),
                            format!("class index {class_index} out of range"),
                        );
                        continue;
                    }
                    let denormalized = corners.map(|p| {
                        Point::new(p.x * f64::from(width), p.y * f64::from(height))
                    });
                    let bbox = RotatedBox::from_corners(&denormalized);
                    annotations.push(Annotation::new(next_id, bbox, class_index));
                    next_id += 1;
                    report.annotations += 1;
                }
                Err(message) => report.issue(&label_path, Some(index + 1), message),
            }
        }

        let meta = ImageMeta::new(image_rel, width, height);
        let set = ImageAnnotationSet::from_parts(meta, annotations, next_id);
        store.restore_set(set, split);
        report.images += 1;
    }

    Ok((store, report))
}

/// Renders one annotation as a label line, corners normalized to `[0, 1]`.
pub fn format_label_line(ann: &Annotation, width: u32, height: u32) -> String {
    let (w, h) = (f64::from(width), f64::from(height));
    let c = ann.bbox.corners();
    format!(
        "{} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
        ann.class_index,
        c[0].x / w,
        c[0].y / h,
        c[1].x / w,
        c[1].y / h,
        c[2].x / w,
        c[2].y / h,
        c[3].x / w,
        c[3].y / h,
    )
}

/// Parses one label line into a class index and four normalized corners.
pub fn parse_label_line(line: &str) -> Result<(usize, [Point; 4]), String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 9 {
        return Err(format!("expected 9 fields, found {}", tokens.len()));
    }
    let class_index: usize = tokens[0]
        .parse()
        .map_err(|_| format!("invalid class index '{}'", tokens[0]))?;
    let mut values = [0.0f64; 8];
    for (slot, token) in values.iter_mut().zip(&tokens[1..]) {
        *slot = token
            .parse()
            .map_err(|_| format!("invalid coordinate '{token}'"))?;
        if !slot.is_finite() {
            return Err(format!("non-finite coordinate '{token}'"));
        }
    }
    let corners = [
        Point::new(values[0], values[1]),
        Point::new(values[2], values[3]),
        Point::new(values[4], values[5]),
        Point::new(values[6], values[7]),
    ];
    Ok((class_index, corners))
}

fn write_class_files(store: &AnnotationStore, dir: &Path) -> Result<(), OrilabelError> {
    fs::create_dir_all(dir)?;
    let names = store.classes().names();

    let mut classes_txt = String::new();
    for name in names {
        classes_txt.push_str(name);
        classes_txt.push('\n');
    }
    fs::write(dir.join("classes.txt"), classes_txt)?;

    let mut yaml = String::from("path: .\ntrain: images/train\nval: images/val\ntest: images/test\n");
    yaml.push_str(&format!("nc: {}\n", names.len()));
    yaml.push_str("names:\n");
    for (index, name) in names.iter().enumerate() {
        yaml.push_str(&format!("  {index}: {name}\n"));
    }
    fs::write(dir.join("data.yaml"), yaml)?;
    Ok(())
}

#[derive(Deserialize)]
struct DataYaml {
    names: NamesField,
}

/// `names` appears in the wild both as a list and as an index map.
#[derive(Deserialize)]
#[serde(untagged)]
enum NamesField {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

impl NamesField {
    fn into_class_list(self) -> ClassList {
        match self {
            NamesField::List(names) => ClassList::from_names(names),
            NamesField::Map(map) => ClassList::from_names(map.into_values()),
        }
    }
}

fn read_classes(dir: &Path) -> Result<ClassList, OrilabelError> {
    let yaml_path = dir.join("data.yaml");
    if yaml_path.is_file() {
        let data = fs::read_to_string(&yaml_path)?;
        let parsed: DataYaml =
            serde_yaml::from_str(&data).map_err(|source| OrilabelError::DataYamlParse {
                path: yaml_path,
                source,
            })?;
        return Ok(parsed.names.into_class_list());
    }

    let txt_path = dir.join("classes.txt");
    if txt_path.is_file() {
        let data = fs::read_to_string(&txt_path)?;
        return Ok(ClassList::from_names(
            data.lines().map(str::trim).filter(|l| !l.is_empty()),
        ));
    }

    Err(OrilabelError::LayoutInvalid {
        path: dir.to_path_buf(),
        message: "neither data.yaml nor classes.txt present".to_string(),
    })
}

/// Split a label file belongs to, judged by its parent directory name.
fn split_of_label(label_path: &Path) -> Split {
    label_path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
        .unwrap_or(Split::Unassigned)
}

/// Finds the image file matching a label and probes its dimensions.
/// Returns the image path relative to the dataset root.
fn resolve_image(dir: &Path, label_path: &Path, split: Split) -> Option<(String, u32, u32)> {
    let stem = label_path.file_stem()?.to_str()?;
    let mut image_dir = dir.join("images");
    if let Some(split_dir) = split.dir_name() {
        image_dir = image_dir.join(split_dir);
    }
    for ext in IMAGE_EXTENSIONS {
        let candidate = image_dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            let size = imagesize::size(&candidate).ok()?;
            let rel = candidate
                .strip_prefix(dir)
                .unwrap_or(&candidate)
                .to_string_lossy()
                .replace('\\', "/");
            return Some((rel, size.width as u32, size.height as u32));
        }
    }
    None
}
