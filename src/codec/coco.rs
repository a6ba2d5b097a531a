//! COCO JSON interchange.
//!
//! COCO has no native oriented box, so each annotation is written three
//! ways at once: `bbox` holds the axis-aligned envelope (what detection
//! tooling expects), `segmentation` holds the four exact corners, and
//! `attributes.rotation` records the angle in radians for human readers.
//! Import prefers the segmentation polygon and reconstructs the oriented
//! box exactly; a plain COCO file with only `bbox` imports axis-aligned.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ExportSummary, ImportReport};
use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::{Point, RotatedBox};
use crate::model::{Annotation, ClassList, ImageAnnotationSet, ImageMeta, Split};
use crate::project::write_atomic;
use crate::store::AnnotationStore;

const ANNOTATIONS_FILE: &str = "annotations.json";

#[derive(Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
struct CocoCategory {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct CocoAttributes {
    rotation: f64,
}

#[derive(Serialize)]
struct CocoAnnotationOut {
    id: u64,
    image_id: u64,
    category_id: u64,
    bbox: [f64; 4],
    area: f64,
    segmentation: Vec<Vec<f64>>,
    attributes: CocoAttributes,
}

#[derive(Deserialize)]
struct CocoAnnotationIn {
    image_id: u64,
    category_id: u64,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
    #[serde(default)]
    segmentation: Option<Vec<Vec<f64>>>,
}

#[derive(Serialize)]
struct CocoDocumentOut {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotationOut>,
    categories: Vec<CocoCategory>,
}

#[derive(Deserialize)]
struct CocoDocumentIn {
    #[serde(default)]
    images: Vec<serde_json::Value>,
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
    #[serde(default)]
    categories: Vec<CocoCategory>,
}

/// Writes the whole store as one `annotations.json` under `dir`.
pub fn export(store: &AnnotationStore, dir: &Path) -> Result<ExportSummary, OrilabelError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(ANNOTATIONS_FILE);

    let categories: Vec<CocoCategory> = store
        .classes()
        .names()
        .iter()
        .enumerate()
        .map(|(index, name)| CocoCategory {
            id: index as u64 + 1,
            name: name.clone(),
        })
        .collect();

    let mut images = Vec::new();
    let mut annotations = Vec::new();
    let mut next_ann_id = 1u64;
    let mut summary = ExportSummary::default();

    for (image_index, key) in store.image_keys().iter().enumerate() {
        let meta = store.meta(key)?;
        let image_id = image_index as u64 + 1;
        images.push(CocoImage {
            id: image_id,
            file_name: meta.path.clone(),
            width: meta.width,
            height: meta.height,
        });
        summary.images += 1;

        for ann in store.annotations(key)? {
            let corners = ann.bbox.corners();
            let (xmin, ymin, xmax, ymax) = ann.bbox.envelope();
            annotations.push(CocoAnnotationOut {
                id: next_ann_id,
                image_id,
                category_id: ann.class_index as u64 + 1,
                bbox: [xmin, ymin, xmax - xmin, ymax - ymin],
                area: ann.bbox.area(),
                segmentation: vec![corners
                    .iter()
                    .flat_map(|p| [p.x, p.y])
                    .collect()],
                attributes: CocoAttributes {
                    rotation: ann.bbox.theta,
                },
            });
            next_ann_id += 1;
            summary.annotations += 1;
        }
    }

    let document = CocoDocumentOut {
        images,
        annotations,
        categories,
    };
    let json =
        serde_json::to_string_pretty(&document).map_err(|source| OrilabelError::ProjectWrite {
            path: path.clone(),
            source,
        })?;
    write_atomic(&path, json.as_bytes())?;
    log::info!(
        "exported {} image(s), {} annotation(s) as COCO to {}",
        summary.images,
        summary.annotations,
        path.display()
    );
    Ok(summary)
}

/// Reads a COCO dataset from `dir` (or a JSON file passed directly).
/// Malformed image or annotation records are skipped and reported.
pub fn import(
    dir: &Path,
    config: &EngineConfig,
) -> Result<(AnnotationStore, ImportReport), OrilabelError> {
    let path: PathBuf = if dir.is_file() {
        dir.to_path_buf()
    } else {
        dir.join(ANNOTATIONS_FILE)
    };
    let data = fs::read_to_string(&path)?;
    let document: CocoDocumentIn =
        serde_json::from_str(&data).map_err(|source| OrilabelError::CocoJsonParse {
            path: path.clone(),
            source,
        })?;

    // Category ids need not be contiguous; map them to dense class indices.
    let mut categories = document.categories.clone();
    categories.sort_by_key(|c| c.id);
    let category_to_class: BTreeMap<u64, usize> = categories
        .iter()
        .enumerate()
        .map(|(index, c)| (c.id, index))
        .collect();
    let classes = ClassList::from_names(categories.iter().map(|c| c.name.clone()));

    let mut report = ImportReport::default();
    let mut images: BTreeMap<u64, CocoImage> = BTreeMap::new();
    for value in document.images {
        match serde_json::from_value::<CocoImage>(value) {
            Ok(image) => {
                images.insert(image.id, image);
            }
            Err(err) => report.issue(&path, None, format!("malformed image record: {err}")),
        }
    }

    let mut per_image: BTreeMap<u64, Vec<(usize, RotatedBox)>> = BTreeMap::new();
    for value in document.annotations {
        let ann: CocoAnnotationIn = match serde_json::from_value(value) {
            Ok(ann) => ann,
            Err(err) => {
                report.issue(&path, None, format!("malformed annotation record: {err}"));
                continue;
            }
        };
        if !images.contains_key(&ann.image_id) {
            report.issue(
                &path,
                None,
                format!("annotation references unknown image {}", ann.image_id),
            );
            continue;
        }
        let Some(&class_index) = category_to_class.get(&ann.category_id) else {
            report.issue(
                &path,
                None,
                format!("annotation references unknown category {}", ann.category_id),
            );
            continue;
        };

        let bbox = match oriented_box_of(&ann) {
            Some(bbox) => bbox,
            None => {
                report.issue(&path, None, "annotation has neither polygon nor bbox");
                continue;
            }
        };
        per_image.entry(ann.image_id).or_default().push((class_index, bbox));
        report.annotations += 1;
    }

    let mut store = AnnotationStore::with_classes(config, classes);
    for (image_id, image) in images {
        let boxes = per_image.remove(&image_id).unwrap_or_default();
        let annotations: Vec<Annotation> = boxes
            .into_iter()
            .enumerate()
            .map(|(i, (class_index, bbox))| Annotation::new(i as u64 + 1, bbox, class_index))
            .collect();
        let next_id = annotations.len() as u64 + 1;
        let meta = ImageMeta::new(image.file_name, image.width, image.height);
        let set = ImageAnnotationSet::from_parts(meta, annotations, next_id);
        store.restore_set(set, Split::Unassigned);
        report.images += 1;
    }
    Ok((store, report))
}

/// Reconstructs the oriented box, preferring the exact corner polygon.
fn oriented_box_of(ann: &CocoAnnotationIn) -> Option<RotatedBox> {
    if let Some(polygons) = &ann.segmentation {
        if let Some(flat) = polygons.first() {
            if flat.len() >= 8 && flat.iter().all(|v| v.is_finite()) {
                let corners = [
                    Point::new(flat[0], flat[1]),
                    Point::new(flat[2], flat[3]),
                    Point::new(flat[4], flat[5]),
                    Point::new(flat[6], flat[7]),
                ];
                return Some(RotatedBox::from_corners(&corners));
            }
        }
    }
    let [x, y, w, h] = ann.bbox?;
    if ![x, y, w, h].iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(RotatedBox::new(x + w / 2.0, y + h / 2.0, w, h, 0.0))
}
