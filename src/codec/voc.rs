//! Pascal VOC XML, one file per image.
//!
//! Plain VOC only knows axis-aligned boxes. Each object therefore gets the
//! usual `<bndbox>` envelope plus a `<robndbox>` element in the style of the
//! rotated-labeling VOC dialects, carrying center, size and angle at full
//! precision. Import uses `<robndbox>` when present; a file from a plain VOC
//! tool falls back to the envelope, axis-aligned, and each such object is
//! counted as a lossy rotation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{ExportSummary, ImportReport};
use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::RotatedBox;
use crate::model::{Annotation, ClassList, ImageAnnotationSet, ImageMeta, Split};
use crate::store::AnnotationStore;

/// Writes one XML file per image into `dir`.
pub fn export(store: &AnnotationStore, dir: &Path) -> Result<ExportSummary, OrilabelError> {
    fs::create_dir_all(dir)?;
    let mut summary = ExportSummary::default();
    let mut used_names = BTreeSet::new();

    for key in store.image_keys() {
        let meta = store.meta(&key)?;
        let mut xml = String::new();
        xml.push_str("<annotation>\n");
        xml.push_str(&format!("  <filename>{}</filename>\n", escape(&meta.path)));
        xml.push_str("  <size>\n");
        xml.push_str(&format!("    <width>{}</width>\n", meta.width));
        xml.push_str(&format!("    <height>{}</height>\n", meta.height));
        xml.push_str("    <depth>3</depth>\n");
        xml.push_str("  </size>\n");

        for ann in store.annotations(&key)? {
            let name = store
                .classes()
                .name(ann.class_index)
                .unwrap_or("unknown")
                .to_string();
            let (xmin, ymin, xmax, ymax) = ann.bbox.envelope();
            xml.push_str("  <object>\n");
            xml.push_str(&format!("    <name>{}</name>\n", escape(&name)));
            xml.push_str("    <pose>Unspecified</pose>\n");
            xml.push_str("    <truncated>0</truncated>\n");
            xml.push_str("    <difficult>0</difficult>\n");
            xml.push_str("    <bndbox>\n");
            xml.push_str(&format!("      <xmin>{}</xmin>\n", xmin.round() as i64));
            xml.push_str(&format!("      <ymin>{}</ymin>\n", ymin.round() as i64));
            xml.push_str(&format!("      <xmax>{}</xmax>\n", xmax.round() as i64));
            xml.push_str(&format!("      <ymax>{}</ymax>\n", ymax.round() as i64));
            xml.push_str("    </bndbox>\n");
            xml.push_str("    <robndbox>\n");
            xml.push_str(&format!("      <cx>{}</cx>\n", ann.bbox.cx));
            xml.push_str(&format!("      <cy>{}</cy>\n", ann.bbox.cy));
            xml.push_str(&format!("      <w>{}</w>\n", ann.bbox.w));
            xml.push_str(&format!("      <h>{}</h>\n", ann.bbox.h));
            xml.push_str(&format!("      <angle>{}</angle>\n", ann.bbox.theta));
            xml.push_str("    </robndbox>\n");
            xml.push_str("  </object>\n");
            summary.annotations += 1;
        }
        xml.push_str("</annotation>\n");

        fs::write(
            dir.join(super::claim_file_name(&mut used_names, &key, "xml")),
            xml,
        )?;
        summary.images += 1;
    }
    log::info!(
        "exported {} image(s), {} annotation(s) as VOC XML to {}",
        summary.images,
        summary.annotations,
        dir.display()
    );
    Ok(summary)
}

/// Reads every `.xml` file under `dir`. Classes are collected in order of
/// first appearance; unreadable files or objects are skipped and reported.
pub fn import(
    dir: &Path,
    config: &EngineConfig,
) -> Result<(AnnotationStore, ImportReport), OrilabelError> {
    if !dir.is_dir() {
        return Err(OrilabelError::LayoutInvalid {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut xml_files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    xml_files.sort();

    let mut report = ImportReport::default();
    let mut classes = ClassList::new();
    let mut sets = Vec::new();

    for path in xml_files {
        let data = fs::read_to_string(&path)?;
        match parse_document(&data, &path, &mut classes, &mut report) {
            Ok(set) => {
                report.images += 1;
                sets.push(set);
            }
            Err(message) => report.issue(&path, None, message),
        }
    }

    let mut store = AnnotationStore::with_classes(config, classes);
    for set in sets {
        store.restore_set(set, Split::Unassigned);
    }
    Ok((store, report))
}

fn parse_document(
    data: &str,
    path: &Path,
    classes: &mut ClassList,
    report: &mut ImportReport,
) -> Result<ImageAnnotationSet, String> {
    let doc = roxmltree::Document::parse(data).map_err(|err| err.to_string())?;
    let root = doc.root_element();
    if root.tag_name().name() != "annotation" {
        return Err(format!("unexpected root element <{}>", root.tag_name().name()));
    }

    let filename = child_text(root, "filename")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.jpg", stem_of(&path.to_string_lossy())));
    let size = root
        .children()
        .find(|n| n.has_tag_name("size"))
        .ok_or("missing <size>")?;
    let width: u32 = parse_child(size, "width")?;
    let height: u32 = parse_child(size, "height")?;

    let mut annotations = Vec::new();
    let mut next_id = 1u64;
    for object in root.children().filter(|n| n.has_tag_name("object")) {
        let Some(name) = child_text(object, "name") else {
            report.issue(path, None, "object without <name>");
            continue;
        };
        let class_index = class_index_of(classes, name);

        let bbox = if let Some(robndbox) = object.children().find(|n| n.has_tag_name("robndbox")) {
            match rotated_box_of(robndbox) {
                Ok(bbox) => bbox,
                Err(message) => {
                    report.issue(path, None, format!("bad <robndbox>: {message}"));
                    continue;
                }
            }
        } else if let Some(bndbox) = object.children().find(|n| n.has_tag_name("bndbox")) {
            report.lossy_rotation += 1;
            match envelope_box_of(bndbox) {
                Ok(bbox) => bbox,
                Err(message) => {
                    report.issue(path, None, format!("bad <bndbox>: {message}"));
                    continue;
                }
            }
        } else {
            report.issue(path, None, "object without <robndbox> or <bndbox>");
            continue;
        };

        annotations.push(Annotation::new(next_id, bbox, class_index));
        next_id += 1;
        report.annotations += 1;
    }

    let meta = ImageMeta::new(filename, width, height);
    Ok(ImageAnnotationSet::from_parts(meta, annotations, next_id))
}

fn rotated_box_of(node: roxmltree::Node<'_, '_>) -> Result<RotatedBox, String> {
    let cx: f64 = parse_child(node, "cx")?;
    let cy: f64 = parse_child(node, "cy")?;
    let w: f64 = parse_child(node, "w")?;
    let h: f64 = parse_child(node, "h")?;
    let angle: f64 = parse_child(node, "angle")?;
    if ![cx, cy, w, h, angle].iter().all(|v| v.is_finite()) {
        return Err("non-finite field".to_string());
    }
    Ok(RotatedBox::new(cx, cy, w, h, angle))
}

fn envelope_box_of(node: roxmltree::Node<'_, '_>) -> Result<RotatedBox, String> {
    let xmin: f64 = parse_child(node, "xmin")?;
    let ymin: f64 = parse_child(node, "ymin")?;
    let xmax: f64 = parse_child(node, "xmax")?;
    let ymax: f64 = parse_child(node, "ymax")?;
    if xmax < xmin || ymax < ymin {
        return Err("inverted extent".to_string());
    }
    Ok(RotatedBox::new(
        (xmin + xmax) / 2.0,
        (ymin + ymax) / 2.0,
        xmax - xmin,
        ymax - ymin,
        0.0,
    ))
}

fn class_index_of(classes: &mut ClassList, name: &str) -> usize {
    classes
        .names()
        .iter()
        .position(|existing| existing == name)
        .unwrap_or_else(|| classes.push(name))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn parse_child<T: std::str::FromStr>(node: roxmltree::Node<'_, '_>, tag: &str) -> Result<T, String> {
    let text = child_text(node, tag).ok_or_else(|| format!("missing <{tag}>"))?;
    text.parse()
        .map_err(|_| format!("invalid <{tag}> value '{text}'"))
}

fn stem_of(key: &str) -> String {
    Path::new(key)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_voc_document(input: &str) {
    let mut classes = ClassList::new();
    let mut report = ImportReport::default();
    let _ = parse_document(input, Path::new("<fuzz>"), &mut classes, &mut report);
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> (Result<ImageAnnotationSet, String>, ClassList, ImportReport) {
        let mut classes = ClassList::new();
        let mut report = ImportReport::default();
        let result = parse_document(data, Path::new("t.xml"), &mut classes, &mut report);
        (result, classes, report)
    }

    #[test]
    fn robndbox_is_read_exactly() {
        let xml = r#"<annotation>
            <filename>a.jpg</filename>
            <size><width>640</width><height>480</height></size>
            <object>
                <name>car</name>
                <robndbox><cx>100.5</cx><cy>90.25</cy><w>40</w><h>20</h><angle>0.3</angle></robndbox>
            </object>
        </annotation>"#;
        let (result, classes, report) = parse(xml);
        let set = result.expect("parses");
        assert_eq!(classes.name(0), Some("car"));
        assert_eq!(report.lossy_rotation, 0);
        let bbox = set.annotations()[0].bbox;
        assert!(bbox.approx_eq(&RotatedBox::new(100.5, 90.25, 40.0, 20.0, 0.3), 1e-12));
    }

    #[test]
    fn plain_bndbox_imports_axis_aligned_and_counts_lossy() {
        let xml = r#"<annotation>
            <filename>a.jpg</filename>
            <size><width>640</width><height>480</height></size>
            <object>
                <name>plane</name>
                <bndbox><xmin>10</xmin><ymin>20</ymin><xmax>50</xmax><ymax>40</ymax></bndbox>
            </object>
        </annotation>"#;
        let (result, _, report) = parse(xml);
        let set = result.expect("parses");
        assert_eq!(report.lossy_rotation, 1);
        let bbox = set.annotations()[0].bbox;
        assert!(bbox.approx_eq(&RotatedBox::new(30.0, 30.0, 40.0, 20.0, 0.0), 1e-12));
    }

    #[test]
    fn bad_object_is_skipped_rest_survives() {
        let xml = r#"<annotation>
            <filename>a.jpg</filename>
            <size><width>640</width><height>480</height></size>
            <object><name>car</name></object>
            <object>
                <name>car</name>
                <robndbox><cx>5</cx><cy>5</cy><w>4</w><h>4</h><angle>0</angle></robndbox>
            </object>
        </annotation>"#;
        let (result, _, report) = parse(xml);
        let set = result.expect("parses");
        assert_eq!(set.annotations().len(), 1);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn missing_size_fails_the_file() {
        let xml = r#"<annotation><filename>a.jpg</filename></annotation>"#;
        let (result, _, _) = parse(xml);
        assert!(result.is_err());
    }

    #[test]
    fn class_names_are_escaped() {
        assert_eq!(escape("a<b&c"), "a&lt;b&amp;c");
    }
}
