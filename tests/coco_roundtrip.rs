use std::fs;

use orilabel::codec::{export_dataset, import_dataset, ExportFormat, ImportFormat};
use orilabel::config::EngineConfig;

mod common;

const EPS: f64 = 1e-9;

#[test]
fn roundtrip_preserves_rotated_boxes_exactly() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("coco");
    let store = common::sample_store();

    let summary = export_dataset(&store, ExportFormat::Coco, &root).unwrap();
    assert_eq!(summary.images, 2);
    assert_eq!(summary.annotations, 3);

    let (restored, report) =
        import_dataset(ImportFormat::Coco, &root, &EngineConfig::default()).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.lossy_rotation, 0);
    assert_eq!(restored.classes(), store.classes());
    common::assert_same_annotations(&store, &restored, EPS);

    // Dimensions travel inside the JSON.
    let meta = restored.meta("alpha.bmp").unwrap();
    assert_eq!((meta.width, meta.height), (640, 480));
}

#[test]
fn exported_bbox_is_the_envelope() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("coco");
    let store = common::sample_store();
    export_dataset(&store, ExportFormat::Coco, &root).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("annotations.json")).unwrap()).unwrap();
    for ann in json["annotations"].as_array().unwrap() {
        let bbox = ann["bbox"].as_array().unwrap();
        let seg = ann["segmentation"][0].as_array().unwrap();
        assert_eq!(bbox.len(), 4);
        assert_eq!(seg.len(), 8);
        // Every polygon x lies inside [bbox x, bbox x + bbox w].
        let x = bbox[0].as_f64().unwrap();
        let w = bbox[2].as_f64().unwrap();
        for pair in seg.chunks(2) {
            let px = pair[0].as_f64().unwrap();
            assert!(px >= x - 1e-6 && px <= x + w + 1e-6);
        }
        assert!(ann["attributes"]["rotation"].is_number());
    }
}

#[test]
fn plain_coco_without_polygons_imports_axis_aligned() {
    let temp = tempfile::tempdir().unwrap();
    let json = r#"{
        "images": [{"id": 1, "file_name": "a.jpg", "width": 100, "height": 100}],
        "annotations": [
            {"id": 1, "image_id": 1, "category_id": 3, "bbox": [10.0, 20.0, 40.0, 20.0]}
        ],
        "categories": [{"id": 3, "name": "car"}]
    }"#;
    fs::write(temp.path().join("annotations.json"), json).unwrap();

    let (restored, report) =
        import_dataset(ImportFormat::Coco, temp.path(), &EngineConfig::default()).unwrap();
    assert!(report.skipped.is_empty());
    let anns = restored.annotations("a.jpg").unwrap();
    assert_eq!(anns.len(), 1);
    assert_eq!(anns[0].class_index, 0);
    assert_eq!(anns[0].bbox.theta, 0.0);
    assert!((anns[0].bbox.cx - 30.0).abs() < 1e-9);
}

#[test]
fn malformed_records_are_skipped_not_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let json = r#"{
        "images": [
            {"id": 1, "file_name": "a.jpg", "width": 100, "height": 100},
            {"id": "broken"}
        ],
        "annotations": [
            {"id": 1, "image_id": 1, "category_id": 1, "bbox": [1.0, 1.0, 10.0, 10.0]},
            {"id": 2, "image_id": 99, "category_id": 1, "bbox": [1.0, 1.0, 10.0, 10.0]},
            {"id": 3, "image_id": 1, "category_id": 42, "bbox": [1.0, 1.0, 10.0, 10.0]},
            {"id": 4, "image_id": 1, "category_id": 1}
        ],
        "categories": [{"id": 1, "name": "car"}]
    }"#;
    fs::write(temp.path().join("annotations.json"), json).unwrap();

    let (restored, report) =
        import_dataset(ImportFormat::Coco, temp.path(), &EngineConfig::default()).unwrap();
    assert_eq!(restored.image_count(), 1);
    assert_eq!(restored.annotation_count("a.jpg").unwrap(), 1);
    // Broken image, orphan annotation, unknown category, missing geometry.
    assert_eq!(report.skipped.len(), 4);
}

#[test]
fn unparseable_top_level_json_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("annotations.json"), "not json at all").unwrap();
    let err =
        import_dataset(ImportFormat::Coco, temp.path(), &EngineConfig::default()).unwrap_err();
    assert!(matches!(err, orilabel::OrilabelError::CocoJsonParse { .. }));
}
