#![allow(dead_code)]

use std::fs;
use std::path::Path;

use orilabel::config::EngineConfig;
use orilabel::geometry::RotatedBox;
use orilabel::model::{ClassList, ImageMeta, Split};
use orilabel::store::{AnnotationStore, Mutation, NewAnnotation};

/// Minimal 24-bit BMP with the given dimensions; just enough header for
/// image-size probing.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// A store with two classes, two images and a few rotated annotations,
/// covering both splits and an unassigned image.
pub fn sample_store() -> AnnotationStore {
    let config = EngineConfig::default();
    let mut store =
        AnnotationStore::with_classes(&config, ClassList::from_names(["car", "plane"]));

    store
        .add_image(ImageMeta::new("alpha.bmp", 640, 480))
        .expect("add image");
    store
        .add_image(ImageMeta::new("beta.bmp", 800, 600))
        .expect("add image");

    store
        .commit(
            "alpha.bmp",
            Mutation::CreateBatch(vec![
                NewAnnotation::manual(RotatedBox::new(100.0, 100.0, 40.0, 20.0, 0.3), 0),
                NewAnnotation::manual(RotatedBox::new(320.0, 240.0, 120.0, 60.0, -0.7), 1),
            ]),
        )
        .expect("commit");
    store
        .commit(
            "beta.bmp",
            Mutation::Create(NewAnnotation::manual(
                RotatedBox::new(400.0, 300.0, 50.0, 50.0, 1.2),
                0,
            )),
        )
        .expect("commit");

    store.set_split("alpha.bmp", Split::Train).expect("set split");
    store
}

/// Annotations of one image keyed by the image file stem, as (class name,
/// box) pairs sorted for order-independent comparison.
pub fn annotations_by_stem(store: &AnnotationStore) -> Vec<(String, Vec<(String, RotatedBox)>)> {
    let mut out = Vec::new();
    for key in store.image_keys() {
        let stem = Path::new(&key)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        let mut anns: Vec<(String, RotatedBox)> = store
            .annotations(&key)
            .expect("known image")
            .iter()
            .map(|ann| {
                let name = store
                    .classes()
                    .name(ann.class_index)
                    .expect("valid class")
                    .to_string();
                (name, ann.bbox)
            })
            .collect();
        anns.sort_by(|a, b| {
            (a.0.as_str(), a.1.cx, a.1.cy)
                .partial_cmp(&(b.0.as_str(), b.1.cx, b.1.cy))
                .expect("finite boxes")
        });
        out.push((stem, anns));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Asserts two stores hold the same labeled geometry, image by image.
pub fn assert_same_annotations(expected: &AnnotationStore, actual: &AnnotationStore, eps: f64) {
    let expected = annotations_by_stem(expected);
    let actual = annotations_by_stem(actual);
    assert_eq!(
        expected.len(),
        actual.len(),
        "image count differs: {} vs {}",
        expected.len(),
        actual.len()
    );
    for ((stem_a, anns_a), (stem_b, anns_b)) in expected.iter().zip(actual.iter()) {
        assert_eq!(stem_a, stem_b, "image stems differ");
        assert_eq!(
            anns_a.len(),
            anns_b.len(),
            "annotation count differs for {stem_a}"
        );
        for ((name_a, box_a), (name_b, box_b)) in anns_a.iter().zip(anns_b.iter()) {
            assert_eq!(name_a, name_b, "class differs for {stem_a}");
            assert!(
                box_a.approx_eq(box_b, eps),
                "box differs for {stem_a}: {box_a:?} vs {box_b:?}"
            );
        }
    }
}
