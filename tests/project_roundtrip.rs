use std::fs;

use orilabel::config::EngineConfig;
use orilabel::dataset::DatasetManager;
use orilabel::geometry::RotatedBox;
use orilabel::model::{Provenance, Split};
use orilabel::project;
use orilabel::store::{Mutation, NewAnnotation};

mod common;

#[test]
fn project_roundtrip_preserves_provenance_and_confidence() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("project.json");
    let mut store = common::sample_store();
    store
        .commit(
            "beta.bmp",
            Mutation::Create(NewAnnotation {
                bbox: RotatedBox::new(100.0, 100.0, 30.0, 15.0, 0.4),
                class_index: 1,
                confidence: Some(0.66),
                provenance: Provenance::AutoPending,
            }),
        )
        .unwrap();

    project::save(&path, "aerial", &store).unwrap();
    let loaded = project::load(&path, &EngineConfig::default()).unwrap();
    assert_eq!(loaded.name, "aerial");
    assert!(loaded.report.is_clean());

    let pending: Vec<_> = loaded
        .store
        .annotations("beta.bmp")
        .unwrap()
        .into_iter()
        .filter(|a| a.provenance == Provenance::AutoPending)
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].confidence, Some(0.66));
    common::assert_same_annotations(&store, &loaded.store, 1e-12);
}

#[test]
fn full_session_cycle_save_autosave_crash_recover() {
    let temp = tempfile::tempdir().unwrap();
    let mut manager = DatasetManager::new(temp.path(), 5);
    let mut store = common::sample_store();

    // Session one: open, save cleanly.
    manager.mark_session_open().unwrap();
    project::save(&manager.project_file(), "aerial", &store).unwrap();
    store.mark_all_clean();
    manager.mark_clean_save().unwrap();
    assert!(manager.recover().unwrap().is_none());

    // Session two: open, edit, autosave, crash.
    manager.mark_session_open().unwrap();
    store
        .commit(
            "alpha.bmp",
            Mutation::Create(NewAnnotation::manual(
                RotatedBox::new(500.0, 300.0, 60.0, 30.0, 0.9),
                0,
            )),
        )
        .unwrap();
    manager.autosave(&mut store).unwrap();
    drop(store);

    // Session three: load the stale project file, then apply recovery.
    let mut manager = DatasetManager::new(temp.path(), 5);
    let loaded = project::load(&manager.project_file(), &EngineConfig::default()).unwrap();
    let mut store = loaded.store;
    assert_eq!(store.annotation_count("alpha.bmp").unwrap(), 2);

    let recovery = manager.recover().unwrap().expect("unclean session");
    assert_eq!(recovery.image_keys(), vec!["alpha.bmp".to_string()]);
    manager.apply_recovery(&mut store, recovery);
    assert_eq!(store.annotation_count("alpha.bmp").unwrap(), 3);
    // Recovered split survives too.
    assert_eq!(store.split_of("alpha.bmp"), Split::Train);

    project::save(&manager.project_file(), "aerial", &store).unwrap();
    store.mark_all_clean();
    manager.mark_clean_save().unwrap();
    assert!(manager.recover().unwrap().is_none());
}

#[test]
fn backup_files_are_complete_projects() {
    let temp = tempfile::tempdir().unwrap();
    let manager = DatasetManager::new(temp.path(), 5);
    let store = common::sample_store();
    let backup_path = manager.create_backup("aerial", &store).unwrap();

    let loaded = project::load(&backup_path, &EngineConfig::default()).unwrap();
    assert_eq!(loaded.name, "aerial");
    common::assert_same_annotations(&store, &loaded.store, 1e-12);
}

#[test]
fn hand_edited_project_with_extra_fields_still_loads() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("project.json");
    let store = common::sample_store();
    project::save(&path, "aerial", &store).unwrap();

    // Inject unknown fields at several levels, as a future version might.
    let mut doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    doc["editor_layout"] = serde_json::json!({"zoom": 2.0});
    doc["images"][0]["thumbnail"] = serde_json::json!("cache/alpha.png");
    fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let loaded = project::load(&path, &EngineConfig::default()).unwrap();
    assert!(loaded.report.is_clean());
    common::assert_same_annotations(&store, &loaded.store, 1e-12);
}
