use camino::Utf8PathBuf;
use serde_json::json;

use hybrid3_dataset_manager::domain::MaterialId;
use hybrid3_dataset_manager::store::{Metadata, Store};

fn test_store(temp: &tempfile::TempDir) -> Store {
    let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
    let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    Store::new_with_paths(project_root, cache_root)
}

#[test]
fn record_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);

    let record = json!({"pk": 20, "formula": "CH3NH3PbI3", "datasets": []});
    let path = store.project_record_path(MaterialId::new(20));
    Store::write_record(&path, &record).unwrap();

    let read_back = Store::read_record(&path).unwrap();
    assert_eq!(read_back, record);
}

#[test]
fn list_metadata_is_sorted_by_id() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);

    for id in [30u64, 7, 19] {
        let id = MaterialId::new(id);
        let meta = Metadata {
            source: "hybrid3".to_string(),
            id,
            formula: format!("F{id}"),
            downloaded_at: "2026-01-01T00:00:00Z".to_string(),
            tool: "test".to_string(),
            resolved_path: store.project_record_path(id).to_string(),
        };
        Store::write_metadata(&store.project_metadata_path(id), &meta).unwrap();
    }

    let listed = Store::list_metadata(store.project_root()).unwrap();
    let ids: Vec<u64> = listed.iter().map(|meta| meta.id.value()).collect();
    assert_eq!(ids, vec![7, 19, 30]);
}

#[test]
fn clear_project_leaves_cache_intact() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);

    let record = json!({"pk": 1, "datasets": []});
    Store::write_record(&store.project_record_path(MaterialId::new(1)), &record).unwrap();
    Store::write_record(&store.cache_record_path(MaterialId::new(1)), &record).unwrap();

    store.clear_project().unwrap();
    assert!(!Store::exists(&store.project_record_path(MaterialId::new(1))));
    assert!(Store::exists(&store.cache_record_path(MaterialId::new(1))));
}
