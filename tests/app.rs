use camino::Utf8PathBuf;
use serde_json::{Value, json};

use hybrid3_dataset_manager::app::{App, FetchOptions};
use hybrid3_dataset_manager::domain::{MaterialId, MaterialSelection};
use hybrid3_dataset_manager::error::Hybrid3Error;
use hybrid3_dataset_manager::hybrid3::Hybrid3Client;
use hybrid3_dataset_manager::output::JsonOutput;
use hybrid3_dataset_manager::store::Store;

struct MockHybrid3;

impl Hybrid3Client for MockHybrid3 {
    fn fetch_systems(&self) -> Result<Vec<Value>, Hybrid3Error> {
        Ok(vec![
            json!({"pk": 1, "formula": "A", "organic": "orgA", "inorganic": "inA"}),
            json!({"pk": 2, "formula": "B", "organic": "orgB", "inorganic": "inB"}),
        ])
    }

    fn fetch_datasets(&self, id: MaterialId) -> Result<Vec<Value>, Hybrid3Error> {
        let bandgap = json!({
            "pk": 301,
            "primary_property": {"id": 1, "name": "bandgap"},
            "primary_unit": {"label": "eV"},
            "secondary_property": null,
            "subsets": [{"datapoints": [
                {"values": [{"qualifier": "primary", "formatted": "1.6"}]},
            ]}],
        });
        let pl = json!({
            "pk": 302,
            "primary_property": {"id": 2, "name": "PL"},
            "primary_unit": {"label": "nm"},
            "secondary_property": null,
            "subsets": [{"datapoints": [
                {"values": [{"qualifier": "primary", "formatted": "770"}]},
            ]}],
        });
        match id.value() {
            1 => Ok(vec![bandgap]),
            2 => Ok(vec![bandgap, pl]),
            _ => Err(Hybrid3Error::MaterialNotFound(id.to_string())),
        }
    }

    fn base_url(&self) -> &str {
        "https://materials.example.org"
    }
}

fn test_store(temp: &tempfile::TempDir) -> Store {
    let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
    let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    Store::new_with_paths(project_root, cache_root)
}

fn options() -> FetchOptions {
    FetchOptions {
        force: false,
        no_cache: false,
        dry_run: false,
    }
}

#[test]
fn fetch_prefers_project_store_over_download() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(test_store(&temp), MockHybrid3);

    let first = app
        .fetch(
            Some(MaterialSelection::Single(MaterialId::new(1))),
            None,
            options(),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(first.items[0].action, "download");

    let second = app
        .fetch(
            Some(MaterialSelection::Single(MaterialId::new(1))),
            None,
            options(),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(second.items[0].action, "project");
}

#[test]
fn fetch_prefers_cache_over_download() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);

    let cache_path = store.cache_record_path(MaterialId::new(1));
    Store::write_record(
        &cache_path,
        &json!({"pk": 1, "formula": "A", "organic": "orgA", "inorganic": "inA", "datasets": []}),
    )
    .unwrap();

    let app = App::new(store.clone(), MockHybrid3);
    let result = app
        .fetch(
            Some(MaterialSelection::Single(MaterialId::new(1))),
            None,
            options(),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.items[0].action, "cache");
    assert!(Store::exists(&store.project_record_path(MaterialId::new(1))));
}

#[test]
fn force_redownloads_over_existing_record() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(test_store(&temp), MockHybrid3);

    app.fetch(
        Some(MaterialSelection::Single(MaterialId::new(1))),
        None,
        options(),
        &JsonOutput,
    )
    .unwrap();

    let forced = app
        .fetch(
            Some(MaterialSelection::Single(MaterialId::new(1))),
            None,
            FetchOptions {
                force: true,
                no_cache: false,
                dry_run: false,
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(forced.items[0].action, "download");
}

#[test]
fn table_merges_fetched_materials() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(test_store(&temp), MockHybrid3);

    app.fetch(
        Some(MaterialSelection::Range(MaterialId::new(1), MaterialId::new(2))),
        None,
        options(),
        &JsonOutput,
    )
    .unwrap();

    let result = app.table(None, &JsonOutput).unwrap();
    assert_eq!(result.row_count, 2);
    assert!(result.skipped.is_empty());
    assert_eq!(
        result.table.column("bandgap(1)").unwrap(),
        &[Some("Unit: eV".to_string()), Some("Unit: eV".to_string())]
    );
    assert_eq!(
        result.table.column("PL(2)").unwrap(),
        &[None, Some("Unit: nm".to_string())]
    );
}

#[test]
fn table_skips_malformed_record_and_keeps_good_rows() {
    let temp = tempfile::tempdir().unwrap();
    let store = test_store(&temp);
    let app = App::new(store.clone(), MockHybrid3);

    app.fetch(
        Some(MaterialSelection::Single(MaterialId::new(1))),
        None,
        options(),
        &JsonOutput,
    )
    .unwrap();

    // Overwrite material 2's record with one missing its identity fields.
    let bad_path = store.project_record_path(MaterialId::new(2));
    Store::write_record(&bad_path, &json!({"pk": 2, "datasets": []})).unwrap();
    Store::write_metadata(
        &store.project_metadata_path(MaterialId::new(2)),
        &hybrid3_dataset_manager::store::Metadata {
            source: "hybrid3".to_string(),
            id: MaterialId::new(2),
            formula: String::new(),
            downloaded_at: "2026-01-01T00:00:00Z".to_string(),
            tool: "test".to_string(),
            resolved_path: bad_path.to_string(),
        },
    )
    .unwrap();

    let result = app.table(None, &JsonOutput).unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].id, MaterialId::new(2));
    assert_eq!(
        result.table.column("idMaterial").unwrap(),
        &[Some("1".to_string())]
    );
}

#[test]
fn table_on_empty_store_fails() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(test_store(&temp), MockHybrid3);

    let err = app.table(None, &JsonOutput).unwrap_err();
    assert!(matches!(err, Hybrid3Error::EmptyStore));
}

#[test]
fn info_reports_normalized_properties() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(test_store(&temp), MockHybrid3);

    app.fetch(
        Some(MaterialSelection::Single(MaterialId::new(2))),
        None,
        options(),
        &JsonOutput,
    )
    .unwrap();

    let info = app.info(MaterialId::new(2), &JsonOutput).unwrap();
    assert_eq!(info.formula, "B");
    assert_eq!(info.properties.len(), 2);
    assert_eq!(info.properties[0].name, "bandgap");
    assert_eq!(info.properties[0].points, Some(1));
    assert_eq!(
        info.properties[1].url,
        "https://materials.example.org/materials/datasets/302/files/"
    );
}
