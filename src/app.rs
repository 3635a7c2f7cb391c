use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{MaterialId, MaterialSelection, PropertyId};
use crate::error::Hybrid3Error;
use crate::hybrid3::Hybrid3Client;
use crate::record::{self, MaterialSummary, PropertyData};
use crate::store::{Metadata, Store};
use crate::table::{PropertyTable, TableBuilder};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub no_cache: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub id: MaterialId,
    pub formula: Option<String>,
    pub action: String,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub row_count: usize,
    pub column_count: usize,
    pub skipped: Vec<SkippedMaterial>,
    pub table: PropertyTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedMaterial {
    pub id: MaterialId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub materials: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: MaterialId,
    pub formula: String,
    pub downloaded_at: Option<String>,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub id: MaterialId,
    pub formula: String,
    pub organic: String,
    pub inorganic: String,
    pub properties: Vec<PropertyInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    pub property_id: PropertyId,
    pub unit: Option<String>,
    /// Inline point count; `None` for file-only (atomic structure) data.
    pub points: Option<usize>,
    pub secondary: Option<SecondaryInfo>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecondaryInfo {
    pub name: String,
    pub property_id: PropertyId,
    pub unit: String,
    pub points: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<C: Hybrid3Client> {
    store: Store,
    client: C,
}

impl<C: Hybrid3Client> App<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    /// Fetches raw records for the selected materials into the project
    /// store, preferring the project store, then the user cache, then the
    /// network. The paginated systems listing is requested at most once per
    /// call, on the first material that actually needs a download.
    pub fn fetch(
        &self,
        selection: Option<MaterialSelection>,
        config: Option<&ResolvedConfig>,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, Hybrid3Error> {
        let ids = match (&selection, config) {
            (Some(selection), _) => selection.ids(),
            (None, Some(config)) => config.materials.clone(),
            (None, None) => Vec::new(),
        };

        let mut systems: Option<Vec<Value>> = None;
        let mut items = Vec::new();
        for id in ids {
            items.push(self.fetch_single(id, &mut systems, &options, sink)?);
        }

        Ok(FetchResult { items })
    }

    fn fetch_single(
        &self,
        id: MaterialId,
        systems: &mut Option<Vec<Value>>,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, Hybrid3Error> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; material {id}"),
            elapsed: None,
        });
        if !options.dry_run {
            self.store.ensure_project_root()?;
            self.store.ensure_cache_root()?;
        }

        let project_path = self.store.project_record_path(id);
        let cache_path = self.store.cache_record_path(id);

        if !options.force && Store::exists(&project_path) {
            sink.event(ProgressEvent {
                message: "phase=Store; already in project store".to_string(),
                elapsed: None,
            });
            return Ok(FetchItemResult {
                id,
                formula: record_formula(&project_path),
                action: "project".to_string(),
                project_path: Some(project_path.to_string()),
                cache_path: Store::exists(&cache_path).then(|| cache_path.to_string()),
            });
        }

        if !options.force && Store::exists(&cache_path) {
            sink.event(ProgressEvent {
                message: "phase=Store; using cached record".to_string(),
                elapsed: None,
            });
            let formula = record_formula(&cache_path);
            if !options.dry_run {
                Store::copy_file_atomic(&cache_path, &project_path)?;
                let meta = self.build_metadata(id, formula.as_deref(), project_path.as_str());
                Store::write_metadata(&self.store.project_metadata_path(id), &meta)?;
            }
            return Ok(FetchItemResult {
                id,
                formula,
                action: "cache".to_string(),
                project_path: Some(project_path.to_string()),
                cache_path: Some(cache_path.to_string()),
            });
        }

        if options.dry_run {
            return Ok(FetchItemResult {
                id,
                formula: None,
                action: "download".to_string(),
                project_path: Some(project_path.to_string()),
                cache_path: (!options.no_cache).then(|| cache_path.to_string()),
            });
        }

        if systems.is_none() {
            sink.event(ProgressEvent {
                message: "hybrid3.request systems".to_string(),
                elapsed: None,
            });
            let start = std::time::Instant::now();
            *systems = Some(self.client.fetch_systems()?);
            let latency = start.elapsed().as_millis();
            sink.event(ProgressEvent {
                message: format!("hybrid3.response latency_ms={latency}"),
                elapsed: None,
            });
        }
        let system = systems
            .as_ref()
            .and_then(|list| {
                list.iter()
                    .find(|system| system.get("pk").and_then(|v| v.as_u64()) == Some(id.value()))
            })
            .ok_or_else(|| Hybrid3Error::MaterialNotFound(id.to_string()))?
            .clone();

        sink.event(ProgressEvent {
            message: format!("hybrid3.request datasets system={id}"),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let datasets = self.client.fetch_datasets(id)?;
        let latency = start.elapsed().as_millis();
        sink.event(ProgressEvent {
            message: format!("hybrid3.response latency_ms={latency}"),
            elapsed: None,
        });

        let mut record = system;
        match record.as_object_mut() {
            Some(object) => {
                object.insert("datasets".to_string(), Value::Array(datasets));
            }
            None => {
                return Err(Hybrid3Error::MalformedRecord(format!(
                    "material {id}: system entry is not an object"
                )));
            }
        }
        let formula = record
            .get("formula")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());

        sink.event(ProgressEvent {
            message: "phase=Store; writing files".to_string(),
            elapsed: None,
        });
        Store::write_record(&project_path, &record)?;
        let meta = self.build_metadata(id, formula.as_deref(), project_path.as_str());
        Store::write_metadata(&self.store.project_metadata_path(id), &meta)?;

        if !options.no_cache {
            Store::copy_file_atomic(&project_path, &cache_path)?;
            let meta = self.build_metadata(id, formula.as_deref(), cache_path.as_str());
            Store::write_metadata(&self.store.cache_metadata_path(id), &meta)?;
        }

        Ok(FetchItemResult {
            id,
            formula,
            action: "download".to_string(),
            project_path: Some(project_path.to_string()),
            cache_path: (!options.no_cache).then(|| cache_path.to_string()),
        })
    }

    /// Normalizes every stored record and merges them into one wide table.
    /// A material that fails normalization is skipped and reported; it never
    /// reaches the builder, so the rows already merged stay intact.
    pub fn table(
        &self,
        out: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, Hybrid3Error> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning project store".to_string(),
            elapsed: None,
        });
        let metadata = Store::list_metadata(self.store.project_root())?;
        if metadata.is_empty() {
            return Err(Hybrid3Error::EmptyStore);
        }

        let mut builder = TableBuilder::new();
        let mut skipped = Vec::new();
        for meta in metadata {
            match self.load_summary(meta.id) {
                Ok(summary) => builder.add_material(&summary),
                Err(err) => {
                    tracing::warn!(material = %meta.id, error = %err, "skipping material");
                    skipped.push(SkippedMaterial {
                        id: meta.id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: "phase=Merge; building table".to_string(),
            elapsed: None,
        });
        let table = builder.finish();

        if let Some(out) = out {
            sink.event(ProgressEvent {
                message: format!("phase=Store; writing {out}"),
                elapsed: None,
            });
            let content = serde_json::to_vec_pretty(&table)
                .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
            Store::write_bytes_atomic(out, &content)?;
        }

        Ok(TableResult {
            row_count: table.row_count,
            column_count: table.column_count(),
            skipped,
            table,
        })
    }

    pub fn info(
        &self,
        id: MaterialId,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, Hybrid3Error> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {id}"),
            elapsed: None,
        });
        let summary = self.load_summary(id)?;

        let properties = summary
            .properties
            .iter()
            .map(|property| PropertyInfo {
                name: property.primary.name.clone(),
                property_id: property.primary.id,
                unit: property.primary.unit.clone(),
                points: match &property.primary.data {
                    PropertyData::File => None,
                    PropertyData::Points(points) => Some(points.len()),
                },
                secondary: property.secondary.as_ref().map(|secondary| SecondaryInfo {
                    name: secondary.name.clone(),
                    property_id: secondary.id,
                    unit: secondary.unit.clone(),
                    points: secondary.data.len(),
                }),
                url: property.url.clone(),
            })
            .collect();

        Ok(InfoResult {
            id: summary.id,
            formula: summary.formula,
            organic: summary.organic,
            inorganic: summary.inorganic,
            properties,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, Hybrid3Error> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning stores".to_string(),
            elapsed: None,
        });

        let project_metadata = Store::list_metadata(self.store.project_root())?;
        let cache_metadata = Store::list_metadata(self.store.cache_root())?;

        let mut map = std::collections::BTreeMap::<MaterialId, ListEntry>::new();
        for entry in project_metadata {
            let value = map.entry(entry.id).or_insert_with(|| ListEntry {
                id: entry.id,
                formula: entry.formula.clone(),
                downloaded_at: Some(entry.downloaded_at.clone()),
                project_path: None,
                cache_path: None,
            });
            value.project_path = Some(entry.resolved_path.clone());
        }
        for entry in cache_metadata {
            let value = map.entry(entry.id).or_insert_with(|| ListEntry {
                id: entry.id,
                formula: entry.formula.clone(),
                downloaded_at: Some(entry.downloaded_at.clone()),
                project_path: None,
                cache_path: None,
            });
            value.cache_path = Some(entry.resolved_path.clone());
        }

        Ok(ListResult {
            materials: map.into_values().collect(),
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, Hybrid3Error> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing project store".to_string(),
            elapsed: None,
        });
        self.store.clear_project()?;
        Ok(ClearResult { cleared: true })
    }

    fn load_summary(&self, id: MaterialId) -> Result<MaterialSummary, Hybrid3Error> {
        let project_path = self.store.project_record_path(id);
        let cache_path = self.store.cache_record_path(id);
        let path = if Store::exists(&project_path) {
            project_path
        } else if Store::exists(&cache_path) {
            cache_path
        } else {
            return Err(Hybrid3Error::MaterialNotFound(id.to_string()));
        };
        let record = Store::read_record(&path)?;
        record::normalize(&record, self.client.base_url())
    }

    fn build_metadata(&self, id: MaterialId, formula: Option<&str>, path: &str) -> Metadata {
        Metadata {
            source: "hybrid3".to_string(),
            id,
            formula: formula.unwrap_or_default().to_string(),
            downloaded_at: iso_timestamp(),
            tool: format!("hybrid3-dm/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: path.to_string(),
        }
    }
}

fn record_formula(path: &Utf8Path) -> Option<String> {
    Store::read_record(path)
        .ok()
        .and_then(|record| {
            record
                .get("formula")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string())
        })
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use serde_json::json;

    use crate::output::JsonOutput;

    use super::*;

    struct MockHybrid3;

    impl Hybrid3Client for MockHybrid3 {
        fn fetch_systems(&self) -> Result<Vec<Value>, Hybrid3Error> {
            Ok(vec![json!({
                "pk": 20,
                "formula": "CH3NH3PbI3",
                "organic": "CH3NH3",
                "inorganic": "PbI3",
            })])
        }

        fn fetch_datasets(&self, _id: MaterialId) -> Result<Vec<Value>, Hybrid3Error> {
            Ok(vec![json!({
                "pk": 101,
                "primary_property": {"id": 1, "name": "band gap"},
                "primary_unit": {"label": "eV"},
                "secondary_property": null,
                "subsets": [{"datapoints": [
                    {"values": [{"qualifier": "primary", "formatted": "1.55"}]},
                ]}],
            })])
        }

        fn base_url(&self) -> &str {
            "https://materials.example.org"
        }
    }

    #[test]
    fn fetch_downloads_and_stores_combined_record() {
        let temp = tempfile::tempdir().unwrap();
        let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
        let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let store = Store::new_with_paths(project_root, cache_root);

        let app = App::new(store.clone(), MockHybrid3);
        let options = FetchOptions {
            force: false,
            no_cache: false,
            dry_run: false,
        };

        let result = app
            .fetch(
                Some(MaterialSelection::Single(MaterialId::new(20))),
                None,
                options,
                &JsonOutput,
            )
            .unwrap();

        assert_eq!(result.items[0].action, "download");
        assert_eq!(result.items[0].formula.as_deref(), Some("CH3NH3PbI3"));

        let record = Store::read_record(&store.project_record_path(MaterialId::new(20))).unwrap();
        assert!(record.get("datasets").unwrap().is_array());
        assert!(Store::exists(&store.cache_record_path(MaterialId::new(20))));
    }

    #[test]
    fn fetch_unknown_material_fails() {
        let temp = tempfile::tempdir().unwrap();
        let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
        let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let store = Store::new_with_paths(project_root, cache_root);

        let app = App::new(store, MockHybrid3);
        let err = app
            .fetch(
                Some(MaterialSelection::Single(MaterialId::new(999))),
                None,
                FetchOptions {
                    force: false,
                    no_cache: true,
                    dry_run: false,
                },
                &JsonOutput,
            )
            .unwrap_err();
        assert!(matches!(err, Hybrid3Error::MaterialNotFound(_)));
    }
}
