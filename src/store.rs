use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::MaterialId;
use crate::error::Hybrid3Error;

/// Project-local store for raw material records plus a shared user cache,
/// so re-runs against the same materials never re-download.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, Hybrid3Error> {
        let cwd =
            std::env::current_dir().map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".hybrid3-dm"))
            .map_err(|_| Hybrid3Error::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("hybrid3-dataset-manager"),
                )
                .ok()
            })
            .ok_or_else(|| {
                Hybrid3Error::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn project_record_path(&self, id: MaterialId) -> Utf8PathBuf {
        self.project_root
            .join("materials")
            .join(id.to_string())
            .join("record.json")
    }

    pub fn cache_record_path(&self, id: MaterialId) -> Utf8PathBuf {
        self.cache_root
            .join("materials")
            .join(id.to_string())
            .join("record.json")
    }

    pub fn project_metadata_path(&self, id: MaterialId) -> Utf8PathBuf {
        self.project_root
            .join("metadata")
            .join("materials")
            .join(format!("{id}.json"))
    }

    pub fn cache_metadata_path(&self, id: MaterialId) -> Utf8PathBuf {
        self.cache_root
            .join("metadata")
            .join("materials")
            .join(format!("{id}.json"))
    }

    pub fn ensure_project_root(&self) -> Result<(), Hybrid3Error> {
        fs::create_dir_all(self.project_root.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), Hybrid3Error> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn clear_project(&self) -> Result<(), Hybrid3Error> {
        if self.project_root.as_std_path().exists() {
            fs::remove_dir_all(self.project_root.as_std_path())
                .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_record(path: &Utf8Path, record: &Value) -> Result<(), Hybrid3Error> {
        let content = serde_json::to_vec_pretty(record)
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_record(path: &Utf8Path) -> Result<Value, Hybrid3Error> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| {
            Hybrid3Error::MalformedRecord(format!("stored record {path}: {err}"))
        })
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), Hybrid3Error> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), Hybrid3Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), Hybrid3Error> {
        let parent = dest
            .parent()
            .ok_or_else(|| Hybrid3Error::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("hybrid3-dm-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        if dest.as_std_path().exists() {
            fs::remove_file(dest.as_std_path())
                .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        }
        temp.persist(dest.as_std_path())
            .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn list_metadata(root: &Utf8Path) -> Result<Vec<Metadata>, Hybrid3Error> {
        let metadata_root = root.join("metadata");
        if !metadata_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(metadata_root.as_std_path())? {
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
                let metadata: Metadata = serde_json::from_str(&content)
                    .map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
                entries.push(metadata);
            }
        }
        entries.sort_by_key(|meta| meta.id);
        Ok(entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub id: MaterialId,
    pub formula: String,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, Hybrid3Error> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| Hybrid3Error::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
