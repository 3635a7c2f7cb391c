use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{MaterialId, MaterialSelection};
use crate::error::Hybrid3Error;
use crate::hybrid3::DEFAULT_BASE_URL;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MaterialEntry {
    Shorthand(String),
    Detailed(MaterialEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MaterialEntryObject {
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub materials: Vec<MaterialId>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, Hybrid3Error> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("hybrid3-dm.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(Hybrid3Error::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| Hybrid3Error::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| Hybrid3Error::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, Hybrid3Error> {
        let schema_version = config.schema_version.unwrap_or(1);
        let base_url = config
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut materials = Vec::new();
        for entry in config.materials {
            match entry {
                MaterialEntry::Shorthand(value) => {
                    let selection: MaterialSelection = value.parse()?;
                    materials.extend(selection.ids());
                }
                MaterialEntry::Detailed(obj) => materials.push(MaterialId::new(obj.id)),
            }
        }

        Ok(ResolvedConfig {
            schema_version,
            base_url,
            materials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand_and_detailed() {
        let config = Config {
            schema_version: None,
            base_url: None,
            materials: vec![
                MaterialEntry::Shorthand("2-4".to_string()),
                MaterialEntry::Detailed(MaterialEntryObject { id: 20 }),
            ],
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            resolved.materials,
            vec![
                MaterialId::new(2),
                MaterialId::new(3),
                MaterialId::new(4),
                MaterialId::new(20),
            ]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = Config {
            schema_version: Some(1),
            base_url: Some("https://example.org/".to_string()),
            materials: vec![],
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.base_url, "https://example.org");
    }
}
