use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum Hybrid3Error {
    #[error("invalid material id: {0}")]
    InvalidMaterialId(String),

    #[error("malformed material record: {0}")]
    MalformedRecord(String),

    #[error("material {material}: secondary property {property} has no unit")]
    MissingUnit { material: String, property: String },

    #[error("missing config file hybrid3-dm.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("HybriD3 request failed: {0}")]
    ApiHttp(String),

    #[error("HybriD3 returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("material not found: {0}")]
    MaterialNotFound(String),

    #[error("no materials in project store (run `hybrid3-dm data fetch` first)")]
    EmptyStore,

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
