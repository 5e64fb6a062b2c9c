//! JSON document helpers shared by reports and snapshots.

use crate::error::{IoError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub fn to_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(data).map_err(|e| IoError::Serialization(e.to_string()))
}

pub fn to_json_pretty<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).map_err(|e| IoError::Serialization(e.to_string()))
}

/// Parses a document. Blank input is rejected before serde sees it.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    if json.trim().is_empty() {
        return Err(IoError::validation("document is blank"));
    }
    Ok(serde_json::from_str(json)?)
}

/// Writes `data` to `path` as pretty JSON, creating parent directories.
pub fn write_json_file<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(IoError::fs("creating", parent))?;
    }
    std::fs::write(path, to_json_pretty(data)?).map_err(IoError::fs("writing", path))
}

pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    let json = std::fs::read_to_string(path).map_err(IoError::fs("reading", path))?;
    from_json(&json).map_err(|e| e.with_context(format!("parsing {}", path.display())))
}
