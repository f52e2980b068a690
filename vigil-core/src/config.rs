//! JSON configuration file loading.
//!
//! Both binaries accept an optional JSON file (`-c`/`--config` or the
//! `CONFIG` environment variable) that sits between built-in defaults and
//! the environment in the precedence chain: flag > env > file > default.

use crate::error::{Result, VigilError};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load a JSON config file. An absent or empty file is `None`; unknown
/// fields in a present file are a hard error so typos surface at startup.
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(VigilError::Io { path: path.to_path_buf(), source: e }),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&raw).map(Some).map_err(|e| VigilError::Config {
        reason: format!("failed to parse config file {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields, rename_all = "PascalCase")]
    struct Sample {
        address: Option<String>,
        rate_limit: Option<usize>,
    }

    #[test]
    fn absent_file_is_none() {
        let loaded: Option<Sample> = load_json_file(Path::new("/nonexistent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "  \n").unwrap();
        let loaded: Option<Sample> = load_json_file(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn present_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"Address": "localhost:9090"}"#).unwrap();
        let loaded: Sample = load_json_file(&path).unwrap().unwrap();
        assert_eq!(loaded.address.as_deref(), Some("localhost:9090"));
        assert_eq!(loaded.rate_limit, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"Addres": "typo"}"#).unwrap();
        let loaded: Result<Option<Sample>> = load_json_file(&path);
        assert!(loaded.is_err());
    }
}
