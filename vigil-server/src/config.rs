//! Server configuration.
//!
//! Four layers, later wins: built-in defaults, the optional JSON config
//! file (`-c`/`--config` or `CONFIG`), the environment, command-line flags.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use vigil_core::{config, Result};

/// Transport served by this process. Exclusive: one server runs one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Http,
    Grpc,
}

#[derive(Parser, Debug, Default)]
#[command(name = "vigild", about = "Vigil metrics ingestion server")]
struct Flags {
    /// {host:port} for the HTTP server
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// {host:port} for the gRPC server
    #[arg(short = 'g', long)]
    grpc_address: Option<String>,

    /// Log level
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Snapshot save interval, seconds (file backend)
    #[arg(short = 'i', long)]
    store_interval: Option<u64>,

    /// File storage path
    #[arg(short = 'f', long)]
    file_storage_path: Option<String>,

    /// Restore metrics from file at startup
    #[arg(short = 'r', long)]
    restore: Option<bool>,

    /// Database connection string
    #[arg(short = 'd', long)]
    database_dsn: Option<String>,

    /// Shared HMAC key
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Path to the RSA private key (PEM)
    #[arg(long)]
    crypto_key: Option<String>,

    /// Trusted subnet (CIDR) for ingestion
    #[arg(short = 't', long)]
    trusted_subnet: Option<String>,

    /// Transport to serve
    #[arg(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// Path to a JSON config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

/// JSON config file shape. Field names follow the exported config layout;
/// unknown keys are rejected so typos fail fast.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
struct FileConfig {
    address: Option<String>,
    #[serde(rename = "GRPCAddress")]
    grpc_address: Option<String>,
    log_level: Option<String>,
    store_interval: Option<u64>,
    file_storage_path: Option<String>,
    restore: Option<bool>,
    database_connection: Option<String>,
    hash_key: Option<String>,
    crypto_key: Option<String>,
    trusted_subnet: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub grpc_address: String,
    pub log_level: String,
    pub store_interval: u64,
    pub file_storage_path: String,
    pub restore: bool,
    pub database_dsn: String,
    pub hash_key: String,
    pub crypto_key: String,
    pub trusted_subnet: String,
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".into(),
            grpc_address: "localhost:3200".into(),
            log_level: "info".into(),
            store_interval: 300,
            file_storage_path: "./metrics/metrics.json".into(),
            restore: true,
            database_dsn: String::new(),
            hash_key: String::new(),
            crypto_key: String::new(),
            trusted_subnet: String::new(),
            mode: Mode::Http,
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        Self::assemble(Flags::parse(), env)
    }

    fn assemble(flags: Flags, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        let config_path = flags
            .config
            .clone()
            .or_else(|| env("CONFIG").map(PathBuf::from));
        if let Some(path) = config_path {
            if let Some(file) = config::load_json_file::<FileConfig>(&path)? {
                cfg.apply_file(file)?;
            }
        }

        cfg.apply_env(&env)?;
        cfg.apply_flags(flags);
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(v) = file.address {
            self.address = v;
        }
        if let Some(v) = file.grpc_address {
            self.grpc_address = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.store_interval {
            self.store_interval = v;
        }
        if let Some(v) = file.file_storage_path {
            self.file_storage_path = v;
        }
        if let Some(v) = file.restore {
            self.restore = v;
        }
        if let Some(v) = file.database_connection {
            self.database_dsn = v;
        }
        if let Some(v) = file.hash_key {
            self.hash_key = v;
        }
        if let Some(v) = file.crypto_key {
            self.crypto_key = v;
        }
        if let Some(v) = file.trusted_subnet {
            self.trusted_subnet = v;
        }
        if let Some(v) = file.mode {
            self.mode = parse_mode(&v)?;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = env("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env("GRPC_ADDRESS") {
            self.grpc_address = v;
        }
        if let Some(v) = env("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env("STORE_INTERVAL") {
            self.store_interval = parse_u64("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = env("FILE_STORAGE_PATH") {
            self.file_storage_path = v;
        }
        if let Some(v) = env("RESTORE") {
            self.restore = parse_bool("RESTORE", &v)?;
        }
        if let Some(v) = env("DATABASE_DSN") {
            self.database_dsn = v;
        }
        if let Some(v) = env("KEY") {
            self.hash_key = v;
        }
        if let Some(v) = env("CRYPTO_KEY") {
            self.crypto_key = v;
        }
        if let Some(v) = env("TRUSTED_SUBNET") {
            self.trusted_subnet = v;
        }
        if let Some(v) = env("MODE") {
            self.mode = parse_mode(&v)?;
        }
        Ok(())
    }

    fn apply_flags(&mut self, flags: Flags) {
        if let Some(v) = flags.address {
            self.address = v;
        }
        if let Some(v) = flags.grpc_address {
            self.grpc_address = v;
        }
        if let Some(v) = flags.log_level {
            self.log_level = v;
        }
        if let Some(v) = flags.store_interval {
            self.store_interval = v;
        }
        if let Some(v) = flags.file_storage_path {
            self.file_storage_path = v;
        }
        if let Some(v) = flags.restore {
            self.restore = v;
        }
        if let Some(v) = flags.database_dsn {
            self.database_dsn = v;
        }
        if let Some(v) = flags.key {
            self.hash_key = v;
        }
        if let Some(v) = flags.crypto_key {
            self.crypto_key = v;
        }
        if let Some(v) = flags.trusted_subnet {
            self.trusted_subnet = v;
        }
        if let Some(v) = flags.mode {
            self.mode = v;
        }
    }
}

fn parse_mode(raw: &str) -> Result<Mode> {
    match raw {
        "http" => Ok(Mode::Http),
        "grpc" => Ok(Mode::Grpc),
        other => Err(vigil_core::VigilError::Config {
            reason: format!("unknown mode {other:?}, expected \"http\" or \"grpc\""),
        }),
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| vigil_core::VigilError::Config {
        reason: format!("{name} must be an integer, got {raw:?}"),
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse().map_err(|_| vigil_core::VigilError::Config {
        reason: format!("{name} must be true or false, got {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_any_source() {
        let cfg = ServerConfig::assemble(Flags::default(), no_env).unwrap();
        assert_eq!(cfg.address, "localhost:8080");
        assert_eq!(cfg.store_interval, 300);
        assert!(cfg.restore);
        assert_eq!(cfg.mode, Mode::Http);
    }

    #[test]
    fn env_overrides_defaults() {
        let env = |name: &str| match name {
            "ADDRESS" => Some("0.0.0.0:9000".to_string()),
            "RESTORE" => Some("false".to_string()),
            "MODE" => Some("grpc".to_string()),
            _ => None,
        };
        let cfg = ServerConfig::assemble(Flags::default(), env).unwrap();
        assert_eq!(cfg.address, "0.0.0.0:9000");
        assert!(!cfg.restore);
        assert_eq!(cfg.mode, Mode::Grpc);
    }

    #[test]
    fn flags_override_env() {
        let env = |name: &str| match name {
            "ADDRESS" => Some("from-env:1".to_string()),
            _ => None,
        };
        let flags = Flags { address: Some("from-flag:2".into()), ..Flags::default() };
        let cfg = ServerConfig::assemble(flags, env).unwrap();
        assert_eq!(cfg.address, "from-flag:2");
    }

    #[test]
    fn file_sits_below_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{"Address": "from-file:1", "StoreInterval": 30, "TrustedSubnet": "10.0.0.0/8"}"#,
        )
        .unwrap();

        let env = |name: &str| match name {
            "ADDRESS" => Some("from-env:2".to_string()),
            _ => None,
        };
        let flags = Flags { config: Some(path), ..Flags::default() };
        let cfg = ServerConfig::assemble(flags, env).unwrap();

        assert_eq!(cfg.address, "from-env:2");
        assert_eq!(cfg.store_interval, 30);
        assert_eq!(cfg.trusted_subnet, "10.0.0.0/8");
    }

    #[test]
    fn bad_mode_is_a_config_error() {
        let env = |name: &str| (name == "MODE").then(|| "carrier-pigeon".to_string());
        assert!(ServerConfig::assemble(Flags::default(), env).is_err());
    }
}
