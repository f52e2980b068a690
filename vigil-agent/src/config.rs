//! Agent configuration.
//!
//! Same layering as the server: defaults, then the optional JSON config
//! file, then the environment, then flags.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use vigil_core::{config, Result, VigilError};

/// Publisher variant. Exclusive: the HTTP pool and the gRPC stream never
/// run in the same agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Http,
    Grpc,
}

#[derive(Parser, Debug, Default)]
#[command(name = "vigil-agent", about = "Vigil metrics agent")]
struct Flags {
    /// {host:port} of the HTTP server
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// {host:port} of the gRPC server
    #[arg(short = 'g', long)]
    grpc_address: Option<String>,

    /// Report interval, seconds
    #[arg(short = 'r', long)]
    report_interval: Option<u64>,

    /// Poll interval, seconds
    #[arg(short = 'p', long)]
    poll_interval: Option<u64>,

    /// Max concurrent requests (HTTP worker count)
    #[arg(short = 'l', long)]
    rate_limit: Option<usize>,

    /// Shared HMAC key
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Path to the RSA public key (PEM)
    #[arg(long)]
    crypto_key: Option<String>,

    /// Publisher transport
    #[arg(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// Path to a JSON config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
struct FileConfig {
    address: Option<String>,
    #[serde(rename = "GRPCAddress")]
    grpc_address: Option<String>,
    poll_interval: Option<u64>,
    report_interval: Option<u64>,
    rate_limit: Option<usize>,
    hash_key: Option<String>,
    crypto_key: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    pub grpc_address: String,
    pub poll_interval: u64,
    pub report_interval: u64,
    pub rate_limit: usize,
    pub hash_key: String,
    pub crypto_key: String,
    pub mode: Mode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".into(),
            grpc_address: "localhost:3200".into(),
            poll_interval: 2,
            report_interval: 2,
            rate_limit: 30,
            hash_key: String::new(),
            crypto_key: String::new(),
            mode: Mode::Http,
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl AgentConfig {
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

        if cfg.rate_limit == 0 {
            return Err(VigilError::Config { reason: "rate limit must be at least 1".into() });
        }
        Ok(cfg)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(v) = file.address {
            self.address = v;
        }
        if let Some(v) = file.grpc_address {
            self.grpc_address = v;
        }
        if let Some(v) = file.poll_interval {
            self.poll_interval = v;
        }
        if let Some(v) = file.report_interval {
            self.report_interval = v;
        }
        if let Some(v) = file.rate_limit {
            self.rate_limit = v;
        }
        if let Some(v) = file.hash_key {
            self.hash_key = v;
        }
        if let Some(v) = file.crypto_key {
            self.crypto_key = v;
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
        if let Some(v) = env("POLL_INTERVAL") {
            self.poll_interval = parse_u64("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = env("REPORT_INTERVAL") {
            self.report_interval = parse_u64("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = env("RATE_LIMIT") {
            self.rate_limit = parse_u64("RATE_LIMIT", &v)? as usize;
        }
        if let Some(v) = env("KEY") {
            self.hash_key = v;
        }
        if let Some(v) = env("CRYPTO_KEY") {
            self.crypto_key = v;
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
        if let Some(v) = flags.poll_interval {
            self.poll_interval = v;
        }
        if let Some(v) = flags.report_interval {
            self.report_interval = v;
        }
        if let Some(v) = flags.rate_limit {
            self.rate_limit = v;
        }
        if let Some(v) = flags.key {
            self.hash_key = v;
        }
        if let Some(v) = flags.crypto_key {
            self.crypto_key = v;
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
        other => Err(VigilError::Config {
            reason: format!("unknown mode {other:?}, expected \"http\" or \"grpc\""),
        }),
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| VigilError::Config {
        reason: format!("{name} must be an integer, got {raw:?}"),
    })
}
