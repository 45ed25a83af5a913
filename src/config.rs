use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::db;

pub const DB_ENV: &str = "LEAGUE_STATS_DB";
pub const ADDR_ENV: &str = "LEAGUE_STATS_ADDR";
pub const DEFAULT_ADDR: &str = "0.0.0.0:18000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Loads `.env.local` / `.env` if present, then reads the environment.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup(DB_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .or_else(db::default_db_path)
            .ok_or_else(|| anyhow!("unable to resolve sqlite path; set {DB_ENV}"))?;

        let raw_addr = lookup(ADDR_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid {ADDR_ENV} {raw_addr:?}"))?;

        Ok(Self { db_path, bind_addr })
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// `--db=PATH` or `--db PATH`.
pub fn parse_db_path_arg(args: &[String]) -> Option<PathBuf> {
    flag_value(args, "--db").map(PathBuf::from)
}

pub fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
