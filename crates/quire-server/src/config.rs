//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the journal starts with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use quire_shared::constants::{DEFAULT_GROUP_NUMBER, MAX_FILE_SIZE};
use quire_store::Database;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite database file.
    /// Env: `DATABASE_URL` (a `sqlite://` prefix is accepted)
    /// Default: `<data dir>/quire.db`
    pub database_path: PathBuf,

    /// Root of the submission tree.
    /// Env: `QUIRE_FS_ROOT`
    /// Default: `<data dir>/submissions`
    pub fs_root: PathBuf,

    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// This journal's number within the federation; prefixes minted user IDs.
    /// Env: `GROUP_NUMBER`
    pub group_number: u32,

    /// Request body limit in bytes. File contents arrive base64-encoded, so
    /// this sits above the per-file limit.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 100 MiB
    pub max_upload_size: usize,

    /// Env: `SESSION_TTL_SECS`
    /// Default: one day
    pub session_ttl: Duration,

    /// Env: `BCRYPT_COST`
    pub bcrypt_cost: u32,

    /// Bearer token for `/admin/*`.
    /// Env: `ADMIN_TOKEN`
    /// Default: unset (admin API disabled).
    pub admin_token: Option<String>,

    /// Period of the background reconciliation. Zero disables it.
    /// Env: `RECONCILE_INTERVAL_SECS`
    /// Default: one hour
    pub reconcile_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = Database::default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_path: data_dir.join("quire.db"),
            fs_root: data_dir.join("submissions"),
            http_addr: ([0, 0, 0, 0], 8080).into(),
            group_number: DEFAULT_GROUP_NUMBER,
            max_upload_size: 2 * MAX_FILE_SIZE,
            session_ttl: Duration::from_secs(86_400),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_token: None,
            reconcile_interval: Duration::from_secs(3_600),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values
    /// are logged and the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            config.database_path = PathBuf::from(path);
        }

        if let Some(root) = lookup("QUIRE_FS_ROOT") {
            config.fs_root = PathBuf::from(root);
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(group) = lookup("GROUP_NUMBER") {
            parse_into(&mut config.group_number, "GROUP_NUMBER", &group);
        }

        if let Some(size) = lookup("MAX_UPLOAD_SIZE") {
            parse_into(&mut config.max_upload_size, "MAX_UPLOAD_SIZE", &size);
        }

        if let Some(secs) = lookup("SESSION_TTL_SECS") {
            let mut ttl = config.session_ttl.as_secs();
            parse_into(&mut ttl, "SESSION_TTL_SECS", &secs);
            config.session_ttl = Duration::from_secs(ttl);
        }

        if let Some(cost) = lookup("BCRYPT_COST") {
            let mut parsed = config.bcrypt_cost;
            parse_into(&mut parsed, "BCRYPT_COST", &cost);
            if (4..=31).contains(&parsed) {
                config.bcrypt_cost = parsed;
            } else {
                tracing::warn!(value = parsed, "BCRYPT_COST out of range 4..=31, using default");
            }
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Some(secs) = lookup("RECONCILE_INTERVAL_SECS") {
            let mut interval = config.reconcile_interval.as_secs();
            parse_into(&mut interval, "RECONCILE_INTERVAL_SECS", &secs);
            config.reconcile_interval = Duration::from_secs(interval);
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
    }
}
