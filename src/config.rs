// src/config.rs

use std::env;
use std::str::FromStr;
use dotenvy::dotenv;

use crate::models::comment::DeleteMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub log_dir: String,

    /// Upper bound of pooled connections.
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub statement_timeout_ms: u64,
    pub request_timeout_secs: u64,

    /// Default behaviour of `DELETE /api/comments/{id}`.
    pub comment_delete_mode: DeleteMode,

    /// Attempts per side-effect task before it is abandoned.
    pub task_max_attempts: u32,
}

/// Reads `key`, falling back to `default` when unset or unparsable.
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            rust_log,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000".to_string()),
            log_dir: var_or("LOG_DIR", "logs".to_string()),
            max_connections: var_or("DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: var_or("DB_ACQUIRE_TIMEOUT_SECS", 3),
            statement_timeout_ms: var_or("DB_STATEMENT_TIMEOUT_MS", 5000),
            request_timeout_secs: var_or("REQUEST_TIMEOUT_SECS", 30),
            comment_delete_mode: var_or("COMMENT_DELETE_MODE", DeleteMode::Tombstone),
            task_max_attempts: var_or("TASK_MAX_ATTEMPTS", 5),
        })
    }
}
