use std::path::PathBuf;
use std::time::Duration;

use scaffold_core::scripting::sandbox::ScriptLimits;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables. Read once at startup;
/// the running server holds it behind an `Arc` and never mutates it.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Directory uploaded scripts are written under (default: `./user_scripts`).
    pub scripts_base: PathBuf,
    /// Prefix for filename-derived handler endpoints (default: empty).
    pub handler_prefix: String,
    /// Budget for compiling and initialising a script, in milliseconds.
    pub script_load_timeout_ms: u64,
    /// Budget for one handler invocation, in milliseconds.
    pub script_call_timeout_ms: u64,
    /// Rhai operation cap per evaluation (`0` disables the cap).
    pub script_max_operations: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `8080`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SCRIPTS_BASE`           | `./user_scripts`           |
    /// | `HANDLER_PREFIX`         | (empty)                    |
    /// | `SCRIPT_LOAD_TIMEOUT_MS` | `5000`                     |
    /// | `SCRIPT_CALL_TIMEOUT_MS` | `10000`                    |
    /// | `SCRIPT_MAX_OPERATIONS`  | `1000000`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let scripts_base = std::env::var("SCRIPTS_BASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./user_scripts"));

        let handler_prefix = std::env::var("HANDLER_PREFIX").unwrap_or_default();

        let script_load_timeout_ms: u64 = std::env::var("SCRIPT_LOAD_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("SCRIPT_LOAD_TIMEOUT_MS must be a valid u64");

        let script_call_timeout_ms: u64 = std::env::var("SCRIPT_CALL_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".into())
            .parse()
            .expect("SCRIPT_CALL_TIMEOUT_MS must be a valid u64");

        let script_max_operations: u64 = std::env::var("SCRIPT_MAX_OPERATIONS")
            .unwrap_or_else(|_| "1000000".into())
            .parse()
            .expect("SCRIPT_MAX_OPERATIONS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            scripts_base,
            handler_prefix,
            script_load_timeout_ms,
            script_call_timeout_ms,
            script_max_operations,
        }
    }

    /// Execution limits for every script loaded by this server.
    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits {
            load_timeout: Duration::from_millis(self.script_load_timeout_ms),
            call_timeout: Duration::from_millis(self.script_call_timeout_ms),
            max_operations: self.script_max_operations,
            ..ScriptLimits::default()
        }
    }
}
