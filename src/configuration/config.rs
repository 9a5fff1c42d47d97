use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SSE_PATH: &str = "/sse";
const DEFAULT_MESSAGE_PATH: &str = "/message";
const DEFAULT_SESSION_BUFFER: usize = 256;
const DEFAULT_LOG_QUEUE: usize = 1024;
const DEFAULT_EVENT_BUFFER: usize = 1024;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;
const DEFAULT_DB_FILE: &str = "stdiogate.sqlite3";
const DEFAULT_LOG_DIR: &str = "stdiogate-logs";

/// Application configuration structure that defines all runtime parameters.
///
/// The same structure is filled either from the command line (`clap`) or, when `--config` is
/// given, from a TOML file (`serde` + `toml`). A file replaces the command-line values entirely.
///
/// # Examples
///
/// ```no_run
/// use stdiogate::configuration::Config;
///
/// let config = Config::load().expect("invalid configuration");
/// println!("Serving {:?} on port {}", config.stdio, config.port);
/// ```
///
/// # Fields Overview
///
/// - `stdio`: shell command line of the child speaking JSON-RPC on stdin/stdout
/// - `port`, `base_url`, `sse_path`, `message_path`: where clients connect and post
/// - `cors`, `health_endpoints`, `headers`: HTTP plumbing around the gateway
/// - `log_store`, `log_store_path`, `logs_path`: persistence of protocol log records
/// - `session_buffer`, `log_queue`, `event_buffer`: bounded queue sizes
#[derive(Parser, Deserialize, Debug, Clone)]
#[command(name = "stdiogate")]
#[command(version)]
#[command(about = "Expose a stdio JSON-RPC process to many clients over Server-Sent Events")]
#[serde(default)]
pub struct Config {
    /// Read the whole configuration from this TOML file instead of the command line
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Command line of the child process, run through the shell
    ///
    /// # Command Line
    /// Use `--stdio "<COMMAND>"` to set this value from the CLI
    #[arg(long, value_name = "COMMAND")]
    pub stdio: Option<String>,

    /// Port the HTTP server listens on. `0` picks an ephemeral port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Prefix advertised to clients in front of the message path
    #[arg(long, default_value = "")]
    pub base_url: String,

    /// Path of the Server-Sent Events endpoint
    #[arg(long, default_value = DEFAULT_SSE_PATH)]
    pub sse_path: String,

    /// Path clients POST their messages to
    #[arg(long, default_value = DEFAULT_MESSAGE_PATH)]
    pub message_path: String,

    /// Verbosity of the gateway's own diagnostics
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Enable CORS. Without values any origin is allowed
    ///
    /// # Command Line
    /// Use `--cors` alone, or `--cors https://a.example https://b.example`
    #[arg(long, num_args = 0.., value_name = "ORIGIN")]
    pub cors: Option<Vec<String>>,

    /// Paths answering `ok` for health checks. Repeatable
    #[arg(long = "health-endpoint", value_name = "PATH")]
    pub health_endpoints: Vec<String>,

    /// Extra response header as `Name: value`. Repeatable
    #[arg(long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Backend storing protocol log records
    #[arg(long, value_enum, default_value_t = StorageBackend::Sqlite)]
    pub log_store: StorageBackend,

    /// Database file (sqlite) or directory (file) of the log store
    ///
    /// Defaults to `stdiogate.sqlite3` or `stdiogate-logs/` in the working directory
    #[arg(long, env = "STDIOGATE_LOG_STORE_PATH", value_name = "PATH")]
    pub log_store_path: Option<PathBuf>,

    /// Serve stored log records under `<PATH>/<session id>`. Disabled when absent
    #[arg(long, value_name = "PATH")]
    pub logs_path: Option<String>,

    /// Messages buffered per session before the session is dropped
    #[arg(long, default_value_t = DEFAULT_SESSION_BUFFER)]
    pub session_buffer: usize,

    /// Log operations queued before new ones are discarded
    #[arg(long, default_value_t = DEFAULT_LOG_QUEUE)]
    pub log_queue: usize,

    /// Events queued towards the router
    #[arg(long, default_value_t = DEFAULT_EVENT_BUFFER)]
    pub event_buffer: usize,

    /// Interval between SSE keep-alive comments
    #[arg(long, default_value_t = DEFAULT_KEEP_ALIVE_SECS)]
    pub keep_alive_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config: None,
            stdio: None,
            port: DEFAULT_PORT,
            base_url: String::new(),
            sse_path: DEFAULT_SSE_PATH.to_string(),
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
            log_level: LogLevel::default(),
            cors: None,
            health_endpoints: Vec::new(),
            headers: Vec::new(),
            log_store: StorageBackend::default(),
            log_store_path: None,
            logs_path: None,
            session_buffer: DEFAULT_SESSION_BUFFER,
            log_queue: DEFAULT_LOG_QUEUE,
            event_buffer: DEFAULT_EVENT_BUFFER,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl Config {
    /// Parses the process arguments, loads the TOML file if one is named and validates the
    /// result.
    ///
    /// # Panics
    /// Never panics, but exits the process through `clap` on `--help`, `--version` or
    /// malformed arguments, printing the usage.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(Config::parse())
    }

    /// Same as [`Config::load`] with an explicit argument list, reporting argument errors
    /// instead of exiting.
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed =
            Config::try_parse_from(args).map_err(|e| ConfigError::CliError(e.to_string()))?;
        Self::resolve(parsed)
    }

    /// Reads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.config = Some(path.to_path_buf());
        Ok(config)
    }

    fn resolve(parsed: Config) -> Result<Self, ConfigError> {
        let config = match &parsed.config {
            Some(path) => Self::from_file(path)?,
            None => parsed,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that `clap` and `serde` cannot check on their own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.command()?;

        for (name, path) in [("sse path", &self.sse_path), ("message path", &self.message_path)] {
            check_path(name, path)?;
        }
        if self.sse_path == self.message_path {
            return Err(ConfigError::BadPath(format!(
                "sse path and message path are both {}",
                self.sse_path
            )));
        }
        for path in &self.health_endpoints {
            check_path("health endpoint", path)?;
        }
        if let Some(logs_path) = &self.logs_path {
            check_path("logs path", logs_path)?;
        }

        self.response_headers()?;

        for (name, value) in [
            ("session buffer", self.session_buffer),
            ("log queue", self.log_queue),
            ("event buffer", self.event_buffer),
        ] {
            if value == 0 {
                return Err(ConfigError::NotInRange(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }

    /// The trimmed child command line.
    pub fn command(&self) -> Result<&str, ConfigError> {
        self.stdio
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
            .ok_or(ConfigError::MissingCommand)
    }

    pub fn response_headers(&self) -> Result<Vec<ResponseHeader>, ConfigError> {
        self.headers
            .iter()
            .map(|raw| {
                ResponseHeader::parse(raw)
                    .ok_or_else(|| ConfigError::BadHeader(format!("expected `Name: value`, got `{}`", raw)))
            })
            .collect()
    }

    /// Location of the log store, falling back to a default name in the working directory.
    pub fn log_store_location(&self) -> PathBuf {
        if let Some(path) = &self.log_store_path {
            return path.clone();
        }
        match self.log_store {
            StorageBackend::File => PathBuf::from(DEFAULT_LOG_DIR),
            _ => PathBuf::from(DEFAULT_DB_FILE),
        }
    }

    /// URL handed to SSE clients for posting messages, without the session query.
    pub fn message_endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.message_path)
    }
}

fn check_path(name: &str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::BadPath(format!(
            "{} must start with '/', got `{}`",
            name, path
        )));
    }
    Ok(())
}
