//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON or TOML and carries all
//! sub-configs. Every section defaults sensibly so an empty file is valid.
//! Secrets can also come from the environment (see [`Config::apply_env`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Fifteen mebibytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub tools: ToolsConfig,
    pub sessions: SessionsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Parse a config file, choosing the format by extension (`.json` is
    /// JSON, anything else TOML).
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_toml(&contents),
        }
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist. A file that exists but does
    /// not parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::info!("No config file at {}; using defaults", path.display());
            return Ok(Self::default());
        }

        let config = Self::from_file(path)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override secrets from `REELFORGE_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("REELFORGE_REMOTE_API_KEY") {
            self.remote.api_key = v;
        }
        if let Some(v) = get("REELFORGE_REMOTE_PROJECT_ID") {
            self.remote.project_id = v;
        }
        if let Some(v) = get("REELFORGE_REMOTE_BUCKET_ID") {
            self.remote.bucket_id = v;
        }
        if let Some(v) = get("REELFORGE_AUTH_SECRET") {
            self.auth.secret = Some(v);
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.enabled && self.auth.secret.as_deref().map_or(true, str::is_empty) {
            warnings.push("auth is enabled but auth.secret is not set; every request will be rejected".into());
        }

        if self.upload.max_file_size == 0 {
            warnings.push("upload.max_file_size is 0; every upload will be rejected".into());
        }

        if self.pipeline.workers == 0 {
            warnings.push("pipeline.workers is 0; one worker will be used".into());
        }

        if self.pipeline.queue_capacity == 0 {
            warnings.push("pipeline.queue_capacity is 0; a capacity of 1 will be used".into());
        }

        if self.remote.bucket_id.is_empty() || self.remote.project_id.is_empty() {
            warnings.push("remote.bucket_id or remote.project_id is empty; publishing will fail".into());
        }

        if self.remote.api_key.is_empty() {
            warnings.push("remote.api_key is empty".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
            db_path: PathBuf::from("./data/reelforge.db"),
        }
    }
}

/// Identity token verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// HMAC key for `<user>.<signature>` tokens.
    pub secret: Option<String>,
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: None,
            cookie_name: "auth_token".into(),
        }
    }
}

/// Local working storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

/// Chunked upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted declared `file-size`, in bytes.
    pub max_file_size: u64,
    /// Require an explicit `last-chunk: true` header to complete an upload.
    pub require_last_chunk: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            require_last_chunk: false,
        }
    }
}

/// Background transcode/publish workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub segment_seconds: u32,
    pub encode_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 32,
            segment_seconds: 4,
            encode_timeout_secs: 3600,
        }
    }
}

/// Remote object store (Appwrite-compatible storage API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API base, e.g. `https://cloud.appwrite.io/v1`.
    pub endpoint: String,
    pub bucket_id: String,
    pub project_id: String,
    pub api_key: String,
    pub response_format: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloud.appwrite.io/v1".into(),
            bucket_id: String::new(),
            project_id: String::new(),
            api_key: String::new(),
            response_format: "1.5.0".into(),
            timeout_secs: 60,
        }
    }
}

/// Optional explicit paths to external tools. Unset means search `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Live-update session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub queue_capacity: usize,
    pub heartbeat_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::sessions::DEFAULT_QUEUE_CAPACITY,
            heartbeat_secs: 15,
        }
    }
}
