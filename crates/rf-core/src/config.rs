//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, storage, tool and pipeline sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidInput(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.server.max_upload_bytes == 0 {
            warnings.push("server.max_upload_bytes is 0; every upload will be rejected".into());
        }

        if self.pipeline.max_concurrent_jobs == 0 {
            warnings.push(
                "pipeline.max_concurrent_jobs is 0; it will be treated as 1".into(),
            );
        }

        if self.pipeline.job_timeout_secs == 0 {
            warnings.push(
                "pipeline.job_timeout_secs is 0; every job will time out immediately".into(),
            );
        }

        if self.storage.uploads_dir == self.storage.outputs_dir {
            warnings.push("storage.uploads_dir and storage.outputs_dir are the same directory".into());
        }

        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path {} does not exist; falling back to PATH",
                    p.display()
                ));
            }
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
    /// Largest accepted request body for uploads, in bytes.
    pub max_upload_bytes: u64,
}

impl ServerConfig {
    /// The upload limit as a body-size bound, clamped to the address space.
    pub fn upload_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes).unwrap_or(usize::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Staging directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where uploaded source artifacts are stored, one subdirectory per upload.
    pub uploads_dir: PathBuf,
    /// Where result artifacts are published.
    pub outputs_dir: PathBuf,
    /// Root for per-job working directories. `None` uses the system temp dir.
    pub work_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            outputs_dir: PathBuf::from("outputs"),
            work_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolved root for job working directories.
    pub fn work_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("reelforge-work"))
    }

    /// Create the uploads, outputs and work directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.uploads_dir, &self.outputs_dir, &self.work_root()] {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::resource(format!("create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Job execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on jobs whose external process runs at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for a single external process.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_job_timeout_secs() -> u64 {
    3600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    /// The per-job timeout as a [`Duration`].
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}
