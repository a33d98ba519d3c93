//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! CLI tools the pipeline shells out to (ffmpeg, ffprobe) and provides lookup
//! methods for the rest of the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Timeout for `-version` probes.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`rf_core::config::ToolsConfig`] supplies a
    /// custom path **and** that path exists, it is used directly. Overrides
    /// are canonicalized against the current directory so they still resolve
    /// from inside a job's working directory. Otherwise
    /// [`which::which`] is used to locate the tool in `PATH`. Tools that are
    /// not found are silently omitted from the registry.
    pub fn discover(tools_config: &rf_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path.map(std::fs::canonicalize) {
                Some(Ok(p)) => Some(p),
                Some(Err(e)) => {
                    tracing::warn!(tool = name, "configured path unusable, searching PATH: {e}");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                    },
                );
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery.
    pub fn with_tool(mut self, name: &str, path: impl AsRef<Path>) -> Self {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path: path.as_ref().to_path_buf(),
            },
        );
        self
    }

    /// Return a reference to the [`ToolConfig`] for the given tool, or an
    /// [`rf_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> rf_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            rf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Check all known tools and return availability information.
    pub async fn check_all(&self) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path).await,
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }

    /// Iterate over all registered tool configs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.tools.iter()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
async fn detect_version(path: &Path) -> Option<String> {
    let output = ToolCommand::new(path.to_path_buf())
        .arg("-version")
        .timeout(VERSION_TIMEOUT)
        .execute()
        .await
        .ok()?;

    output.stdout.lines().next().map(|s| s.to_string())
}
