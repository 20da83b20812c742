//! External tool detection.
//!
//! The [`ToolRegistry`] resolves ffmpeg and ffprobe once at startup, either
//! from explicit config paths or from `PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rf_core::config::ToolsConfig;

/// Tools the pipeline shells out to.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output, if it ran.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Resolve every known tool.
    ///
    /// A configured path that exists wins; otherwise [`which::which`] searches
    /// `PATH`. Tools that are not found are left out.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let configured = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                "ffprobe" => config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match configured {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist; searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(name.to_string(), path);
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths without touching the file system.
    pub fn with_paths(paths: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            tools: paths.into_iter().collect(),
        }
    }

    /// Path of a tool, or [`rf_core::Error::Tool`] if it was not found.
    pub fn require(&self, name: &str) -> rf_core::Result<&Path> {
        self.tools.get(name).map(PathBuf::as_path).ok_or_else(|| {
            rf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}
