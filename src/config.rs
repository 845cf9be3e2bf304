use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the defaults file
pub const CONFIG_FILENAME: &str = "cloneconfig.json";

const DEFAULT_NAMESPACE: &str = "DMC/labview/";
const DEFAULT_TEMPLATE_URL: &str = "https://gitlab.com/DMC/labview/labview-template-project.git";
const DEFAULT_DEST_BASE_URL: &str = "https://gitlab.com/";

/// Defaults used when the corresponding CLI flag or wizard answer is absent.
///
/// Stored as JSON. Keys missing from the file fall back to the built-in
/// defaults below.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Namespace (group path) that owns new projects. Default: "DMC/labview/"
    pub default_namespace: String,

    /// Template repository cloned as the starting point of a new project
    pub default_template_url: String,

    /// Server base URL, without namespace or project. Default: "https://gitlab.com/"
    pub default_dest_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            default_template_url: DEFAULT_TEMPLATE_URL.to_string(),
            default_dest_base_url: DEFAULT_DEST_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Location of the defaults file.
    ///
    /// `$XDG_CONFIG_HOME/repo-creator/cloneconfig.json`, then
    /// `~/.config/repo-creator/cloneconfig.json`, then the current directory.
    pub fn default_path() -> PathBuf {
        if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME")
            && !config_home.is_empty()
        {
            return PathBuf::from(config_home)
                .join("repo-creator")
                .join(CONFIG_FILENAME);
        }

        if let Some(home_dir) = home::home_dir() {
            return home_dir
                .join(".config")
                .join("repo-creator")
                .join(CONFIG_FILENAME);
        }

        PathBuf::from(CONFIG_FILENAME)
    }

    /// Load the defaults file, creating it with built-in defaults when it is
    /// missing. A file that cannot be read or parsed is moved to `<file>.bak`
    /// and replaced with defaults.
    pub fn load_or_init(path: &Path) -> anyhow::Result<Self> {
        debug!(path = %path.display(), "config:loading");

        if !path.exists() {
            info!(path = %path.display(), "config:not found, writing defaults");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        match Self::load_from_path(path) {
            Ok(config) => {
                debug!(?config, "config:loaded");
                Ok(config)
            }
            Err(e) => {
                let backup = backup_path(path);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "config:unreadable, replacing with defaults"
                );
                fs::rename(path, &backup).with_context(|| {
                    format!(
                        "Failed to move unreadable config {} to {}",
                        path.display(),
                        backup.display()
                    )
                })?;
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
        }
    }

    fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config at {}: {}", path.display(), e))
    }

    /// Write the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let mut contents = serde_json::to_string_pretty(self)?;
        contents.push('\n');
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Create a defaults file at `path`
    pub fn init(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            return Err(anyhow!(
                "{} already exists. Remove it first if you want to regenerate it.",
                path.display()
            ));
        }

        Self::default().save(path)?;
        println!("✓ Created {}", path.display());
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}
