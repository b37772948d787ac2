use std::path::{Path, PathBuf};

use showcase_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CANDIDATES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

/// Locates and parses the configuration file in a config directory.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Loader rooted at `~/.config/showcase` (or the platform equivalent).
    pub fn default_dir() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("showcase");
        Self::new(dir)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load the first config file found, or defaults when there is none.
    pub fn load(&self) -> Result<AppConfig> {
        for name in CANDIDATES {
            let path = self.config_dir.join(name);
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        debug!(
            "no config file in {}, using defaults",
            self.config_dir.display()
        );
        Ok(AppConfig::default())
    }

    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)?;
        let config = parse(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

fn parse(path: &Path, contents: &str) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}
