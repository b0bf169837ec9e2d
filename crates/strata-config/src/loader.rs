use std::path::{Path, PathBuf};

use strata_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const LOCAL_CANDIDATES: [&str; 3] = ["strata.toml", "strata.yml", "strata.yaml"];

/// Resolves and parses the configuration file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `explicit` if given, otherwise from the first candidate that
    /// exists. Falls back to defaults when nothing is found.
    pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "config file {}",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        for candidate in Self::candidates() {
            if candidate.is_file() {
                return Self::load_from(&candidate);
            }
        }

        debug!("no config file found, using defaults");
        Ok(AppConfig::default())
    }

    /// Parse a single file, choosing the format from its extension.
    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)?;
        let config = parse(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = LOCAL_CANDIDATES.iter().map(PathBuf::from).collect();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("strata").join("config.toml"));
        }
        paths
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
