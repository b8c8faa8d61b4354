use anyhow::{Context, Result};
use directories::ProjectDirs;
use hamrs_vision::{vectorize, Vectorizer};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::DistanceMode;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hamrs")
}

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("HAMRS_CONFIG_PATH") {
    Some(path) => PathBuf::from(path),
    None => project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("hamrs.toml")),
});

pub static STORE_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("HAMRS_STORE_PATH") {
    Some(path) => PathBuf::from(path),
    None => project_dirs()
        .map(|d| d.data_dir().join("gallery.bin"))
        .unwrap_or_else(|| PathBuf::from("gallery.bin")),
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum accepted distance; anything strictly above is unknown.
    pub threshold: f32,
    pub mode: DistanceMode,
    pub width: u32,
    pub height: u32,
    /// Intensity cut point for binarization.
    pub cut: u8,
    /// Gallery file; defaults to [`STORE_PATH`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.23,
            mode: DistanceMode::Binary,
            width: vectorize::DEFAULT_WIDTH,
            height: vectorize::DEFAULT_HEIGHT,
            cut: vectorize::DEFAULT_CUT,
            store: None,
        }
    }
}

impl Config {
    pub fn vectorizer(&self) -> Result<Vectorizer> {
        Ok(Vectorizer::new(self.width, self.height)?.with_cut(self.cut))
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| STORE_PATH.clone())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.vectorizer().unwrap().len(), 64 * 80);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "threshold = 0.4\nmode = \"continuous\"\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.threshold, 0.4);
        assert_eq!(cfg.mode, DistanceMode::Continuous);
        assert_eq!(cfg.width, 64);
        assert_eq!(cfg.cut, 127);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            width: 32,
            height: 40,
            store: Some(dir.path().join("faces.bin")),
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
        assert_eq!(cfg.store_path(), dir.path().join("faces.bin"));
    }

    #[test]
    fn test_bad_size() {
        let cfg = Config {
            width: 0,
            ..Config::default()
        };
        assert!(cfg.vectorizer().is_err());
    }
}
