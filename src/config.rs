use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::CacheConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Reference database path (defaults to the user data directory)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
  /// TTL applied to cached reads, in seconds
  #[serde(default = "default_ttl_secs")]
  pub default_ttl_secs: u64,
  /// Maximum number of cached queries
  #[serde(default = "default_max_size")]
  pub max_size: usize,
}

fn default_ttl_secs() -> u64 {
  300
}

fn default_max_size() -> usize {
  50
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      default_ttl_secs: default_ttl_secs(),
      max_size: default_max_size(),
    }
  }
}

impl CacheSettings {
  pub fn cache_config(&self) -> CacheConfig {
    let ttl_secs = i64::try_from(self.default_ttl_secs).unwrap_or(i64::MAX);
    CacheConfig {
      default_ttl: chrono::Duration::try_seconds(ttl_secs).unwrap_or(chrono::Duration::MAX),
      max_size: self.max_size,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./joysense.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/joysense/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("joysense.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("joysense").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.max_size == 0 {
      return Err(eyre!("cache.max_size must be at least 1"));
    }
    // A zero TTL makes every entry expire the moment it is stored
    if config.cache.default_ttl_secs == 0 {
      return Err(eyre!("cache.default_ttl_secs must be at least 1"));
    }
    Ok(config)
  }

  /// Resolve the database path.
  ///
  /// Checks JOYSENSE_DATABASE first, then the config file, then the data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("JOYSENSE_DATABASE") {
      return Ok(PathBuf::from(path));
    }
    if let Some(path) = &self.database {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("joysense.db"))
  }
}

/// Per-user data directory for the database and log file.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("joysense"))
}
