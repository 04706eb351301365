use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  /// Where the local store and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the remote document store
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long cached entries stay valid, in minutes
  #[serde(default = "default_ttl_minutes")]
  pub ttl_minutes: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_minutes: default_ttl_minutes(),
    }
  }
}

fn default_ttl_minutes() -> i64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Total remote attempts, including the first
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// Base backoff delay in milliseconds
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay_ms(),
    }
  }
}

fn default_max_attempts() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  200
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fitsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fitsync/config.yaml
  /// 4. ~/.config/fitsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/fitsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fitsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fitsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the remote API token from environment variables.
  ///
  /// Checks FITSYNC_API_TOKEN first, then FITSYNC_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("FITSYNC_API_TOKEN")
      .or_else(|_| std::env::var("FITSYNC_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set FITSYNC_API_TOKEN or FITSYNC_TOKEN environment variable.")
      })
  }

  /// Resolve the data directory for the local store and logs.
  pub fn resolve_data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("fitsync"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}
