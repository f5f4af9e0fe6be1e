//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.modpack-builder/config.toml`.
//! Every section is optional; missing keys take their defaults. CLI flags
//! override loaded values for a single run without touching the file.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load()?;
//! println!("Registry: {}", config.registry.url);
//!
//! config.set_value("network.max_concurrent_downloads", "8")?;
//! config.save()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "MODPACK_BUILDER_CONFIG_DIR";

/// Environment variable overriding `registry.api_key`
pub const API_KEY_ENV: &str = "MODPACK_BUILDER_API_KEY";

pub const MAX_CONCURRENT_REQUESTS: usize = 32;
pub const MAX_CONCURRENT_DOWNLOADS: usize = 16;

/// User configuration file (`~/.modpack-builder/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    /// Mod repository settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Java runtime and mod loader installer settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Repository lookups in flight while building a lock file
    #[serde(default = "default_concurrency")]
    pub max_concurrent_requests: usize,

    /// Artifact transfers in flight
    #[serde(default = "default_concurrency")]
    pub max_concurrent_downloads: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    format!("modpack-builder/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_concurrency(),
            max_concurrent_downloads: default_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    /// `max_concurrent_requests` clamped to 1..=32
    pub fn requests_limit(&self) -> usize {
        self.max_concurrent_requests.clamp(1, MAX_CONCURRENT_REQUESTS)
    }

    /// `max_concurrent_downloads` clamped to 1..=16
    pub fn downloads_limit(&self) -> usize {
        self.max_concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry type: "http" or "file"
    #[serde(default = "default_registry_type")]
    pub registry_type: String,

    /// API base URL (for HTTP registry)
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Directory of project documents (for file registry)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Repository game id (432 is Minecraft)
    #[serde(default = "default_game_id")]
    pub game_id: u32,
}

fn default_registry_type() -> String {
    "http".to_string()
}

fn default_registry_url() -> String {
    "https://api.curseforge.com".to_string()
}

fn default_game_id() -> u32 {
    432
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_type: default_registry_type(),
            url: default_registry_url(),
            path: None,
            api_key: None,
            game_id: default_game_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Java executable; searched for when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_path: Option<PathBuf>,

    /// Maximum heap for the launcher profile (-Xmx); derived from total RAM when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,

    /// Extra arguments appended to `java -jar <installer>`
    #[serde(default)]
    pub installer_args: Vec<String>,

    /// Send installer output to debug logs instead of discarding it
    #[serde(default)]
    pub capture_installer_output: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Game directory holding `profiles/` and `launcher_profiles.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_directory: Option<PathBuf>,
}

/// Keys accepted by [`Config::set_value`]
pub const SETTABLE_KEYS: &[&str] = &[
    "network.max_concurrent_requests",
    "network.max_concurrent_downloads",
    "network.user_agent",
    "registry.registry_type",
    "registry.url",
    "registry.path",
    "registry.api_key",
    "registry.game_id",
    "runtime.java_path",
    "runtime.memory_mb",
    "runtime.installer_args",
    "runtime.capture_installer_output",
    "launcher.minecraft_directory",
];

impl Config {
    /// Get the default config file path
    ///
    /// Uses MODPACK_BUILDER_CONFIG_DIR if set, otherwise ~/.modpack-builder/config.toml
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".modpack-builder").join("config.toml"))
    }

    /// Load config from the default path, or defaults if it doesn't exist
    ///
    /// `MODPACK_BUILDER_API_KEY` overrides `registry.api_key`.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Self::default_path()?)?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                config.registry.api_key = Some(key);
            }
        }

        Ok(config)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path()?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Game directory: configured value (with `~` expanded) or the platform default
    pub fn minecraft_directory(&self) -> Result<PathBuf> {
        match &self.launcher.minecraft_directory {
            Some(dir) => Ok(expand_path(dir)),
            None => crate::platform::default_minecraft_dir(),
        }
    }

    /// Configured Java executable with `~` expanded
    pub fn java_path(&self) -> Option<PathBuf> {
        self.runtime.java_path.as_deref().map(expand_path)
    }

    /// Heap size for the launcher profile
    pub fn memory_mb(&self) -> u64 {
        self.runtime
            .memory_mb
            .unwrap_or_else(crate::platform::max_recommended_memory_mb)
    }

    /// Set one dotted key from its string form
    ///
    /// An empty value clears optional keys.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "network.max_concurrent_requests" => {
                self.network.max_concurrent_requests = parse_bounded(key, value, MAX_CONCURRENT_REQUESTS)?;
            }
            "network.max_concurrent_downloads" => {
                self.network.max_concurrent_downloads = parse_bounded(key, value, MAX_CONCURRENT_DOWNLOADS)?;
            }
            "network.user_agent" => self.network.user_agent = value.to_string(),
            "registry.registry_type" => {
                if value != "http" && value != "file" {
                    return Err(Error::Other(format!(
                        "Invalid value for {}: expected \"http\" or \"file\"",
                        key
                    )));
                }
                self.registry.registry_type = value.to_string();
            }
            "registry.url" => self.registry.url = value.to_string(),
            "registry.path" => self.registry.path = optional(value).map(PathBuf::from),
            "registry.api_key" => self.registry.api_key = optional(value).map(str::to_string),
            "registry.game_id" => {
                self.registry.game_id = value
                    .parse()
                    .map_err(|_| Error::Other(format!("Invalid value for {}: expected a number", key)))?;
            }
            "runtime.java_path" => self.runtime.java_path = optional(value).map(PathBuf::from),
            "runtime.memory_mb" => {
                self.runtime.memory_mb = match optional(value) {
                    Some(v) => Some(v.parse().map_err(|_| {
                        Error::Other(format!("Invalid value for {}: expected a number", key))
                    })?),
                    None => None,
                };
            }
            "runtime.installer_args" => {
                self.runtime.installer_args = value.split_whitespace().map(str::to_string).collect();
            }
            "runtime.capture_installer_output" => {
                self.runtime.capture_installer_output = value.parse().map_err(|_| {
                    Error::Other("Invalid boolean value. Use 'true' or 'false'".to_string())
                })?;
            }
            "launcher.minecraft_directory" => {
                self.launcher.minecraft_directory = optional(value).map(PathBuf::from);
            }
            _ => {
                return Err(Error::Other(format!(
                    "Unknown configuration key '{}'\n\nAvailable keys:\n{}",
                    key,
                    SETTABLE_KEYS
                        .iter()
                        .map(|k| format!("  - {}", k))
                        .collect::<Vec<_>>()
                        .join("\n")
                )))
            }
        }
        Ok(())
    }
}

fn optional(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn parse_bounded(key: &str, value: &str, max: usize) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(Error::Other(format!(
            "Invalid value for {}: expected a number from 1 to {}",
            key, max
        ))),
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.max_concurrent_requests, 4);
        assert_eq!(config.network.max_concurrent_downloads, 4);
        assert_eq!(config.registry.registry_type, "http");
        assert_eq!(config.registry.game_id, 432);
        assert!(config.runtime.java_path.is_none());
        assert!(!config.runtime.capture_installer_output);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [network]
            max_concurrent_downloads = 8

            [registry]
            registry_type = "file"
            path = "/srv/mirror"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.max_concurrent_downloads, 8);
        assert_eq!(config.network.max_concurrent_requests, 4);
        assert_eq!(config.registry.path, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(config.registry.url, "https://api.curseforge.com");
    }

    #[test]
    fn test_limits_are_clamped() {
        let mut config = Config::default();
        config.network.max_concurrent_requests = 0;
        config.network.max_concurrent_downloads = 500;
        assert_eq!(config.network.requests_limit(), 1);
        assert_eq!(config.network.downloads_limit(), MAX_CONCURRENT_DOWNLOADS);
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("network.max_concurrent_downloads", "2").unwrap();
        config.set_value("runtime.java_path", "/opt/java/bin/java").unwrap();
        config.set_value("runtime.installer_args", "--installClient .").unwrap();
        config.set_value("runtime.capture_installer_output", "true").unwrap();

        assert_eq!(config.network.max_concurrent_downloads, 2);
        assert_eq!(config.runtime.java_path, Some(PathBuf::from("/opt/java/bin/java")));
        assert_eq!(config.runtime.installer_args, vec!["--installClient", "."]);
        assert!(config.runtime.capture_installer_output);

        config.set_value("runtime.java_path", "").unwrap();
        assert!(config.runtime.java_path.is_none());
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set_value("network.max_concurrent_downloads", "0").is_err());
        assert!(config.set_value("network.max_concurrent_requests", "lots").is_err());
        assert!(config.set_value("registry.registry_type", "ftp").is_err());

        let err = config.set_value("build.platforms", "x").unwrap_err();
        assert!(err.to_string().contains("registry.url"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.launcher.minecraft_directory = Some(PathBuf::from("/games/minecraft"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.launcher.minecraft_directory,
            Some(PathBuf::from("/games/minecraft"))
        );
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.registry.registry_type, "http");
    }
}
