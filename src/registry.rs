//! Mod repository clients and metadata types
//!
//! The pipeline only sees the [`ModResolver`] trait. [`RegistryClient`] is the
//! shipped implementation: either a local directory of project documents
//! (offline mirrors, tests) or a CurseForge-compatible HTTP API.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::{Config, ModResolver, RegistryClient, ReleasePreference};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RegistryClient::from_config(&Config::load()?)?;
//! let versions = vec!["1.12.2".to_string()];
//! let lock = registry.resolve("jei", &versions, ReleasePreference::Stable).await?;
//! println!("jei -> {}", lock.source_file_name);
//! # Ok(())
//! # }
//! ```

use crate::lockfile::ArtifactLock;
use crate::{Error, ReleasePreference, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Release channel a file was published on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Release,
    Beta,
    Alpha,
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseType::Release => write!(f, "release"),
            ReleaseType::Beta => write!(f, "beta"),
            ReleaseType::Alpha => write!(f, "alpha"),
        }
    }
}

/// A mod project and every file published for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryProject {
    pub id: u64,
    pub slug: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub files: Vec<RegistryFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    pub id: u64,
    pub file_name: String,
    pub download_url: String,
    pub release_type: ReleaseType,
    /// Game versions this file declares support for (e.g. ["1.12.2", "Forge"])
    #[serde(default)]
    pub game_versions: Vec<String>,
    /// Publication timestamp
    pub file_date: DateTime<Utc>,
}

/// Resolves a mod identifier to a pinned artifact
#[async_trait]
pub trait ModResolver: Send + Sync {
    /// Pick one file for `slug`
    ///
    /// `game_versions` are tried in order; the first version with any file on
    /// an allowed channel wins, and the newest such file is pinned.
    async fn resolve(
        &self,
        slug: &str,
        game_versions: &[String],
        preference: ReleasePreference,
    ) -> Result<ArtifactLock>;
}

pub enum RegistryClient {
    File(FileRegistryClient),
    Http(crate::registry_http::HttpRegistryClient),
}

/// Registry backed by a directory of `<slug>.json` project documents
pub struct FileRegistryClient {
    registry_path: PathBuf,
}

impl FileRegistryClient {
    /// Create a new file registry client
    pub fn new<P: AsRef<Path>>(registry_path: P) -> Self {
        Self {
            registry_path: registry_path.as_ref().to_path_buf(),
        }
    }

    fn project_path(&self, slug: &str) -> PathBuf {
        self.registry_path.join(format!("{}.json", slug))
    }

    /// Load a project document
    pub async fn get_project(&self, slug: &str) -> Result<RegistryProject> {
        let path = self.project_path(slug);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Resolution {
                    slug: slug.to_string(),
                    reason: format!(
                        "project not found in registry at {}",
                        self.registry_path.display()
                    ),
                });
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| Error::Resolution {
            slug: slug.to_string(),
            reason: format!("malformed project document {}: {}", path.display(), e),
        })
    }
}

impl RegistryClient {
    /// Create a registry client using configuration
    pub fn from_config(config: &crate::Config) -> Result<Self> {
        match config.registry.registry_type.as_str() {
            "file" => {
                let path = config.registry.path.clone().ok_or_else(|| {
                    Error::Other(
                        "registry.path must be set when registry.registry_type is \"file\""
                            .to_string(),
                    )
                })?;
                Ok(RegistryClient::File(FileRegistryClient::new(path)))
            }
            "http" => {
                let http_client = crate::registry_http::HttpRegistryClient::new(
                    config.registry.url.clone(),
                    config.registry.api_key.clone(),
                    config.registry.game_id,
                    &config.network.user_agent,
                )?;
                Ok(RegistryClient::Http(http_client))
            }
            other => Err(Error::Other(format!(
                "Unknown registry type '{}' (expected \"http\" or \"file\")",
                other
            ))),
        }
    }

    /// Get project metadata and all of its files
    pub async fn get_project(&self, slug: &str) -> Result<RegistryProject> {
        match self {
            RegistryClient::File(client) => client.get_project(slug).await,
            RegistryClient::Http(client) => client.get_project(slug).await,
        }
    }
}

#[async_trait]
impl ModResolver for RegistryClient {
    async fn resolve(
        &self,
        slug: &str,
        game_versions: &[String],
        preference: ReleasePreference,
    ) -> Result<ArtifactLock> {
        let project = self.get_project(slug).await?;
        crate::resolver::lock_for_project(&project, game_versions, preference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_project(dir: &Path) {
        let doc = r#"{
            "id": 238222,
            "slug": "jei",
            "name": "Just Enough Items",
            "url": "https://www.curseforge.com/minecraft/mc-mods/jei",
            "files": [
                {
                    "id": 2995910,
                    "file_name": "jei_1.12.2-4.16.1.301.jar",
                    "download_url": "https://edge.forgecdn.net/files/2995/910/jei_1.12.2-4.16.1.301.jar",
                    "release_type": "release",
                    "game_versions": ["1.12.2"],
                    "file_date": "2020-06-24T10:00:00Z"
                }
            ]
        }"#;
        fs::write(dir.join("jei.json"), doc).unwrap();
    }

    #[tokio::test]
    async fn test_file_registry_resolves() {
        let temp_dir = TempDir::new().unwrap();
        write_project(temp_dir.path());

        let registry = RegistryClient::File(FileRegistryClient::new(temp_dir.path()));
        let lock = registry
            .resolve("jei", &["1.12.2".to_string()], ReleasePreference::Stable)
            .await
            .unwrap();

        assert_eq!(lock.artifact_id, 238222);
        assert_eq!(lock.source_file_id, 2995910);
        assert_eq!(lock.source_file_name, "jei_1.12.2-4.16.1.301.jar");
        assert_eq!(lock.release_type, ReleaseType::Release);
    }

    #[tokio::test]
    async fn test_file_registry_missing_project() {
        let temp_dir = TempDir::new().unwrap();
        let registry = FileRegistryClient::new(temp_dir.path());

        let err = registry.get_project("nope").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref slug, .. } if slug == "nope"));
    }

    #[tokio::test]
    async fn test_file_registry_malformed_document() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bad.json"), "{ not json").unwrap();
        let registry = FileRegistryClient::new(temp_dir.path());

        let err = registry.get_project("bad").await.unwrap_err();
        assert!(err.to_string().contains("malformed project document"));
    }

    #[test]
    fn test_file_registry_requires_path() {
        let mut config = crate::Config::default();
        config.registry.registry_type = "file".to_string();
        config.registry.path = None;
        assert!(RegistryClient::from_config(&config).is_err());
    }
}
