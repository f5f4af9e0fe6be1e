//! Lock file generation and parsing for reproducible installs
//!
//! The lock file (`modlist.lock.json` at the profile root) pins the exact
//! repository file chosen for every mod of a profile. It is built once, the
//! first time mods are installed, and loaded verbatim on every later run until
//! it is deleted. Editing the manifest's mod list does not touch existing
//! entries; deleting the lock file is the only way to re-resolve.
//!
//! Entries keep manifest order so the file diffs cleanly.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::LockFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(lock) = LockFile::load_from("profiles/skyfactory/modlist.lock.json")? {
//!     for (slug, entry) in lock.iter() {
//!         println!("{}: {}", slug, entry.source_file_name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::profile::Profile;
use crate::registry::{ModResolver, ReleaseType};
use crate::resolver::resolve_all;
use crate::{Error, ModpackManifest, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The lock file name at the profile root
pub const LOCKFILE_NAME: &str = "modlist.lock.json";

/// The pinned repository artifact for one mod
///
/// The older `project_*` / `file_*` key names are accepted when loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLock {
    /// Repository project id
    #[serde(alias = "project_id")]
    pub artifact_id: u64,

    /// Project page
    #[serde(alias = "project_url")]
    pub artifact_url: String,

    /// Project display name
    #[serde(alias = "project_name")]
    pub artifact_name: String,

    /// Pinned file id
    #[serde(alias = "file_id")]
    pub source_file_id: u64,

    /// Download URL of the pinned file
    #[serde(alias = "file_url")]
    pub source_file_url: String,

    /// File name the artifact is stored under in `mods/`
    #[serde(alias = "file_name")]
    pub source_file_name: String,

    pub release_type: ReleaseType,
}

/// Ordered mapping of mod identifier to pinned artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    entries: Vec<(String, ArtifactLock)>,
}

impl LockFile {
    /// Create an empty lock file
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries already in the desired order
    ///
    /// A later entry for an identifier replaces the earlier one in place.
    pub fn from_entries(entries: Vec<(String, ArtifactLock)>) -> Self {
        let mut lock = Self::new();
        for (slug, entry) in entries {
            lock.insert(slug, entry);
        }
        lock
    }

    /// Load a lock file from a path
    ///
    /// Returns `Ok(None)` when the file does not exist or holds nothing but
    /// whitespace. Anything else that is not a well-formed mapping is
    /// [`Error::LockFileCorrupt`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        if !path.is_file() {
            return Err(Error::LockFileCorrupt {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let contents = fs::read_to_string(path).map_err(|e| Error::LockFileCorrupt {
            path: path.to_path_buf(),
            reason: format!("unreadable: {}", e),
        })?;

        if contents.trim().is_empty() {
            warn!("Lock file {} is empty, treating it as absent", path.display());
            return Ok(None);
        }

        let lock: LockFile = serde_json::from_str(&contents).map_err(|e| Error::LockFileCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Some(lock))
    }

    /// Save the lock file, replacing any previous one atomically
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Add or replace an entry, keeping the position of a replaced one
    pub fn insert(&mut self, slug: String, entry: ArtifactLock) {
        match self.entries.iter_mut().find(|(s, _)| *s == slug) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((slug, entry)),
        }
    }

    pub fn get(&self, slug: &str) -> Option<&ArtifactLock> {
        self.entries
            .iter()
            .find(|(s, _)| s == slug)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.get(slug).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtifactLock)> {
        self.entries.iter().map(|(slug, entry)| (slug.as_str(), entry))
    }

    /// Mod identifiers in file order
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(slug, _)| slug.as_str())
    }
}

impl Serialize for LockFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (slug, entry) in &self.entries {
            map.serialize_entry(slug, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LockFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LockFileVisitor;

        impl<'de> Visitor<'de> for LockFileVisitor {
            type Value = LockFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of mod identifiers to locked artifacts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<LockFile, A::Error> {
                let mut entries: Vec<(String, ArtifactLock)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((slug, entry)) = access.next_entry::<String, ArtifactLock>()? {
                    if entries.iter().any(|(s, _)| *s == slug) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate mod identifier '{}'",
                            slug
                        )));
                    }
                    entries.push((slug, entry));
                }
                Ok(LockFile { entries })
            }
        }

        deserializer.deserialize_map(LockFileVisitor)
    }
}

/// Load the profile's lock file, or resolve every manifest mod and persist it
///
/// An existing lock file is returned verbatim without touching the resolver,
/// even when the manifest's mod list has changed since. When it has to be
/// built, resolution runs with at most `max_concurrent_requests` calls in
/// flight; the first failure aborts the build and nothing is written.
pub async fn load_or_build(
    profile: &Profile,
    manifest: &ModpackManifest,
    resolver: Arc<dyn ModResolver>,
    max_concurrent_requests: usize,
) -> Result<LockFile> {
    let path = profile.lock_path();

    if let Some(lock) = LockFile::load_from(&path)? {
        info!("Loading modlist information from {}", path.display());
        report_drift(&lock, manifest);
        return Ok(lock);
    }

    info!("Creating modlist information for {} mod(s)...", manifest.mods.len());

    let entries = resolve_all(
        resolver,
        &manifest.mods,
        &manifest.game_versions,
        manifest.release_preference,
        max_concurrent_requests,
    )
    .await?;
    let lock = LockFile::from_entries(entries);

    info!("Dumping modlist information to {}", path.display());
    profile.ensure_layout()?;
    lock.save_to(&path)?;

    Ok(lock)
}

fn report_drift(lock: &LockFile, manifest: &ModpackManifest) {
    let wanted: HashSet<&str> = manifest.mods.iter().map(String::as_str).collect();

    for slug in &manifest.mods {
        if !lock.contains(slug) {
            warn!(
                "Mod '{}' is in the manifest but not in the lock file; delete the lock file to resolve it",
                slug
            );
        }
    }
    for slug in lock.slugs() {
        if !wanted.contains(slug) {
            warn!("Mod '{}' is locked but no longer in the manifest", slug);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str) -> ArtifactLock {
        ArtifactLock {
            artifact_id: 100,
            artifact_url: format!("https://example.com/{}", name),
            artifact_name: name.to_string(),
            source_file_id: 200,
            source_file_url: format!("https://example.com/{}.jar", name),
            source_file_name: format!("{}.jar", name),
            release_type: ReleaseType::Release,
        }
    }

    #[test]
    fn test_lockfile_new() {
        let lock = LockFile::new();
        assert!(lock.is_empty());
        assert_eq!(lock.len(), 0);
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut lock = LockFile::new();
        lock.insert("jei".to_string(), entry("jei"));
        lock.insert("optifine".to_string(), entry("optifine"));
        lock.insert("jei".to_string(), entry("jei-new"));

        let slugs: Vec<_> = lock.slugs().collect();
        assert_eq!(slugs, vec!["jei", "optifine"]);
        assert_eq!(lock.get("jei").unwrap().artifact_name, "jei-new");
    }

    #[test]
    fn test_serialization_preserves_order() {
        let lock = LockFile::from_entries(vec![
            ("zeta".to_string(), entry("zeta")),
            ("alpha".to_string(), entry("alpha")),
        ]);

        let json = serde_json::to_string_pretty(&lock).unwrap();
        let zeta = json.find("\"zeta\"").unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        assert!(zeta < alpha, "entries must keep insertion order");

        let parsed: LockFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lock);
    }

    #[test]
    fn test_legacy_keys_load() {
        let json = r#"{
            "jei": {
                "project_id": 238222,
                "project_url": "https://www.curseforge.com/minecraft/mc-mods/jei",
                "project_name": "Just Enough Items",
                "file_id": 2995910,
                "file_url": "https://edge.forgecdn.net/files/2995/910/jei.jar",
                "file_name": "jei.jar",
                "release_type": "release"
            }
        }"#;
        let lock: LockFile = serde_json::from_str(json).unwrap();
        let jei = lock.get("jei").unwrap();
        assert_eq!(jei.artifact_id, 238222);
        assert_eq!(jei.source_file_name, "jei.jar");
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let json = format!(
            "{{\"jei\": {}, \"jei\": {}}}",
            serde_json::to_string(&entry("a")).unwrap(),
            serde_json::to_string(&entry("b")).unwrap()
        );
        assert!(serde_json::from_str::<LockFile>(&json).is_err());
    }

    #[test]
    fn test_load_missing_and_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCKFILE_NAME);
        assert!(LockFile::load_from(&path).unwrap().is_none());

        fs::write(&path, "  \n").unwrap();
        assert!(LockFile::load_from(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCKFILE_NAME);
        fs::write(&path, r#"{"jei": {"artifact_id": "not a number"}}"#).unwrap();

        let err = LockFile::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::LockFileCorrupt { .. }));
        assert!(err.to_string().contains("delete it to re-resolve"));
    }

    #[test]
    fn test_load_directory_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCKFILE_NAME);
        fs::create_dir_all(&path).unwrap();

        let err = LockFile::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::LockFileCorrupt { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCKFILE_NAME);
        let lock = LockFile::from_entries(vec![("jei".to_string(), entry("jei"))]);

        lock.save_to(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = LockFile::load_from(&path).unwrap().unwrap();
        assert_eq!(reloaded, lock);
    }
}
