//! Modpack manifest parsing and validation
//!
//! A manifest (`modpack.json`) describes what one profile should contain: the
//! target game versions, the release channel policy, the mods to resolve
//! through the repository, mods hosted elsewhere, and the mod loader
//! installer. It is validated once at load time; every missing or malformed
//! field is reported together in a single [`Error::ManifestInvalid`].
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::ModpackManifest;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = ModpackManifest::load("modpack/modpack.json")?;
//! println!("{} mods for {:?}", manifest.mods.len(), manifest.game_versions);
//! # Ok(())
//! # }
//! ```

use crate::downloader::url_file_name;
use crate::registry::ReleaseType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default manifest filename inside a modpack directory
pub const MANIFEST_NAME: &str = "modpack.json";

/// Directory next to the manifest holding bundled configuration files
pub const CONFIG_BUNDLE_DIR: &str = "config";

/// Which release channels a mod file may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePreference {
    /// Release files only
    Stable,
    /// Release and beta files
    Beta,
    /// Any file
    Alpha,
}

impl ReleasePreference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stable" | "release" => Some(Self::Stable),
            "beta" => Some(Self::Beta),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    /// Whether a file published on `channel` is acceptable
    pub fn allows(self, channel: ReleaseType) -> bool {
        match self {
            Self::Stable => channel == ReleaseType::Release,
            Self::Beta => channel != ReleaseType::Alpha,
            Self::Alpha => true,
        }
    }
}

impl fmt::Display for ReleasePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Beta => write!(f, "beta"),
            Self::Alpha => write!(f, "alpha"),
        }
    }
}

/// Validated modpack manifest
#[derive(Debug, Clone, Serialize)]
pub struct ModpackManifest {
    /// Profile identifier; also the profile directory name
    pub profile_id: String,

    /// Display name for the launcher profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,

    /// Base64-encoded PNG icon for the launcher profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_icon: Option<String>,

    /// Launcher version id the profile starts (e.g. "1.12.2-forge-14.23.5.2860")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    /// Target game versions, most preferred first
    pub game_versions: Vec<String>,

    pub release_preference: ReleasePreference,

    /// Repository mod identifiers (slugs), in resolution order
    pub mods: Vec<String>,

    /// Directly downloadable mod URLs
    pub external_mods: Vec<String>,

    /// URL of the mod loader installer
    pub installer_url: String,

    /// Directory the manifest was loaded from
    #[serde(skip)]
    pub bundle_dir: Option<PathBuf>,
}

impl ModpackManifest {
    /// Load a manifest from a file, or from `modpack.json` inside a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path = if path.is_dir() {
            path.join(MANIFEST_NAME)
        } else {
            path.to_path_buf()
        };

        if !path.is_file() {
            return Err(Error::ManifestInvalid(vec![format!(
                "manifest not found: {}",
                path.display()
            )]));
        }

        let content = fs::read_to_string(&path)?;
        let mut manifest = Self::from_json(&content)?;
        manifest.bundle_dir = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    /// Parse and validate a manifest document
    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| Error::ManifestInvalid(vec![format!("not valid JSON: {}", e)]))?;
        Self::from_value(value)
    }

    /// Validate an already parsed document, collecting every problem
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(Error::ManifestInvalid(vec![
                    "manifest must be a JSON object".to_string(),
                ]))
            }
        };

        let mut problems = Vec::new();

        let profile_id = required_string(&map, &["profile_id"], &mut problems);
        if let Some(id) = &profile_id {
            if let Some(problem) = check_profile_id(id) {
                problems.push(problem);
            }
        }

        let profile_name = optional_string(&map, "profile_name", &mut problems);
        let profile_icon = optional_string(&map, "profile_icon", &mut problems);
        let version_id = optional_string(&map, "version_id", &mut problems);

        let game_versions = match lookup(&map, &["game_versions"]) {
            Some((key, value)) => string_list(key, value, &mut problems),
            None => {
                problems.push("missing field 'game_versions'".to_string());
                None
            }
        };
        if let Some(versions) = &game_versions {
            if versions.is_empty() {
                problems.push("'game_versions' must list at least one version".to_string());
            }
            check_duplicates("game_versions", versions, &mut problems);
        }

        let release_preference =
            match required_string(&map, &["release_preference"], &mut problems) {
                Some(raw) => {
                    let parsed = ReleasePreference::parse(&raw);
                    if parsed.is_none() {
                        problems.push(format!(
                            "'release_preference' must be one of stable, beta, alpha (got '{}')",
                            raw
                        ));
                    }
                    parsed
                }
                None => None,
            };

        let mods = match lookup(&map, &["mods", "curse_mods"]) {
            Some((key, value)) => string_list(key, value, &mut problems),
            None => Some(Vec::new()),
        };
        if let Some(mods) = &mods {
            check_duplicates("mods", mods, &mut problems);
        }

        let external_mods = match lookup(&map, &["external_mods"]) {
            Some((key, value)) => string_list(key, value, &mut problems),
            None => Some(Vec::new()),
        };
        if let Some(urls) = &external_mods {
            let mut names = HashSet::new();
            for url in urls {
                match check_download_url(url) {
                    Ok(name) => {
                        if !names.insert(name.clone()) {
                            problems.push(format!(
                                "'external_mods' has two URLs for the file name '{}'",
                                name
                            ));
                        }
                    }
                    Err(problem) => problems.push(format!("'external_mods': {}", problem)),
                }
            }
        }

        let installer_url =
            required_string(&map, &["installer_url", "forge_download"], &mut problems);
        if let Some(url) = &installer_url {
            if let Err(problem) = check_download_url(url) {
                problems.push(format!("'installer_url': {}", problem));
            }
        }

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::debug!("Ignoring unknown manifest field '{}'", key);
            }
        }

        match (
            profile_id,
            game_versions,
            release_preference,
            mods,
            external_mods,
            installer_url,
        ) {
            (
                Some(profile_id),
                Some(game_versions),
                Some(release_preference),
                Some(mods),
                Some(external_mods),
                Some(installer_url),
            ) if problems.is_empty() => Ok(Self {
                profile_id,
                profile_name,
                profile_icon,
                version_id,
                game_versions,
                release_preference,
                mods,
                external_mods,
                installer_url,
                bundle_dir: None,
            }),
            _ => Err(Error::ManifestInvalid(problems)),
        }
    }

    /// Bundled configuration tree, if the modpack ships one
    pub fn config_bundle(&self) -> Option<PathBuf> {
        self.bundle_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_BUNDLE_DIR))
            .filter(|dir| dir.is_dir())
    }

    /// Name shown in the launcher
    pub fn display_name(&self) -> &str {
        self.profile_name.as_deref().unwrap_or(&self.profile_id)
    }
}

const KNOWN_KEYS: &[&str] = &[
    "profile_id",
    "profile_name",
    "profile_icon",
    "version_id",
    "game_versions",
    "release_preference",
    "mods",
    "curse_mods",
    "external_mods",
    "installer_url",
    "forge_download",
];

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|key| map.get(*key).map(|value| (*key, value)))
}

fn required_string(
    map: &Map<String, Value>,
    keys: &[&'static str],
    problems: &mut Vec<String>,
) -> Option<String> {
    match lookup(map, keys) {
        Some((_, Value::String(s))) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some((key, Value::String(_))) => {
            problems.push(format!("'{}' must not be empty", key));
            None
        }
        Some((key, _)) => {
            problems.push(format!("'{}' must be a string", key));
            None
        }
        None => {
            problems.push(format!("missing field '{}'", keys[0]));
            None
        }
    }
}

fn optional_string(
    map: &Map<String, Value>,
    key: &'static str,
    problems: &mut Vec<String>,
) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            problems.push(format!("'{}' must be a string", key));
            None
        }
    }
}

fn string_list(key: &str, value: &Value, problems: &mut Vec<String>) -> Option<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        _ => {
            problems.push(format!("'{}' must be an array of strings", key));
            return None;
        }
    };

    let mut list = Vec::with_capacity(items.len());
    let mut ok = true;
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::String(s) if !s.trim().is_empty() => list.push(s.trim().to_string()),
            Value::String(_) => {
                problems.push(format!("'{}[{}]' must not be empty", key, index));
                ok = false;
            }
            _ => {
                problems.push(format!("'{}[{}]' must be a string", key, index));
                ok = false;
            }
        }
    }

    ok.then_some(list)
}

fn check_duplicates(key: &str, values: &[String], problems: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            problems.push(format!("'{}' lists '{}' more than once", key, value));
        }
    }
}

fn check_profile_id(id: &str) -> Option<String> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid_chars || id == "." || id == ".." {
        Some(format!(
            "'profile_id' may only contain letters, digits, '-', '_' and '.' (got '{}')",
            id
        ))
    } else {
        None
    }
}

fn check_download_url(raw: &str) -> std::result::Result<String, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("'{}' is not a valid URL ({})", raw, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("'{}' must use http or https", raw));
    }
    url_file_name(raw).ok_or_else(|| format!("'{}' does not name a file", raw))
}
