//! Launcher profile registration
//!
//! The official launcher lists installations in
//! `<minecraft_dir>/launcher_profiles.json` under `profiles.<id>`. Only the
//! entry for our profile id is touched; every other key in the file is kept
//! as it was.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LAUNCHER_PROFILES_NAME: &str = "launcher_profiles.json";

/// Entry written for a modpack profile
#[derive(Debug, Clone)]
pub struct LauncherProfile {
    pub id: String,
    pub name: String,
    pub game_dir: PathBuf,
    pub version_id: String,
    pub memory_mb: u64,
    /// Base64 PNG, with or without a `data:` prefix
    pub icon: Option<String>,
}

impl LauncherProfile {
    fn to_json(&self, created: &str, now: &str) -> Value {
        let mut entry = json!({
            "name": self.name,
            "type": "custom",
            "gameDir": self.game_dir.to_string_lossy(),
            "lastVersionId": self.version_id,
            "javaArgs": format!("-Xmx{}M", self.memory_mb),
            "created": created,
            "lastUsed": now,
        });
        if let (Some(icon), Some(map)) = (&self.icon, entry.as_object_mut()) {
            let icon = if icon.starts_with("data:") {
                icon.clone()
            } else {
                format!("data:image/png;base64,{}", icon)
            };
            map.insert("icon".to_string(), Value::String(icon));
        }
        entry
    }
}

/// Insert or replace the entry for `profile.id`
///
/// With `keep_created`, an existing entry's `created` timestamp survives.
pub fn upsert(minecraft_dir: &Path, profile: &LauncherProfile, keep_created: bool, now: DateTime<Utc>) -> Result<()> {
    let path = minecraft_dir.join(LAUNCHER_PROFILES_NAME);
    let mut document = read_document(&path)?;

    let root = document.as_object_mut().ok_or_else(|| {
        Error::Other(format!("{} is not a JSON object", path.display()))
    })?;
    let profiles = root
        .entry("profiles")
        .or_insert_with(|| Value::Object(Map::new()));
    let profiles = profiles.as_object_mut().ok_or_else(|| {
        Error::Other(format!("'profiles' in {} is not a JSON object", path.display()))
    })?;

    let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let created = profiles
        .get(&profile.id)
        .filter(|_| keep_created)
        .and_then(|existing| existing.get("created"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| now.clone());

    profiles.insert(profile.id.clone(), profile.to_json(&created, &now));

    fs::create_dir_all(minecraft_dir)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serde_json::to_string_pretty(&document)?)?;
    fs::rename(&tmp_path, &path)?;

    info!("Registered launcher profile '{}' in {}", profile.id, path.display());
    Ok(())
}

fn read_document(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(json!({ "profiles": {} }));
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(json!({ "profiles": {} }));
    }

    serde_json::from_str(&content).map_err(|e| {
        Error::Other(format!(
            "{} is not valid JSON ({}); fix or remove it before installing the profile",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn profile() -> LauncherProfile {
        LauncherProfile {
            id: "skyfactory".to_string(),
            name: "SkyFactory".to_string(),
            game_dir: PathBuf::from("/games/.minecraft/profiles/skyfactory"),
            version_id: "1.12.2-forge-14.23.5.2860".to_string(),
            memory_mb: 4096,
            icon: Some("iVBORw0KGgo=".to_string()),
        }
    }

    fn read(dir: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(dir.join(LAUNCHER_PROFILES_NAME)).unwrap()).unwrap()
    }

    #[test]
    fn test_creates_file_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        upsert(temp_dir.path(), &profile(), false, now).unwrap();

        let doc = read(temp_dir.path());
        let entry = &doc["profiles"]["skyfactory"];
        assert_eq!(entry["type"], "custom");
        assert_eq!(entry["javaArgs"], "-Xmx4096M");
        assert_eq!(entry["lastVersionId"], "1.12.2-forge-14.23.5.2860");
        assert_eq!(entry["icon"], "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(entry["created"], "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_preserves_unrelated_entries() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(LAUNCHER_PROFILES_NAME),
            r#"{
                "profiles": {"vanilla": {"name": "Latest", "type": "latest-release"}},
                "settings": {"locale": "en-us"},
                "version": 3
            }"#,
        )
        .unwrap();

        upsert(temp_dir.path(), &profile(), false, Utc::now()).unwrap();

        let doc = read(temp_dir.path());
        assert_eq!(doc["profiles"]["vanilla"]["type"], "latest-release");
        assert_eq!(doc["settings"]["locale"], "en-us");
        assert_eq!(doc["version"], 3);
        assert!(doc["profiles"]["skyfactory"].is_object());
    }

    #[test]
    fn test_existing_key_order_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(LAUNCHER_PROFILES_NAME),
            r#"{
                "settings": {"locale": "en-us"},
                "profiles": {
                    "zeta": {"name": "Zeta", "type": "custom"},
                    "alpha": {"name": "Alpha", "type": "custom"}
                },
                "version": 3
            }"#,
        )
        .unwrap();

        upsert(temp_dir.path(), &profile(), false, Utc::now()).unwrap();

        let doc = read(temp_dir.path());
        let top: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(top, vec!["settings", "profiles", "version"]);

        let profiles: Vec<&str> = doc["profiles"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(profiles, vec!["zeta", "alpha", "skyfactory"]);
    }

    #[test]
    fn test_keep_created_on_update() {
        let temp_dir = TempDir::new().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        upsert(temp_dir.path(), &profile(), false, first).unwrap();
        upsert(temp_dir.path(), &profile(), true, later).unwrap();

        let doc = read(temp_dir.path());
        let entry = &doc["profiles"]["skyfactory"];
        assert_eq!(entry["created"], "2024-01-01T00:00:00.000Z");
        assert_eq!(entry["lastUsed"], "2024-06-01T00:00:00.000Z");
    }

    #[test]
    fn test_invalid_file_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LAUNCHER_PROFILES_NAME);
        fs::write(&path, "{ broken").unwrap();

        assert!(upsert(temp_dir.path(), &profile(), false, Utc::now()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ broken");
    }
}
