//! Platform paths and Java runtime discovery
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::platform::{default_minecraft_dir, locate_java};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let game_dir = default_minecraft_dir()?;
//! let java = locate_java(None, Path::new("profiles/skyfactory/runtime"))?;
//! println!("{} / {:?}", game_dir.display(), java);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::debug;

/// Name of the Java executable on this platform
pub fn java_executable_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Default game directory of the official launcher
///
/// - Windows: `%APPDATA%\.minecraft`
/// - macOS: `~/Library/Application Support/minecraft`
/// - elsewhere: `~/.minecraft`
pub fn default_minecraft_dir() -> Result<PathBuf> {
    let missing = || Error::Other("Could not determine the Minecraft directory; set launcher.minecraft_directory".to_string());

    if cfg!(windows) {
        dirs::config_dir().map(|d| d.join(".minecraft")).ok_or_else(missing)
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("minecraft")).ok_or_else(missing)
    } else {
        dirs::home_dir().map(|d| d.join(".minecraft")).ok_or_else(missing)
    }
}

/// Find a Java executable
///
/// A configured path must exist: when it does not, the search stops with
/// [`Error::RuntimeNotFound`] naming it. Without one, checked in order:
/// `<runtime_dir>/bin/java`, `$JAVA_HOME/bin/java`, then `java` on `PATH`.
pub fn locate_java(configured: Option<&Path>, runtime_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = configured {
        if path.is_file() {
            debug!("Using configured Java runtime {}", path.display());
            return Ok(Some(path.to_path_buf()));
        }
        // A bare name like "java17" is looked up on PATH
        if path.components().count() == 1 {
            if let Ok(found) = which::which(path) {
                return Ok(Some(found));
            }
        }
        return Err(Error::RuntimeNotFound(format!(
            " at the configured path {}",
            path.display()
        )));
    }

    let bundled = runtime_dir.join("bin").join(java_executable_name());
    if bundled.is_file() {
        debug!("Using profile runtime {}", bundled.display());
        return Ok(Some(bundled));
    }

    if let Some(java_home) = env::var_os("JAVA_HOME") {
        let candidate = PathBuf::from(java_home).join("bin").join(java_executable_name());
        if candidate.is_file() {
            debug!("Using JAVA_HOME runtime {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(which::which("java").ok())
}

/// Total physical memory in megabytes
pub fn total_memory_mb() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory() / 1024 / 1024
}

/// Heap size to give the game: half the physical memory, between 1 and 8 GiB
pub fn max_recommended_memory_mb() -> u64 {
    recommended_from_total(total_memory_mb())
}

fn recommended_from_total(total_mb: u64) -> u64 {
    (total_mb / 2).clamp(1024, 8192)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_recommended_memory_bounds() {
        assert_eq!(recommended_from_total(1024), 1024);
        assert_eq!(recommended_from_total(8192), 4096);
        assert_eq!(recommended_from_total(65536), 8192);
    }

    #[test]
    fn test_configured_java_wins() {
        let temp_dir = TempDir::new().unwrap();
        let java = temp_dir.path().join("my-java");
        fs::write(&java, "").unwrap();

        let found = locate_java(Some(&java), &temp_dir.path().join("runtime")).unwrap();
        assert_eq!(found, Some(java));
    }

    #[test]
    fn test_profile_runtime_used_when_nothing_configured() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = temp_dir.path().join("runtime");
        let bundled = runtime.join("bin").join(java_executable_name());
        fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        fs::write(&bundled, "").unwrap();

        assert_eq!(locate_java(None, &runtime).unwrap(), Some(bundled));
    }

    #[test]
    fn test_missing_configured_java_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = temp_dir.path().join("runtime");
        let bundled = runtime.join("bin").join(java_executable_name());
        fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        fs::write(&bundled, "").unwrap();

        let missing = temp_dir.path().join("missing").join("java");
        match locate_java(Some(&missing), &runtime) {
            Err(Error::RuntimeNotFound(detail)) => {
                assert!(detail.contains(&missing.display().to_string()))
            }
            other => panic!("expected RuntimeNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_default_minecraft_dir_is_named_minecraft() {
        if let Ok(dir) = default_minecraft_dir() {
            let name = dir.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.ends_with("minecraft"));
        }
    }
}
