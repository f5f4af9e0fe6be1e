//! Profile directory layout and per-profile run serialization

use crate::lockfile::LOCKFILE_NAME;
use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Advisory lock file held while a pipeline runs on a profile
pub const RUN_LOCK_NAME: &str = ".modpack-builder.lock";

pub const MODS_DIR: &str = "mods";
pub const CONFIG_DIR: &str = "config";
pub const RUNTIME_DIR: &str = "runtime";

/// One installation target: `<minecraft_dir>/profiles/<profile_id>/`
///
/// ```text
/// <profile>/
///   mods/               resolved and external mod files
///   config/             copied from the modpack bundle
///   runtime/            Java runtime and the loader installer
///   modlist.lock.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    root: PathBuf,
}

impl Profile {
    /// Profile `id` under a game directory
    pub fn new(minecraft_dir: &Path, id: &str) -> Self {
        Self::at(minecraft_dir.join("profiles").join(id))
    }

    /// Profile rooted at an explicit directory
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join(MODS_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join(RUNTIME_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCKFILE_NAME)
    }

    pub fn run_lock_path(&self) -> PathBuf {
        self.root.join(RUN_LOCK_NAME)
    }

    /// Create the profile root and its `mods/` directory
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.mods_dir())?;
        Ok(())
    }

    /// Take the profile's run lock
    ///
    /// Fails with [`Error::ProfileBusy`] if another run holds it.
    pub fn lock(&self) -> Result<ProfileGuard> {
        fs::create_dir_all(&self.root)?;
        let path = self.run_lock_path();

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid helps whoever has to clear a stale lock
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired profile lock {}", path.display());
                Ok(ProfileGuard { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::ProfileBusy(path)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds a profile's run lock; released on drop
#[derive(Debug)]
pub struct ProfileGuard {
    path: PathBuf,
}

impl Drop for ProfileGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release profile lock {}: {}", self.path.display(), e);
        }
    }
}
