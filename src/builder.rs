//! Installation pipeline for one modpack profile
//!
//! [`ModpackBuilder`] is constructed explicitly from a manifest, a game
//! directory and a [`Config`]; it holds no process-wide state. Every step is a
//! public method that can be called on its own, and [`ModpackBuilder::run`]
//! sequences steps under the profile's run lock:
//!
//! - install: `clean`, `install_mods`, `install_configs`, `install_runtime`,
//!   `install_forge`, `install_profile`
//! - update: `update_mods`, `update_configs`
//!
//! A failing step stops the sequence and is reported as
//! [`Error::StepFailed`]. Nothing is rolled back: files written by earlier
//! steps stay, and re-running is the retry.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::{Config, ModpackBuilder, ModpackManifest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let manifest = ModpackManifest::load("modpack/")?;
//! let mut builder = ModpackBuilder::new(manifest, config.minecraft_directory()?, config);
//! builder.install().await?;
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::downloader::{url_file_name, ArtifactFetcher, DownloadManager, DownloadTask, HttpFetcher, PART_EXTENSION};
use crate::installer::{run_installer, InstallerOptions};
use crate::launcher_profile::{self, LauncherProfile};
use crate::lockfile::{self, LockFile};
use crate::platform::locate_java;
use crate::profile::Profile;
use crate::progress::{emit, ProgressCallback, ProgressEvent};
use crate::registry::{ModResolver, RegistryClient};
use crate::resolver::resolve_all;
use crate::{Config, Error, ModpackManifest, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Clean,
    CleanMods,
    CleanConfigs,
    InstallMods,
    InstallConfigs,
    InstallRuntime,
    InstallForge,
    InstallProfile,
    UpdateMods,
    UpdateConfigs,
    UpdateProfile,
}

impl Step {
    pub const INSTALL: &'static [Step] = &[
        Step::Clean,
        Step::InstallMods,
        Step::InstallConfigs,
        Step::InstallRuntime,
        Step::InstallForge,
        Step::InstallProfile,
    ];

    pub const UPDATE: &'static [Step] = &[Step::UpdateMods, Step::UpdateConfigs];

    pub fn name(self) -> &'static str {
        match self {
            Step::Clean => "clean",
            Step::CleanMods => "clean_mods",
            Step::CleanConfigs => "clean_configs",
            Step::InstallMods => "install_mods",
            Step::InstallConfigs => "install_configs",
            Step::InstallRuntime => "install_runtime",
            Step::InstallForge => "install_forge",
            Step::InstallProfile => "install_profile",
            Step::UpdateMods => "update_mods",
            Step::UpdateConfigs => "update_configs",
            Step::UpdateProfile => "update_profile",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supplies a Java runtime when none is installed
#[async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    /// Install a runtime under `runtime_dir` and return its executable
    async fn provision(&self, runtime_dir: &Path) -> Result<PathBuf>;
}

pub struct ModpackBuilder {
    manifest: ModpackManifest,
    minecraft_dir: PathBuf,
    profile: Profile,
    config: Config,
    resolver: Option<Arc<dyn ModResolver>>,
    fetcher: Option<Arc<dyn ArtifactFetcher>>,
    provisioner: Option<Arc<dyn RuntimeProvisioner>>,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
    java_path: Option<PathBuf>,
    runtime: Option<PathBuf>,
    lock: Option<LockFile>,
    /// Set while `run` holds the profile run lock
    run_active: bool,
}

impl ModpackBuilder {
    /// Builder for `<minecraft_dir>/profiles/<profile_id>`
    ///
    /// The registry client and HTTP fetcher are created from `config` on
    /// first use unless replaced with [`with_resolver`](Self::with_resolver) or
    /// [`with_fetcher`](Self::with_fetcher).
    pub fn new(manifest: ModpackManifest, minecraft_dir: impl Into<PathBuf>, config: Config) -> Self {
        let minecraft_dir = minecraft_dir.into();
        let profile = Profile::new(&minecraft_dir, &manifest.profile_id);
        Self {
            manifest,
            minecraft_dir,
            profile,
            config,
            resolver: None,
            fetcher: None,
            provisioner: None,
            progress: None,
            cancel: CancelToken::new(),
            java_path: None,
            runtime: None,
            lock: None,
            run_active: false,
        }
    }

    /// Install into `root` instead of `<minecraft_dir>/profiles/<profile_id>`
    pub fn with_profile_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.profile = Profile::at(root);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ModResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_runtime_provisioner(mut self, provisioner: Arc<dyn RuntimeProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Java executable to use before any search
    pub fn with_java_path(mut self, java_path: impl Into<PathBuf>) -> Self {
        self.java_path = Some(java_path.into());
        self
    }

    pub fn manifest(&self) -> &ModpackManifest {
        &self.manifest
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lock file loaded or built by an earlier step
    pub fn lock(&self) -> Option<&LockFile> {
        self.lock.as_ref()
    }

    /// Java runtime found by `install_runtime`
    pub fn runtime(&self) -> Option<&Path> {
        self.runtime.as_deref()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Full install under the profile run lock
    pub async fn install(&mut self) -> Result<()> {
        self.run(Step::INSTALL).await
    }

    /// Update under the profile run lock
    pub async fn update(&mut self) -> Result<()> {
        self.run(Step::UPDATE).await
    }

    /// Run `steps` in order while holding the profile run lock
    pub async fn run(&mut self, steps: &[Step]) -> Result<()> {
        let _guard = self.profile.lock()?;
        self.run_active = true;

        let mut result = Ok(());
        for &step in steps {
            if let Err(e) = self.run_step(step).await {
                result = Err(e);
                break;
            }
        }

        self.run_active = false;
        result
    }

    /// Run one step, wrapping its failure with the step name
    pub async fn run_step(&mut self, step: Step) -> Result<()> {
        self.cancel.check()?;

        info!("==> {}", step);
        emit(self.progress.as_ref(), ProgressEvent::Message(format!("Running {}", step)));

        let result = match step {
            Step::Clean => self.clean(),
            Step::CleanMods => self.clean_mods(),
            Step::CleanConfigs => self.clean_configs(),
            Step::InstallMods => self.install_mods().await,
            Step::InstallConfigs => self.install_configs(),
            Step::InstallRuntime => self.install_runtime().await.map(|_| ()),
            Step::InstallForge => self.install_forge().await,
            Step::InstallProfile => self.install_profile(),
            Step::UpdateMods => self.update_mods().await,
            Step::UpdateConfigs => self.update_configs(),
            Step::UpdateProfile => self.update_profile(),
        };

        result.map_err(|source| Error::StepFailed {
            step,
            source: Box::new(source),
        })
    }

    /// `clean_mods` then `clean_configs`
    pub fn clean(&mut self) -> Result<()> {
        self.clean_mods()?;
        self.clean_configs()
    }

    /// Remove leftover partial downloads and, when a lock file exists, mod
    /// files that are neither locked nor an external mod
    pub fn clean_mods(&mut self) -> Result<()> {
        let mods_dir = self.profile.mods_dir();
        if !mods_dir.is_dir() {
            debug!("No mods directory at {}", mods_dir.display());
            return Ok(());
        }

        let expected = self.expected_mod_files()?;
        let part_suffix = format!(".{}", PART_EXTENSION);
        let mut removed = 0;

        for entry in fs::read_dir(&mods_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let stale = name.ends_with(&part_suffix)
                || expected.as_ref().is_some_and(|expected| !expected.contains(&name));

            if stale {
                info!("Removing stale mod file {}", name);
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {} file(s) from {}", removed, mods_dir.display());
        }
        Ok(())
    }

    /// Empty `config/` when the modpack bundles configuration files
    pub fn clean_configs(&mut self) -> Result<()> {
        let config_dir = self.profile.config_dir();
        if self.manifest.config_bundle().is_none() || !config_dir.is_dir() {
            return Ok(());
        }

        info!("Clearing {}", config_dir.display());
        for entry in fs::read_dir(&config_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Load or build the lock file, then download every locked and external mod
    pub async fn install_mods(&mut self) -> Result<()> {
        self.profile.ensure_layout()?;
        let lock = self.ensure_lock().await?.clone();
        let tasks = self.mod_tasks(&lock)?;

        info!("Installing {} mod file(s)...", tasks.len());
        self.download(tasks).await?;
        Ok(())
    }

    /// Prune mod files the lock no longer names, then fetch missing ones
    pub async fn update_mods(&mut self) -> Result<()> {
        self.profile.ensure_layout()?;
        self.ensure_lock().await?;
        self.clean_mods()?;
        self.install_mods().await
    }

    /// Copy the bundled configuration tree over `config/`
    pub fn install_configs(&mut self) -> Result<()> {
        let config_dir = self.profile.config_dir();
        fs::create_dir_all(&config_dir)?;

        match self.manifest.config_bundle() {
            Some(bundle) => {
                let copied = copy_tree(&bundle, &config_dir, false)?;
                info!("Installed {} configuration file(s)", copied);
            }
            None => debug!("Modpack bundles no configuration files"),
        }
        Ok(())
    }

    /// Copy bundled configuration files that are missing or differ
    pub fn update_configs(&mut self) -> Result<()> {
        let config_dir = self.profile.config_dir();
        fs::create_dir_all(&config_dir)?;

        if let Some(bundle) = self.manifest.config_bundle() {
            let copied = copy_tree(&bundle, &config_dir, true)?;
            info!("Updated {} configuration file(s)", copied);
        }
        Ok(())
    }

    /// Find a Java runtime, provisioning one if none is installed
    pub async fn install_runtime(&mut self) -> Result<PathBuf> {
        let runtime_dir = self.profile.runtime_dir();
        let configured = self.java_path.clone().or_else(|| self.config.java_path());

        if let Some(java) = locate_java(configured.as_deref(), &runtime_dir)? {
            info!("Using Java runtime {}", java.display());
            self.runtime = Some(java.clone());
            return Ok(java);
        }

        let provisioner = match &self.provisioner {
            Some(provisioner) => Arc::clone(provisioner),
            None => {
                return Err(Error::RuntimeNotFound(format!(
                    " (searched {}, JAVA_HOME and PATH)",
                    runtime_dir.join("bin").display()
                )))
            }
        };

        info!("No Java runtime found, provisioning one into {}", runtime_dir.display());
        fs::create_dir_all(&runtime_dir)?;
        let java = provisioner.provision(&runtime_dir).await?;
        self.runtime = Some(java.clone());
        Ok(java)
    }

    /// Download the loader installer into `runtime/` and run it
    pub async fn install_forge(&mut self) -> Result<()> {
        self.cancel.check()?;

        let runtime = match self.runtime.clone() {
            Some(runtime) => runtime,
            None => self.install_runtime().await?,
        };

        let runtime_dir = self.profile.runtime_dir();
        let url = self.manifest.installer_url.clone();
        let file_name = url_file_name(&url)
            .ok_or_else(|| Error::Other(format!("Installer URL '{}' does not name a file", url)))?;
        let task = DownloadTask::new(url, &runtime_dir, file_name);
        let installer = task.destination.clone();

        info!("Downloading mod loader installer {}", task.file_name);
        self.download(vec![task]).await?;

        emit(
            self.progress.as_ref(),
            ProgressEvent::Message("Executing mod loader installer".to_string()),
        );
        let options = InstallerOptions {
            args: self.config.runtime.installer_args.clone(),
            working_dir: Some(runtime_dir),
            capture_output: self.config.runtime.capture_installer_output,
        };
        run_installer(&runtime, &installer, &options, &self.cancel).await?;
        Ok(())
    }

    /// Add this profile to the launcher
    pub fn install_profile(&mut self) -> Result<()> {
        self.write_launcher_profile(false)
    }

    /// Refresh the launcher entry, keeping its creation time
    pub fn update_profile(&mut self) -> Result<()> {
        self.write_launcher_profile(true)
    }

    /// Load the lock file, or resolve the manifest and persist one
    ///
    /// Outside [`run`](Self::run) this takes the profile run lock, so it fails
    /// with [`Error::ProfileBusy`] while another run is active.
    pub async fn ensure_lock(&mut self) -> Result<&LockFile> {
        if self.lock.is_none() {
            let _guard = if self.run_active {
                None
            } else {
                Some(self.profile.lock()?)
            };
            let resolver = self.resolver()?;
            let lock = lockfile::load_or_build(
                &self.profile,
                &self.manifest,
                resolver,
                self.config.network.requests_limit(),
            )
            .await?;
            self.lock = Some(lock);
        }

        self.lock
            .as_ref()
            .ok_or_else(|| Error::Other("lock file was not loaded".to_string()))
    }

    /// Resolve every manifest mod again and replace the lock file
    ///
    /// The existing lock file is only replaced once every mod resolved.
    pub async fn relock(&mut self) -> Result<&LockFile> {
        let _guard = self.profile.lock()?;
        let resolver = self.resolver()?;

        info!("Re-resolving {} mod(s)...", self.manifest.mods.len());
        let entries = resolve_all(
            resolver,
            &self.manifest.mods,
            &self.manifest.game_versions,
            self.manifest.release_preference,
            self.config.network.requests_limit(),
        )
        .await?;

        let lock = LockFile::from_entries(entries);
        self.profile.ensure_layout()?;
        lock.save_to(self.profile.lock_path())?;

        let lock: &LockFile = self.lock.insert(lock);
        Ok(lock)
    }

    fn resolver(&mut self) -> Result<Arc<dyn ModResolver>> {
        if let Some(resolver) = &self.resolver {
            return Ok(Arc::clone(resolver));
        }
        let resolver: Arc<dyn ModResolver> = Arc::new(RegistryClient::from_config(&self.config)?);
        self.resolver = Some(Arc::clone(&resolver));
        Ok(resolver)
    }

    fn fetcher(&mut self) -> Result<Arc<dyn ArtifactFetcher>> {
        if let Some(fetcher) = &self.fetcher {
            return Ok(Arc::clone(fetcher));
        }
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(HttpFetcher::new(&self.config.network.user_agent)?);
        self.fetcher = Some(Arc::clone(&fetcher));
        Ok(fetcher)
    }

    async fn download(&mut self, tasks: Vec<DownloadTask>) -> Result<Vec<DownloadTask>> {
        let manager = DownloadManager::new(self.fetcher()?, self.config.network.downloads_limit())
            .with_cancel_token(self.cancel.clone());
        manager.fetch_all(tasks, self.progress.clone()).await.into_result()
    }

    /// One task per lock entry, then one per external mod
    fn mod_tasks(&self, lock: &LockFile) -> Result<Vec<DownloadTask>> {
        let mods_dir = self.profile.mods_dir();
        let mut tasks = Vec::with_capacity(lock.len() + self.manifest.external_mods.len());

        for (slug, entry) in lock.iter() {
            if !is_plain_file_name(&entry.source_file_name) {
                return Err(Error::Other(format!(
                    "Locked file name '{}' for mod '{}' is not a plain file name",
                    entry.source_file_name, slug
                )));
            }
            tasks.push(DownloadTask::new(
                entry.source_file_url.clone(),
                &mods_dir,
                entry.source_file_name.clone(),
            ));
        }

        for url in &self.manifest.external_mods {
            match url_file_name(url) {
                Some(name) => tasks.push(DownloadTask::new(url.clone(), &mods_dir, name)),
                None => warn!("Skipping external mod without a file name: {}", url),
            }
        }

        Ok(tasks)
    }

    fn expected_mod_files(&self) -> Result<Option<HashSet<String>>> {
        let lock = match &self.lock {
            Some(lock) => Some(lock.clone()),
            None => LockFile::load_from(self.profile.lock_path())?,
        };

        Ok(lock.map(|lock| {
            lock.iter()
                .map(|(_, entry)| entry.source_file_name.clone())
                .chain(self.manifest.external_mods.iter().filter_map(|url| url_file_name(url)))
                .collect()
        }))
    }

    fn write_launcher_profile(&self, keep_created: bool) -> Result<()> {
        let version_id = self
            .manifest
            .version_id
            .clone()
            .or_else(|| self.manifest.game_versions.first().cloned())
            .unwrap_or_default();

        let entry = LauncherProfile {
            id: self.manifest.profile_id.clone(),
            name: self.manifest.display_name().to_string(),
            game_dir: self.profile.root().to_path_buf(),
            version_id,
            memory_mb: self.config.memory_mb(),
            icon: self.manifest.profile_icon.clone(),
        };

        launcher_profile::upsert(&self.minecraft_dir, &entry, keep_created, Utc::now())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Copy every file under `from` into `to`; with `only_changed`, files whose
/// contents already match are left alone. Returns how many files were written.
fn copy_tree(from: &Path, to: &Path, only_changed: bool) -> Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| Error::Other(format!("Failed to read {}: {}", from.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Other(e.to_string()))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if only_changed && same_contents(entry.path(), &target)? {
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        debug!("Copied {}", relative.display());
        copied += 1;
    }

    Ok(copied)
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    if !b.is_file() {
        return Ok(false);
    }
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_step_names() {
        assert_eq!(Step::InstallMods.to_string(), "install_mods");
        assert_eq!(Step::INSTALL.first(), Some(&Step::Clean));
        assert_eq!(Step::INSTALL.last(), Some(&Step::InstallProfile));
        assert_eq!(Step::UPDATE, &[Step::UpdateMods, Step::UpdateConfigs]);
    }

    #[test]
    fn test_copy_tree_only_changed() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("bundle");
        let to = temp_dir.path().join("config");
        fs::create_dir_all(from.join("jei")).unwrap();
        fs::write(from.join("forge.cfg"), "a").unwrap();
        fs::write(from.join("jei").join("jei.cfg"), "b").unwrap();

        assert_eq!(copy_tree(&from, &to, false).unwrap(), 2);
        assert_eq!(fs::read_to_string(to.join("jei").join("jei.cfg")).unwrap(), "b");

        assert_eq!(copy_tree(&from, &to, true).unwrap(), 0);

        fs::write(from.join("forge.cfg"), "changed").unwrap();
        assert_eq!(copy_tree(&from, &to, true).unwrap(), 1);
        assert_eq!(fs::read_to_string(to.join("forge.cfg")).unwrap(), "changed");
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("jei_1.12.2.jar"));
        assert!(!is_plain_file_name("../escape.jar"));
        assert!(!is_plain_file_name(""));
    }
}
