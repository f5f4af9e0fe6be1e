//! modpack-builder - Reproducible Minecraft modpack installs
//!
//! Installs a modpack profile from a declarative manifest: mods are resolved
//! once against a CurseForge-compatible repository and pinned in a lock file,
//! downloaded through a bounded worker pool, configuration files are copied
//! in, and the mod loader installer is run. Re-running any step is safe:
//! files already present are skipped and the lock file never changes under
//! you.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::{Config, ModpackBuilder, ModpackManifest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let manifest = ModpackManifest::load("modpack/modpack.json")?;
//!
//! let mut builder = ModpackBuilder::new(manifest, config.minecraft_directory()?, config);
//! builder.install_mods().await?;
//!
//! println!("Locked {} mods", builder.lock().map(|l| l.len()).unwrap_or(0));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`manifest`] - Parse and validate modpack.json
//! - [`registry`] - Repository clients and the resolver seam
//! - [`resolver`] - File selection and bounded bulk resolution
//! - [`lockfile`] - Manage modlist.lock.json for reproducible installs
//! - [`downloader`] - Bounded, atomic artifact downloads
//! - [`builder`] - The install/update pipeline
//! - [`installer`] - Mod loader installer invocation
//! - [`launcher_profile`] - launcher_profiles.json registration
//! - [`platform`] - Game directory and Java runtime discovery
//! - [`config`] - User configuration management
//! - [`error`] - Error types and result handling

pub mod builder;
pub mod cancel;
pub mod config;
pub mod downloader;
pub mod error;
pub mod installer;
pub mod launcher_profile;
pub mod lockfile;
pub mod manifest;
pub mod platform;
pub mod profile;
pub mod progress;
pub mod registry;
pub mod registry_http;
pub mod resolver;

pub use builder::{ModpackBuilder, RuntimeProvisioner, Step};
pub use cancel::CancelToken;
pub use config::Config;
pub use downloader::{
    url_file_name, ArtifactFetcher, DownloadManager, DownloadReport, DownloadTask, HttpFetcher,
};
pub use error::{DownloadFailure, Error, Result};
pub use installer::{run_installer, InstallerOptions};
pub use lockfile::{load_or_build, ArtifactLock, LockFile, LOCKFILE_NAME};
pub use manifest::{ModpackManifest, ReleasePreference, MANIFEST_NAME};
pub use profile::{Profile, ProfileGuard};
pub use progress::{ProgressCallback, ProgressEvent};
pub use registry::{
    FileRegistryClient, ModResolver, RegistryClient, RegistryFile, RegistryProject, ReleaseType,
};
pub use resolver::{lock_for_project, resolve_all, select_file};
