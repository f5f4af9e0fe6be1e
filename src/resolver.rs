//! Mod version selection and bulk resolution
//!
//! Mods are resolved independently per slug; there is no cross-mod version
//! negotiation. Selection for one project:
//!
//! 1. Game versions are tried in manifest order.
//! 2. For a version, only files declaring that version and published on a
//!    channel the release preference allows are candidates.
//! 3. The first version with any candidate wins; the newest candidate by
//!    publication date is pinned.
//!
//! # Examples
//!
//! ```no_run
//! use modpack_builder::{resolve_all, RegistryClient, ReleasePreference, Config};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(RegistryClient::from_config(&Config::load()?)?);
//! let slugs = vec!["jei".to_string(), "optifine".to_string()];
//! let versions = vec!["1.12.2".to_string()];
//! let locked = resolve_all(registry, &slugs, &versions, ReleasePreference::Stable, 4).await?;
//! for (slug, lock) in locked {
//!     println!("{} -> {}", slug, lock.source_file_name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::lockfile::ArtifactLock;
use crate::registry::{ModResolver, RegistryFile, RegistryProject};
use crate::{Error, ReleasePreference, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Pick the file to pin for a project, or `None` if nothing matches
pub fn select_file<'a>(
    files: &'a [RegistryFile],
    game_versions: &[String],
    preference: ReleasePreference,
) -> Option<&'a RegistryFile> {
    game_versions.iter().find_map(|version| {
        files
            .iter()
            .filter(|file| preference.allows(file.release_type))
            .filter(|file| file.game_versions.iter().any(|v| v == version))
            .max_by(|a, b| a.file_date.cmp(&b.file_date).then(a.id.cmp(&b.id)))
    })
}

/// Build the lock entry for a project
pub fn lock_for_project(
    project: &RegistryProject,
    game_versions: &[String],
    preference: ReleasePreference,
) -> Result<ArtifactLock> {
    let file = select_file(&project.files, game_versions, preference).ok_or_else(|| {
        Error::Resolution {
            slug: project.slug.clone(),
            reason: format!(
                "no {} file for game versions [{}] ({} file(s) published)",
                preference_label(preference),
                game_versions.join(", "),
                project.files.len()
            ),
        }
    })?;

    debug!(
        "Selected {} ({}) for {}",
        file.file_name, file.release_type, project.slug
    );

    Ok(ArtifactLock {
        artifact_id: project.id,
        artifact_url: project.url.clone(),
        artifact_name: project.name.clone(),
        source_file_id: file.id,
        source_file_url: file.download_url.clone(),
        source_file_name: file.file_name.clone(),
        release_type: file.release_type,
    })
}

fn preference_label(preference: ReleasePreference) -> &'static str {
    match preference {
        ReleasePreference::Stable => "release",
        ReleasePreference::Beta => "release or beta",
        ReleasePreference::Alpha => "release, beta or alpha",
    }
}

/// Resolve many slugs with at most `max_concurrent_requests` calls in flight
///
/// Calls are dispatched in slug order and results come back in slug order.
/// After the first failure no further calls are dispatched and the error is
/// returned.
pub async fn resolve_all(
    resolver: Arc<dyn ModResolver>,
    slugs: &[String],
    game_versions: &[String],
    preference: ReleasePreference,
    max_concurrent_requests: usize,
) -> Result<Vec<(String, ArtifactLock)>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_requests.max(1)));
    let failed = Arc::new(AtomicBool::new(false));
    let game_versions: Arc<[String]> = game_versions.into();
    let mut join_set = JoinSet::new();

    for (index, slug) in slugs.iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("resolution pool closed".to_string()))?;

        if failed.load(Ordering::SeqCst) {
            break;
        }

        let resolver = Arc::clone(&resolver);
        let failed = Arc::clone(&failed);
        let game_versions = Arc::clone(&game_versions);
        let slug = slug.clone();

        join_set.spawn(async move {
            let _permit = permit;
            info!("Fetching project information: {}", slug);
            let result = resolver.resolve(&slug, &game_versions, preference).await;
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            (index, slug, result)
        });
    }

    let mut resolved: Vec<Option<(String, ArtifactLock)>> = (0..slugs.len()).map(|_| None).collect();
    let mut first_error: Option<(usize, Error)> = None;

    while let Some(joined) = join_set.join_next().await {
        let (index, slug, result) =
            joined.map_err(|e| Error::Other(format!("resolution task failed: {}", e)))?;
        match result {
            Ok(lock) => {
                info!(
                    "  {} -> {} (file {}, {})",
                    slug, lock.source_file_name, lock.source_file_id, lock.release_type
                );
                resolved[index] = Some((slug, lock));
            }
            // Report the earliest failing slug in manifest order
            Err(e) => {
                let have_earlier = first_error
                    .as_ref()
                    .is_some_and(|(earliest, _)| *earliest < index);
                if !have_earlier {
                    first_error = Some((index, e));
                }
            }
        }
    }

    if let Some((_, err)) = first_error {
        return Err(err);
    }

    Ok(resolved.into_iter().flatten().collect())
}
