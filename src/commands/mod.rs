pub mod clean;
pub mod config;
pub mod install;
pub mod lock;
pub mod progress;
pub mod update;

use crate::RunArgs;
use anyhow::Result;
use modpack_builder::{CancelToken, Config, ModpackBuilder, ModpackManifest};
use progress::ProgressRenderer;

/// Load configuration and manifest, apply per-run flags and build the pipeline
pub fn prepare(args: &RunArgs, cancel: CancelToken) -> Result<(ModpackBuilder, ProgressRenderer)> {
    let mut config = Config::load()?;

    if let Some(n) = args.concurrent_downloads {
        config.network.max_concurrent_downloads = n as usize;
    }
    if let Some(n) = args.concurrent_requests {
        config.network.max_concurrent_requests = n as usize;
    }
    if let Some(dir) = &args.minecraft_dir {
        config.launcher.minecraft_directory = Some(dir.clone());
    }

    let manifest = ModpackManifest::load(&args.manifest)?;
    let minecraft_dir = config.minecraft_directory()?;
    let renderer = ProgressRenderer::new();

    let mut builder = ModpackBuilder::new(manifest, minecraft_dir, config)
        .with_cancel_token(cancel)
        .with_progress(renderer.callback());

    if let Some(java) = &args.java {
        builder = builder.with_java_path(java.clone());
    }
    if let Some(root) = &args.profile_dir {
        builder = builder.with_profile_root(root.clone());
    }

    Ok((builder, renderer))
}

/// Header printed before a pipeline run
pub fn print_header(action: &str, builder: &ModpackBuilder) {
    let manifest = builder.manifest();
    println!();
    println!("📦 {} {}", action, manifest.display_name());
    println!("   Profile:        {}", builder.profile().root().display());
    println!("   Game versions:  {}", manifest.game_versions.join(", "));
    println!("   Channel:        {}", manifest.release_preference);
    println!(
        "   Mods:           {} from the repository, {} external",
        manifest.mods.len(),
        manifest.external_mods.len()
    );
    println!();
}
