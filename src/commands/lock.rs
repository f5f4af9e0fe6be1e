use crate::RunArgs;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use modpack_builder::CancelToken;
use std::time::Duration;

pub async fn run(args: &RunArgs, force: bool, cancel: CancelToken) -> Result<()> {
    let (mut builder, _renderer) = super::prepare(args, cancel)?;
    let lock_path = builder.profile().lock_path();
    let existed = lock_path.is_file();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!(
        "Resolving {} mod(s)...",
        builder.manifest().mods.len()
    ));

    let result = if force {
        builder.relock().await.cloned()
    } else {
        builder.ensure_lock().await.cloned()
    };
    spinner.finish_and_clear();
    let lock = result?;

    println!();
    if existed && !force {
        println!("🔒 Using existing lock file {}", lock_path.display());
        println!("   Delete it or pass --force to re-resolve.");
    } else {
        println!("🔒 Wrote {}", lock_path.display());
    }
    println!();

    for (slug, entry) in lock.iter() {
        println!(
            "  {:<24} {} ({}, file {})",
            slug, entry.source_file_name, entry.release_type, entry.source_file_id
        );
    }
    println!();

    Ok(())
}
