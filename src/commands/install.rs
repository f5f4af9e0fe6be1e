use crate::RunArgs;
use anyhow::Result;
use modpack_builder::CancelToken;

pub async fn run(args: &RunArgs, cancel: CancelToken) -> Result<()> {
    let (mut builder, renderer) = super::prepare(args, cancel)?;
    super::print_header("Installing", &builder);

    let result = builder.install().await;
    renderer.finish();
    result?;

    let locked = builder.lock().map(|lock| lock.len()).unwrap_or(0);
    println!();
    println!("✅ Installed {}", builder.manifest().display_name());
    println!("   {} locked mod(s), {} external", locked, builder.manifest().external_mods.len());
    if let Some(java) = builder.runtime() {
        println!("   Java runtime: {}", java.display());
    }
    println!("   Profile: {}", builder.profile().root().display());
    println!();

    Ok(())
}
