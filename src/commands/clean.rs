use crate::RunArgs;
use anyhow::Result;
use modpack_builder::{CancelToken, Step};

pub async fn run(args: &RunArgs, cancel: CancelToken) -> Result<()> {
    let (mut builder, renderer) = super::prepare(args, cancel)?;

    println!();
    println!("🧹 Cleaning {}", builder.profile().root().display());

    let result = builder.run(&[Step::Clean]).await;
    renderer.finish();
    result?;

    println!("✅ Clean complete");
    println!();
    Ok(())
}
