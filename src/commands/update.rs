use crate::RunArgs;
use anyhow::Result;
use modpack_builder::{CancelToken, Step};

pub async fn run(args: &RunArgs, launcher_profile: bool, cancel: CancelToken) -> Result<()> {
    let (mut builder, renderer) = super::prepare(args, cancel)?;
    super::print_header("Updating", &builder);

    let mut steps = Step::UPDATE.to_vec();
    if launcher_profile {
        steps.push(Step::UpdateProfile);
    }

    let result = builder.run(&steps).await;
    renderer.finish();
    result?;

    println!();
    println!("✅ {} is up to date", builder.manifest().display_name());
    println!();

    Ok(())
}
