use anyhow::Result;
use modpack_builder::Config;

pub fn run(action: &crate::ConfigAction) -> Result<()> {
    use crate::ConfigAction;

    match action {
        ConfigAction::Show => show_config(),
        ConfigAction::Set { key, value } => set_config(key, value),
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
            Ok(())
        }
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::default_path()?;

    println!();
    println!("  📁 Config file: {}", config_path.display());
    println!();

    println!("  Network");
    println!(
        "    max_concurrent_requests:   {}",
        config.network.max_concurrent_requests
    );
    println!(
        "    max_concurrent_downloads:  {}",
        config.network.max_concurrent_downloads
    );
    println!("    user_agent:                {}", config.network.user_agent);
    println!();

    println!("  Registry");
    println!("    registry_type:             {}", config.registry.registry_type);
    println!("    url:                       {}", config.registry.url);
    println!(
        "    path:                      {}",
        display_or_unset(config.registry.path.as_ref().map(|p| p.display().to_string()))
    );
    println!(
        "    api_key:                   {}",
        if config.registry.api_key.is_some() { "<set>" } else { "<unset>" }
    );
    println!("    game_id:                   {}", config.registry.game_id);
    println!();

    println!("  Runtime");
    println!(
        "    java_path:                 {}",
        display_or_unset(config.java_path().map(|p| p.display().to_string()))
    );
    println!(
        "    memory_mb:                 {}{}",
        config.memory_mb(),
        if config.runtime.memory_mb.is_none() { " (recommended)" } else { "" }
    );
    println!(
        "    installer_args:            {}",
        config.runtime.installer_args.join(" ")
    );
    println!(
        "    capture_installer_output:  {}",
        config.runtime.capture_installer_output
    );
    println!();

    println!("  Launcher");
    println!(
        "    minecraft_directory:       {}",
        match config.minecraft_directory() {
            Ok(dir) => dir.display().to_string(),
            Err(_) => "<unknown>".to_string(),
        }
    );
    println!();

    println!("💡 Modify settings:");
    println!("   modpack-builder config set <key> <value>");
    println!();

    Ok(())
}

fn display_or_unset(value: Option<String>) -> String {
    value.unwrap_or_else(|| "<unset>".to_string())
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set_value(key, value)?;
    config.save()?;

    if key == "registry.api_key" {
        println!("  ✓ {} = <set>", key);
    } else {
        println!("  ✓ {} = \"{}\"", key, value);
    }
    println!();
    println!("✅ Configuration saved");

    Ok(())
}
