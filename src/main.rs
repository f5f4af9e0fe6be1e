use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use modpack_builder::CancelToken;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// modpack-builder - Reproducible Minecraft modpack installs
#[derive(Parser)]
#[command(name = "modpack-builder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show more log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every pipeline command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Modpack manifest, or a directory containing modpack.json
    #[arg(default_value = "modpack")]
    pub manifest: PathBuf,

    /// Game directory holding profiles/ and launcher_profiles.json
    #[arg(long)]
    pub minecraft_dir: Option<PathBuf>,

    /// Install into this directory instead of <minecraft-dir>/profiles/<profile_id>
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,

    /// Java executable for the mod loader installer
    #[arg(long)]
    pub java: Option<PathBuf>,

    /// Maximum parallel downloads for this run
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=16))]
    pub concurrent_downloads: Option<u64>,

    /// Maximum parallel repository lookups for this run
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=32))]
    pub concurrent_requests: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a modpack profile (clean, mods, configs, runtime, loader, launcher profile)
    Install {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Bring an installed profile in line with its lock file and bundled configs
    Update {
        #[command(flatten)]
        args: RunArgs,

        /// Also refresh the launcher profile entry
        #[arg(long)]
        launcher_profile: bool,
    },

    /// Remove stale mods and partial downloads, and clear bundled configs
    Clean {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Create the lock file without downloading anything
    Lock {
        #[command(flatten)]
        args: RunArgs,

        /// Re-resolve every mod and replace an existing lock file
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., network.max_concurrent_downloads)
        key: String,

        /// Value to set (empty clears optional keys)
        value: String,
    },

    /// Print the configuration file path
    Path,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "modpack_builder=info",
        _ => "modpack_builder=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling... (waiting for running transfers to stop)");
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        Commands::Install { args } => commands::install::run(&args, cancel.clone()).await,
        Commands::Update {
            args,
            launcher_profile,
        } => commands::update::run(&args, launcher_profile, cancel.clone()).await,
        Commands::Clean { args } => commands::clean::run(&args, cancel.clone()).await,
        Commands::Lock { args, force } => commands::lock::run(&args, force, cancel.clone()).await,
        Commands::Config { action } => commands::config::run(&action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "modpack-builder", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        let cancelled = e
            .downcast_ref::<modpack_builder::Error>()
            .is_some_and(|e| e.is_cancelled());
        if cancelled {
            eprintln!("Cancelled. Re-run the same command to resume; finished files are kept.");
            std::process::exit(130);
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
