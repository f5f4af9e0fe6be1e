use crate::builder::Step;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A single artifact that could not be downloaded
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub file_name: String,
    pub url: String,
    pub reason: String,
}

fn format_download_failures(failures: &[DownloadFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {} ({}): {}", f.file_name, f.url, f.reason))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_problems(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Could not resolve mod '{slug}': {reason}")]
    Resolution { slug: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Lock file is corrupt: {}\n  {}\n\n\
             Hint: The lock file pins every mod version of this profile and is never rebuilt silently.\n\
             Repair it by hand, or delete it to re-resolve all mods from the repository:\n\
             rm \"{}\"",
             .path.display(), .reason, .path.display())]
    LockFileCorrupt { path: PathBuf, reason: String },

    #[error("{} download(s) failed:\n{}\n\n\
             Hint: Files that finished downloading were kept. Re-run the same command to retry only the missing ones.",
             .0.len(), format_download_failures(.0))]
    DownloadsFailed(Vec<DownloadFailure>),

    #[error("Failed to launch installer: {0}")]
    InstallerLaunch(String),

    #[error("Installer exited with {}",
             .code.map(|c| format!("code {}", c)).unwrap_or_else(|| "no exit code (terminated by signal)".to_string()))]
    InstallerExit { code: Option<i32> },

    #[error("Java runtime not found{0}\n\n\
             Hint: The mod loader installer needs a Java runtime.\n\n\
             Solutions:\n\
             1. Install Java and make sure `java` is on your PATH, or set JAVA_HOME\n\
             2. Configure the runtime explicitly:\n\
                modpack-builder config set runtime.java_path /path/to/bin/java\n\
             3. Pass --java /path/to/bin/java for a single run")]
    RuntimeNotFound(String),

    #[error("Invalid modpack manifest:\n{}", format_problems(.0))]
    ManifestInvalid(Vec<String>),

    #[error("Profile is in use by another modpack-builder run: {}\n\n\
             Hint: Only one install or update may run per profile at a time.\n\
             If no other run is active, a previous run was interrupted; remove the lock file:\n\
             rm \"{}\"",
             .0.display(), .0.display())]
    ProfileBusy(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: Step,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a transport error from a reqwest failure, keeping the hints short
    pub fn transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_connect() {
            Error::Transport(format!("{}: cannot connect ({})", context, err))
        } else if err.is_timeout() {
            Error::Transport(format!("{}: request timed out", context))
        } else {
            Error::Transport(format!("{}: {}", context, err))
        }
    }

    /// The innermost error, unwrapping step context
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }
}
