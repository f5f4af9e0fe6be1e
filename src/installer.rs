//! Mod loader installer invocation
//!
//! The loader installer is an opaque executable jar. It is run as
//! `<java> -jar <installer> <args...>` and judged by its exit status only;
//! its output is never parsed.

use crate::cancel::CancelToken;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct InstallerOptions {
    /// Arguments after `-jar <installer>`
    pub args: Vec<String>,
    /// Defaults to the installer's directory
    pub working_dir: Option<PathBuf>,
    /// Forward stdout/stderr to debug logs instead of discarding them
    pub capture_output: bool,
}

/// Run the installer and wait for it
///
/// A non-zero exit is [`Error::InstallerExit`]. Cancellation kills the child
/// and returns [`Error::Cancelled`].
pub async fn run_installer(
    runtime: &Path,
    installer: &Path,
    options: &InstallerOptions,
    cancel: &CancelToken,
) -> Result<ExitStatus> {
    cancel.check()?;

    if !runtime.is_file() {
        return Err(Error::InstallerLaunch(format!(
            "Java runtime {} does not exist",
            runtime.display()
        )));
    }
    if !installer.is_file() {
        return Err(Error::InstallerLaunch(format!(
            "installer {} does not exist",
            installer.display()
        )));
    }

    let working_dir = options
        .working_dir
        .clone()
        .or_else(|| installer.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut command = Command::new(runtime);
    command
        .arg("-jar")
        .arg(installer)
        .args(&options.args)
        .current_dir(&working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    if options.capture_output {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }

    info!("Executing installer {}", installer.display());
    debug!("Command: {:?}", command);

    let mut child = command
        .spawn()
        .map_err(|e| Error::InstallerLaunch(format!("{}: {}", runtime.display(), e)))?;

    let mut log_tasks = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        log_tasks.push(tokio::spawn(log_lines("stdout", stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        log_tasks.push(tokio::spawn(log_lines("stderr", stderr)));
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            info!("Cancelling installer");
            let _ = child.kill().await;
            return Err(Error::Cancelled);
        }
    };

    for task in log_tasks {
        let _ = task.await;
    }

    if !status.success() {
        return Err(Error::InstallerExit {
            code: status.code(),
        });
    }

    info!("Installer finished");
    Ok(status)
}

async fn log_lines<R: AsyncRead + Unpin>(stream: &'static str, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[installer {}] {}", stream, line);
    }
}
