//! Progress events emitted by the download pool and the pipeline
//!
//! The library never renders progress itself. Callers pass a
//! [`ProgressCallback`]; the CLI turns events into `indicatif` bars.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A transfer began; `total` is the advertised size when known
    TaskStarted { file_name: String, total: Option<u64> },
    TaskProgress {
        file_name: String,
        transferred: u64,
        total: Option<u64>,
    },
    /// The destination already existed
    TaskSkipped { file_name: String },
    TaskFinished { file_name: String, bytes: u64 },
    TaskFailed { file_name: String, reason: String },
    /// `finished` of `total` tasks are done, successfully or not
    Overall { finished: usize, total: usize },
    /// Free-form status line (current step, installer launch)
    Message(String),
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

pub(crate) fn emit(progress: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(callback) = progress {
        callback(event);
    }
}
