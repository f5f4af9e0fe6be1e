use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use modpack_builder::{ProgressCallback, ProgressEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Renders library progress events as indicatif bars on stderr
pub struct ProgressRenderer {
    multi: MultiProgress,
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    transfers: HashMap<String, ProgressBar>,
    overall: Option<ProgressBar>,
}

fn transfer_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} {msg:40!} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.green/white}] {pos}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn callback(&self) -> ProgressCallback {
        let multi = self.multi.clone();
        let state = Arc::clone(&self.state);
        Arc::new(move |event: ProgressEvent| {
            if let Ok(mut state) = state.lock() {
                handle(&multi, &mut state, event);
            }
        })
    }

    /// Clear any bars left by an interrupted run
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            for (_, bar) in state.transfers.drain() {
                bar.finish_and_clear();
            }
            if let Some(bar) = state.overall.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn handle(multi: &MultiProgress, state: &mut State, event: ProgressEvent) {
    match event {
        ProgressEvent::TaskStarted { file_name, total } => {
            let bar = multi.add(ProgressBar::new(total.unwrap_or(0)));
            bar.set_style(transfer_style());
            bar.set_message(file_name.clone());
            state.transfers.insert(file_name, bar);
        }
        ProgressEvent::TaskProgress {
            file_name,
            transferred,
            total,
        } => {
            if let Some(bar) = state.transfers.get(&file_name) {
                if let Some(total) = total {
                    bar.set_length(total);
                }
                bar.set_position(transferred);
            }
        }
        ProgressEvent::TaskSkipped { file_name } => {
            let _ = multi.println(format!("  ✓ {} (already present)", file_name));
        }
        ProgressEvent::TaskFinished { file_name, .. } => {
            if let Some(bar) = state.transfers.remove(&file_name) {
                bar.finish_and_clear();
            }
            let _ = multi.println(format!("  ✓ {}", file_name));
        }
        ProgressEvent::TaskFailed { file_name, reason } => {
            if let Some(bar) = state.transfers.remove(&file_name) {
                bar.finish_and_clear();
            }
            let _ = multi.println(format!("  ✗ {}: {}", file_name, reason));
        }
        ProgressEvent::Overall { finished, total } => {
            let bar = state.overall.get_or_insert_with(|| {
                let bar = multi.add(ProgressBar::new(total as u64));
                bar.set_style(overall_style());
                bar
            });
            bar.set_length(total as u64);
            bar.set_position(finished as u64);
            if finished >= total {
                bar.finish_and_clear();
                state.overall = None;
            }
        }
        ProgressEvent::Message(message) => {
            let _ = multi.println(format!("→ {}", message));
        }
    }
}
