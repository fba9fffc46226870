use bytesize::ByteSize;
use std::path::{Path, PathBuf};

use crate::events::Event;

/// Reporter aggregates events and produces human or JSON output.
///
/// Human lines are printed as events arrive. Paths are shown relative to the
/// working directory when they live under it.
pub struct Reporter {
    events: Vec<Event>,
    json_mode: bool,
    verbose: bool,
    base: Option<PathBuf>,
    #[cfg(feature = "cli")]
    progress: Option<indicatif::ProgressBar>,
}

impl Reporter {
    pub fn new(json_mode: bool) -> Self {
        Self {
            events: Vec::new(),
            json_mode,
            verbose: false,
            base: None,
            #[cfg(feature = "cli")]
            progress: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn relative_to(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn record(&mut self, event: Event) {
        if self.json_mode {
            if let Ok(line) = serde_json::to_string(&event) {
                self.emit(line, false);
            }
        } else if let Some((line, to_stderr)) = self.human(&event) {
            self.emit(line, to_stderr);
        }
        self.events.push(event);
    }

    fn show(&self, path: &Path) -> String {
        match &self.base {
            Some(base) => path.strip_prefix(base).unwrap_or(path).display().to_string(),
            None => path.display().to_string(),
        }
    }

    fn human(&self, event: &Event) -> Option<(String, bool)> {
        let line = match event {
            Event::InputRejected { error } => return Some((format!("ERROR: {error}"), true)),
            Event::Warning { message } => return Some((format!("WARNING: {message}"), true)),
            Event::BatchCreated { batch_id, kind } if self.verbose => format!("INFO: batch {batch_id} ({kind})"),
            Event::OpSimulated {
                input,
                output,
                size,
                conflict,
            } => {
                let mark = if *conflict { "  [conflict]" } else { "" };
                format!("{} → {}  ({}){mark}", self.show(input), self.show(output), ByteSize::b(*size))
            }
            Event::OpUnchanged { input } => format!("INFO: {} is unchanged, skipping", self.show(input)),
            Event::OpSkipped { input, output } => {
                format!("INFO: skipping {} → {}", self.show(input), self.show(output))
            }
            Event::OpOverwriting { output } => {
                format!("WARNING: overwriting {}", self.show(output))
            }
            Event::OpCompleted { input, output, .. } if self.verbose => {
                format!("SUCCESS: {} → {}", self.show(input), self.show(output))
            }
            Event::OpFailed { input, output, error } => {
                return Some((
                    format!("ERROR: {} → {}: {error}", self.show(input), self.show(output)),
                    true,
                ));
            }
            Event::RunAborted => return Some(("ERROR: aborted".to_string(), true)),
            Event::RecordRestored { record_id, input, output } => {
                format!("SUCCESS: [{record_id}] {} → {}", self.show(output), self.show(input))
            }
            Event::RecordRemoved { record_id, output } => {
                format!("SUCCESS: [{record_id}] removed {}", self.show(output))
            }
            Event::RecordAlreadyUndone { record_id } => format!("INFO: [{record_id}] already undone"),
            Event::RecordNotAttempted { record_id } => {
                return Some((
                    format!("WARNING: [{record_id}] not reversed; retry with --operations {record_id}"),
                    true,
                ));
            }
            Event::RecordUndoFailed { record_id, error } => {
                return Some((format!("ERROR: [{record_id}] {error}"), true));
            }
            Event::UndoCompleted {
                batch_id,
                reversed,
                failed,
                already_undone,
            } => {
                let batch = batch_id.map(|id| format!("batch {id}")).unwrap_or_else(|| "selection".into());
                if *already_undone {
                    return Some((format!("WARNING: {batch} was already undone"), true));
                }
                if *failed > 0 {
                    format!("WARNING: undid {reversed} operation(s) of {batch}, {failed} failed")
                } else {
                    format!("SUCCESS: undid {reversed} operation(s) of {batch}")
                }
            }
            _ => return None,
        };
        Some((line, false))
    }

    fn emit(&self, line: String, to_stderr: bool) {
        let print = || {
            if to_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        };
        #[cfg(feature = "cli")]
        if let Some(bar) = &self.progress {
            bar.suspend(print);
            return;
        }
        print();
    }

    /// Show a progress bar over `len` steps. No-op without the `cli` feature
    /// and in JSON mode.
    pub fn start_progress(&mut self, len: u64) {
        #[cfg(feature = "cli")]
        if !self.json_mode {
            let style = indicatif::ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
            let bar = indicatif::ProgressBar::new(len).with_style(style);
            self.progress = Some(bar);
        }
        #[cfg(not(feature = "cli"))]
        let _ = len;
    }

    pub fn advance(&self) {
        #[cfg(feature = "cli")]
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
    }

    pub fn finish_progress(&mut self) {
        #[cfg(feature = "cli")]
        if let Some(bar) = self.progress.take() {
            bar.finish_and_clear();
        }
    }

    /// Run `f` with the progress bar hidden, for interactive prompts.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        #[cfg(feature = "cli")]
        if let Some(bar) = &self.progress {
            return bar.suspend(f);
        }
        f()
    }
}
