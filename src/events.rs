use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured event emitted while planning, executing or undoing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Bad pattern, template or selection; nothing was changed.
    InputRejected {
        error: String,
    },
    Warning {
        message: String,
    },
    BatchCreated {
        batch_id: u64,
        kind: String,
    },
    OpSimulated {
        input: PathBuf,
        output: PathBuf,
        size: u64,
        conflict: bool,
    },
    /// Input and output are the same path.
    OpUnchanged {
        input: PathBuf,
    },
    OpSkipped {
        input: PathBuf,
        output: PathBuf,
    },
    OpOverwriting {
        output: PathBuf,
    },
    OpCompleted {
        record_id: u64,
        input: PathBuf,
        output: PathBuf,
    },
    OpFailed {
        input: PathBuf,
        output: PathBuf,
        error: String,
    },
    RunAborted,
    RecordRestored {
        record_id: u64,
        input: PathBuf,
        output: PathBuf,
    },
    RecordRemoved {
        record_id: u64,
        output: PathBuf,
    },
    RecordAlreadyUndone {
        record_id: u64,
    },
    /// The batch was already undone but this record never was.
    RecordNotAttempted {
        record_id: u64,
    },
    RecordUndoFailed {
        record_id: u64,
        error: String,
    },
    UndoCompleted {
        batch_id: Option<u64>,
        reversed: usize,
        failed: usize,
        already_undone: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_snake_case_type() {
        let line = serde_json::to_string(&Event::OpUnchanged { input: "/a".into() }).unwrap();
        assert_eq!(line, r#"{"type":"op_unchanged","input":"/a"}"#);
        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back, Event::OpUnchanged { input: "/a".into() });
    }
}
