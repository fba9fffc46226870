use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::path::PathDescriptor;

/// The filesystem primitive a batch applies to every entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationKind {
    #[serde(rename = "move")]
    Move,
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "link-soft")]
    LinkSoft,
    #[serde(rename = "link-hard")]
    LinkHard,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Move => "move",
            OperationKind::Copy => "copy",
            OperationKind::LinkSoft => "link-soft",
            OperationKind::LinkHard => "link-hard",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(OperationKind::Move),
            "copy" => Ok(OperationKind::Copy),
            "link-soft" => Ok(OperationKind::LinkSoft),
            "link-hard" => Ok(OperationKind::LinkHard),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// Order in which resolved inputs are planned.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Keep the order the patterns matched in.
    #[default]
    None,
    /// Absolute input path, ascending.
    Alphabet,
    /// Absolute input path, descending.
    ReverseAlphabet,
    /// Modification time, oldest first.
    Date,
    /// Modification time, newest first.
    ReverseDate,
    /// Size, largest first.
    Size,
    /// Size, smallest first.
    ReverseSize,
}

/// Options consumed by the planner.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub working_dir: PathBuf,
    pub sort: SortMode,
    pub ignore_directories: bool,
    pub no_index: bool,
    pub no_ext: bool,
    /// Only honoured for moves.
    pub no_move: bool,
    pub force: bool,
}

impl PlanOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            sort: SortMode::None,
            ignore_directories: false,
            no_index: false,
            no_ext: false,
            no_move: false,
            force: false,
        }
    }
}

/// Options consumed by the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force: bool,
    pub simulate: bool,
    pub verbose: bool,
    pub no_mkdir: bool,
}

/// Filesystem facts captured when an input is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: DateTime<Local>,
    pub is_dir: bool,
}

/// Conflict bookkeeping filled in by conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// 1-based position within the group, in planner order.
    pub index: usize,
    pub group_size: usize,
    pub has_conflict: bool,
}

/// One source→destination action moving through the planner.
#[derive(Debug, Clone)]
pub struct PlannedOperation {
    /// Stable position assigned at resolution time.
    pub id: usize,
    pub kind: OperationKind,
    pub input: PathDescriptor,
    pub snapshot: FileSnapshot,
    /// `None` until the rendering pass.
    pub output: Option<PathDescriptor>,
    /// `None` until conflict detection.
    pub conflict: Option<Conflict>,
    pub skip: bool,
}

impl PlannedOperation {
    pub fn new(id: usize, kind: OperationKind, input: PathDescriptor, snapshot: FileSnapshot) -> Self {
        Self {
            id,
            kind,
            input,
            snapshot,
            output: None,
            conflict: None,
            skip: false,
        }
    }

    pub fn has_conflict(&self) -> bool {
        self.conflict.is_some_and(|c| c.has_conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_its_name() {
        for kind in [
            OperationKind::Move,
            OperationKind::Copy,
            OperationKind::LinkSoft,
            OperationKind::LinkHard,
        ] {
            assert_eq!(kind.as_str().parse::<OperationKind>(), Ok(kind));
        }
        assert!("history".parse::<OperationKind>().is_err());
    }

    #[test]
    fn default_plan_options_keep_input_order() {
        let options = PlanOptions::new("/tmp");
        assert_eq!(options.sort, SortMode::None);
        assert!(!options.force && !options.no_index && !options.no_ext);
    }
}
