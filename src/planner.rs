//! Turns resolved inputs plus an output template into an indexed,
//! conflict-free list of actions.
//!
//! Each stage consumes the list and returns the next one; stages never run
//! before resolution has finished because they need the complete list to
//! order entries and count conflict groups.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{PlanError, tera_message};
use crate::model::{Conflict, OperationKind, PlanOptions, PlannedOperation, SortMode};
use crate::path::PathDescriptor;
use crate::resolve::ResolvedPath;
use crate::template::{INDEX_PLACEHOLDER, OutputTemplate, build_context};

/// Run every planner stage over `resolved`.
#[tracing::instrument(skip_all, fields(kind = %kind, inputs = resolved.len(), template = template.source()))]
pub fn plan(
    kind: OperationKind,
    resolved: Vec<ResolvedPath>,
    template: &OutputTemplate,
    options: &PlanOptions,
    now: DateTime<Local>,
) -> Result<Vec<PlannedOperation>, PlanError> {
    let mut ops = seed(kind, resolved);
    if options.ignore_directories {
        ops = drop_directories(ops);
    }
    ops = drop_duplicate_inputs(ops);
    ops = sort_operations(ops, options.sort);
    ops = render_outputs(ops, template, options, now)?;
    if !options.no_ext {
        ops = backfill_extensions(ops);
    }
    if kind == OperationKind::Move && options.no_move {
        ops = pin_to_input_dir(ops);
    }
    ops = detect_conflicts(ops, options.force);
    ops = materialize_indices(ops, !options.no_index);
    tracing::debug!(planned = ops.len(), "plan ready");
    Ok(ops)
}

/// Wrap resolved inputs, assigning each its stable id.
pub fn seed(kind: OperationKind, resolved: Vec<ResolvedPath>) -> Vec<PlannedOperation> {
    resolved
        .into_iter()
        .enumerate()
        .map(|(id, r)| PlannedOperation::new(id, kind, r.descriptor, r.snapshot))
        .collect()
}

pub fn drop_directories(ops: Vec<PlannedOperation>) -> Vec<PlannedOperation> {
    ops.into_iter().filter(|op| !op.snapshot.is_dir).collect()
}

/// Keep the first occurrence of every absolute input path.
pub fn drop_duplicate_inputs(ops: Vec<PlannedOperation>) -> Vec<PlannedOperation> {
    let mut seen = HashSet::new();
    ops.into_iter()
        .filter(|op| seen.insert(op.input.abs().to_path_buf()))
        .collect()
}

/// Stable sort; ties keep their relative order.
pub fn sort_operations(mut ops: Vec<PlannedOperation>, mode: SortMode) -> Vec<PlannedOperation> {
    match mode {
        SortMode::None => {}
        SortMode::Alphabet => ops.sort_by(|a, b| a.input.abs().cmp(b.input.abs())),
        SortMode::ReverseAlphabet => ops.sort_by(|a, b| b.input.abs().cmp(a.input.abs())),
        SortMode::Date => ops.sort_by(|a, b| a.snapshot.modified.cmp(&b.snapshot.modified)),
        SortMode::ReverseDate => ops.sort_by(|a, b| b.snapshot.modified.cmp(&a.snapshot.modified)),
        SortMode::Size => ops.sort_by(|a, b| b.snapshot.size.cmp(&a.snapshot.size)),
        SortMode::ReverseSize => ops.sort_by(|a, b| a.snapshot.size.cmp(&b.snapshot.size)),
    }
    ops
}

/// Render the template for every entry. Any failure aborts the plan.
pub fn render_outputs(
    ops: Vec<PlannedOperation>,
    template: &OutputTemplate,
    options: &PlanOptions,
    now: DateTime<Local>,
) -> Result<Vec<PlannedOperation>, PlanError> {
    ops.into_iter()
        .map(|mut op| {
            let context = build_context(&op.input, &op.snapshot, now);
            let rendered = template.render(&context).map_err(|err| PlanError::Render {
                input: op.input.abs().to_path_buf(),
                message: tera_message(&err),
            })?;
            let rendered = rendered.trim_end_matches(['\r', '\n']);
            if rendered.is_empty() {
                return Err(PlanError::EmptyOutput(op.input.abs().to_path_buf()));
            }
            let output = PathDescriptor::new(rendered, &options.working_dir).map_err(|source| {
                PlanError::Path {
                    path: PathBuf::from(rendered),
                    source,
                }
            })?;
            op.output = Some(output);
            Ok(op)
        })
        .collect()
}

/// Give extension-less outputs the input's extension.
pub fn backfill_extensions(ops: Vec<PlannedOperation>) -> Vec<PlannedOperation> {
    ops.into_iter()
        .map(|mut op| {
            if let Some(output) = &op.output
                && output.extension().is_empty()
                && !op.input.extension().is_empty()
            {
                op.output = Some(output.with_extension(op.input.extension()));
            }
            op
        })
        .collect()
}

/// Keep every output in its input's directory, turning a move into a rename.
pub fn pin_to_input_dir(ops: Vec<PlannedOperation>) -> Vec<PlannedOperation> {
    ops.into_iter()
        .map(|mut op| {
            op.output = op.output.map(|output| output.with_dir(op.input.dir()));
            op
        })
        .collect()
}

/// Group entries by output path and number each group in planner order.
///
/// With `force` a shared output is not a conflict: later entries overwrite
/// earlier ones at execution time.
pub fn detect_conflicts(ops: Vec<PlannedOperation>, force: bool) -> Vec<PlannedOperation> {
    let mut counts: HashMap<PathBuf, usize> = HashMap::new();
    for op in &ops {
        if let Some(output) = &op.output {
            *counts.entry(output.abs().to_path_buf()).or_default() += 1;
        }
    }

    let mut seen: HashMap<PathBuf, usize> = HashMap::new();
    ops.into_iter()
        .map(|mut op| {
            if let Some(output) = &op.output {
                let key = output.abs().to_path_buf();
                let group_size = counts.get(&key).copied().unwrap_or(1);
                let index = seen.entry(key).or_default();
                *index += 1;
                op.conflict = Some(Conflict {
                    index: *index,
                    group_size,
                    has_conflict: group_size > 1 && !force,
                });
            }
            op
        })
        .collect()
}

/// Substitute (or strip) the index placeholder.
///
/// Conflicting entries get their zero-padded index where the template used
/// `{{ i }}`, or appended to the base name otherwise.
pub fn materialize_indices(ops: Vec<PlannedOperation>, enabled: bool) -> Vec<PlannedOperation> {
    ops.into_iter()
        .map(|mut op| {
            let Some(output) = op.output.take() else {
                return op;
            };
            let has_placeholder = output.abs().to_string_lossy().contains(INDEX_PLACEHOLDER);
            let conflict = op.conflict.filter(|c| enabled && c.has_conflict);
            op.output = Some(match conflict {
                Some(c) => {
                    let index = zero_pad(c.index, c.group_size);
                    if has_placeholder {
                        output.with_path(replace_placeholder(output.abs(), &index))
                    } else {
                        output.with_base_suffix(&index)
                    }
                }
                None if has_placeholder => output.with_path(replace_placeholder(output.abs(), "")),
                None => output,
            });
            op
        })
        .collect()
}

/// Substitute the placeholder component by component, so components that
/// are not valid UTF-8 pass through untouched.
fn replace_placeholder(path: &Path, with: &str) -> PathBuf {
    path.components()
        .map(|component| match component.as_os_str().to_str() {
            Some(text) if text.contains(INDEX_PLACEHOLDER) => OsString::from(text.replace(INDEX_PLACEHOLDER, with)),
            _ => component.as_os_str().to_os_string(),
        })
        .collect()
}

/// Pad `index` to the number of decimal digits in `group_size`.
pub fn zero_pad(index: usize, group_size: usize) -> String {
    let width = group_size.to_string().len();
    format!("{index:0width$}")
}
