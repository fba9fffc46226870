//! Presentation helpers for `fu history` and `fu undo --operations`.

use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Duration;

use crate::error::SelectionError;
use crate::journal::{Batch, OperationRecord};

pub const DEFAULT_PER_PAGE: usize = 5;

const DATE_FORMAT: &str = "%b %-d, %Y %H:%M:%S";

/// One page of a list, 1-based.
#[derive(Debug, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub number: usize,
    pub total_pages: usize,
}

impl<T> Page<'_, T> {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

/// Slice out page `number` (clamped into range). `per_page == 0` means one page.
pub fn paginate<T>(items: &[T], number: usize, per_page: usize) -> Page<'_, T> {
    let per_page = if per_page == 0 { items.len().max(1) } else { per_page };
    let total_pages = items.len().div_ceil(per_page).max(1);
    let number = number.clamp(1, total_pages);
    let start = (number - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Page {
        items: &items[start..end],
        number,
        total_pages,
    }
}

pub fn batch_rows(batches: &[Batch], now: DateTime<Local>) -> Vec<Vec<String>> {
    batches
        .iter()
        .map(|batch| {
            let age = (now - batch.date).to_std().unwrap_or_default();
            vec![
                batch.id.to_string(),
                batch.date.format(DATE_FORMAT).to_string(),
                format!("{} ago", humantime::format_duration(Duration::from_secs(age.as_secs()))),
                batch.command_type.clone(),
                batch.undone.to_string(),
                batch.command_string.clone(),
            ]
        })
        .collect()
}

pub const BATCH_HEADERS: [&str; 6] = ["ID", "Date", "Age", "Type", "Undone", "Command"];

/// Rows for a batch's operations, with `cwd` stripped from the paths.
pub fn operation_rows(records: &[OperationRecord], cwd: &Path) -> Vec<Vec<String>> {
    let show = |path: &Path| path.strip_prefix(cwd).unwrap_or(path).display().to_string();
    records
        .iter()
        .map(|op| vec![op.id.to_string(), show(&op.input), show(&op.output), op.undone.to_string()])
        .collect()
}

pub const OPERATION_HEADERS: [&str; 4] = ["ID", "Input", "Output", "Undone"];

/// Left-aligned columns separated by two spaces.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(headers.to_vec());
    for row in rows {
        out.push('\n');
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

/// Parse `3,5,8` into the matching records of `records`.
///
/// Duplicates collapse to their first occurrence; every id must exist.
pub fn parse_operation_selection(input: &str, records: &[OperationRecord]) -> Result<Vec<OperationRecord>, SelectionError> {
    let trimmed = input.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed
            .split(',')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(SelectionError::Malformed(input.to_string()));
    }

    let mut selected: Vec<OperationRecord> = Vec::new();
    for part in trimmed.split(',') {
        let id: u64 = part.parse().map_err(|_| SelectionError::Malformed(input.to_string()))?;
        let record = records
            .iter()
            .find(|r| r.id == id)
            .ok_or(SelectionError::UnknownOperation(id))?;
        if !selected.iter().any(|r| r.id == id) {
            selected.push(record.clone());
        }
    }
    Ok(selected)
}
