//! Persistent batch/operation log.
//!
//! Each collection is a `key BLOB PRIMARY KEY, value TEXT` table keyed by the
//! big-endian record id, with JSON values. Ids come from the `sequences`
//! table, one counter per collection. Every write runs in its own
//! `BEGIN IMMEDIATE` transaction, so there is only ever one writer.

use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::JournalError;
use crate::fsops;
use crate::model::OperationKind;

pub const BATCHES: &str = "batches";
pub const OPERATIONS: &str = "operations";
pub const FAVORITES: &str = "favorites";

const COLLECTIONS: [&str; 3] = [BATCHES, OPERATIONS, FAVORITES];
const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

type Result<T> = std::result::Result<T, JournalError>;

/// One command invocation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: u64,
    pub command_type: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub command_string: String,
    pub working_dir: PathBuf,
    pub undoable: bool,
    #[serde(default)]
    pub undone: bool,
    pub date: DateTime<Local>,
}

/// One successfully executed action of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: u64,
    pub batch_id: u64,
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub undone: bool,
}

/// A saved command that can be re-run by name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: u64,
    pub name: String,
    pub command_type: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub command_string: String,
}

/// Shape of the stored collections, for `fu schema`.
#[derive(JsonSchema)]
pub struct LogSchema {
    pub batches: Vec<Batch>,
    pub operations: Vec<OperationRecord>,
    pub favorites: Vec<Favorite>,
}

pub fn generate_schema() -> Result<String> {
    let schema = schemars::schema_for!(LogSchema);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// What happened to one record during undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStatus {
    /// A move was reversed.
    Restored,
    /// A copy or link was deleted.
    Removed,
    AlreadyUndone,
    /// The batch was already undone, so the record was left alone.
    NotAttempted,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UndoOutcome {
    pub record: OperationRecord,
    pub status: UndoStatus,
}

#[derive(Debug, Clone, Default)]
pub struct UndoReport {
    pub batch_id: Option<u64>,
    /// The batch had already been undone before this call.
    pub already_undone: bool,
    pub working_dir: PathBuf,
    pub outcomes: Vec<UndoOutcome>,
}

impl UndoReport {
    pub fn reversed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UndoStatus::Restored | UndoStatus::Removed))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, UndoStatus::Failed(_)))
            .count()
    }
}

/// Handle on the log database. The connection closes when it is dropped.
pub struct Journal {
    conn: Connection,
    path: PathBuf,
}

impl Journal {
    /// `~/.fileutils/fu.db`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(JournalError::NoHome)?;
        Ok(home.join(".fileutils").join("fu.db"))
    }

    /// Open (creating on first use) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(LOCK_TIMEOUT)?;
        let journal = Self { conn, path };
        journal.migrate()?;
        tracing::debug!(path = %journal.path.display(), "journal opened");
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn migrate(&self) -> Result<()> {
        let mut sql = String::from(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS sequences (
               bucket TEXT PRIMARY KEY,
               value INTEGER NOT NULL
             );",
        );
        for collection in COLLECTIONS {
            sql.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {collection} (
                   key BLOB PRIMARY KEY,
                   value TEXT NOT NULL
                 ) WITHOUT ROWID;"
            ));
        }
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Start a batch. Its id is minted here and nowhere else.
    #[tracing::instrument(skip(self, command), fields(tokens = command.len()))]
    pub fn create_batch(&mut self, command_type: &str, command: &[String], working_dir: &Path) -> Result<Batch> {
        let batch = self.write(|tx| {
            let batch = Batch {
                id: next_sequence(tx, BATCHES)?,
                command_type: command_type.to_string(),
                command: command.to_vec(),
                command_string: format_command(command),
                working_dir: working_dir.to_path_buf(),
                undoable: command_type.parse::<OperationKind>().is_ok(),
                undone: false,
                date: Local::now(),
            };
            put(tx, BATCHES, batch.id, &batch)?;
            Ok(batch)
        })?;
        tracing::info!(batch = batch.id, "batch created");
        Ok(batch)
    }

    /// Record one executed action under `batch_id`.
    pub fn append_operation(&mut self, batch_id: u64, input: &Path, output: &Path) -> Result<OperationRecord> {
        self.write(|tx| {
            let record = OperationRecord {
                id: next_sequence(tx, OPERATIONS)?,
                batch_id,
                input: input.to_path_buf(),
                output: output.to_path_buf(),
                undone: false,
            };
            put(tx, OPERATIONS, record.id, &record)?;
            Ok(record)
        })
    }

    /// Every batch, oldest first.
    pub fn list_batches(&self) -> Result<Vec<Batch>> {
        scan(&self.conn, BATCHES)
    }

    pub fn get_batch(&self, id: u64) -> Result<Option<Batch>> {
        fetch(&self.conn, BATCHES, id)
    }

    /// Newest batch that can still be undone.
    pub fn last_undoable(&self) -> Result<Option<Batch>> {
        Ok(self
            .list_batches()?
            .into_iter()
            .rev()
            .find(|b| b.undoable && !b.undone))
    }

    /// Records of `batch_id` in insertion order.
    pub fn operations_for(&self, batch_id: u64) -> Result<Vec<OperationRecord>> {
        Ok(scan::<OperationRecord>(&self.conn, OPERATIONS)?
            .into_iter()
            .filter(|op| op.batch_id == batch_id)
            .collect())
    }

    /// Undo a whole batch.
    ///
    /// The batch is flagged undone before any record is reversed and stays
    /// flagged even if some reversals fail. A batch that was already undone is
    /// left alone and reported as such.
    #[tracing::instrument(skip(self, batch), fields(batch = batch.id))]
    pub fn undo_batch(&mut self, batch: &Batch) -> Result<UndoReport> {
        let current = self.get_batch(batch.id)?.ok_or(JournalError::BatchNotFound(batch.id))?;
        if !current.undoable {
            return Err(JournalError::NotUndoable {
                id: current.id,
                kind: current.command_type,
            });
        }
        let records = self.operations_for(current.id)?;
        if current.undone {
            tracing::info!("batch already undone");
            let outcomes = records
                .into_iter()
                .map(|record| {
                    let status = if record.undone {
                        UndoStatus::AlreadyUndone
                    } else {
                        UndoStatus::NotAttempted
                    };
                    UndoOutcome { record, status }
                })
                .collect();
            return Ok(UndoReport {
                batch_id: Some(current.id),
                already_undone: true,
                working_dir: current.working_dir,
                outcomes,
            });
        }

        let mut marked = current.clone();
        marked.undone = true;
        self.write(|tx| put(tx, BATCHES, marked.id, &marked))?;

        let mut report = self.undo_operations(&records, &current.command_type, &current.working_dir)?;
        report.batch_id = Some(current.id);
        Ok(report)
    }

    /// Reverse an explicit set of records, in the order given.
    ///
    /// Each record is re-read first so a stale copy cannot be reversed twice.
    /// A failed reversal leaves its record untouched and does not stop the rest.
    pub fn undo_operations(
        &mut self,
        subset: &[OperationRecord],
        command_type: &str,
        working_dir: &Path,
    ) -> Result<UndoReport> {
        let kind = command_type
            .parse::<OperationKind>()
            .map_err(|_| JournalError::NotUndoable {
                id: subset.first().map(|r| r.batch_id).unwrap_or_default(),
                kind: command_type.to_string(),
            })?;

        let mut report = UndoReport {
            working_dir: working_dir.to_path_buf(),
            ..UndoReport::default()
        };
        for stale in subset {
            let mut record = fetch::<OperationRecord>(&self.conn, OPERATIONS, stale.id)?.unwrap_or_else(|| stale.clone());
            if record.undone {
                tracing::info!(record = record.id, "already undone");
                report.outcomes.push(UndoOutcome {
                    record,
                    status: UndoStatus::AlreadyUndone,
                });
                continue;
            }

            let reversal = match kind {
                OperationKind::Move => fsops::mv(&record.output, &record.input).map(|_| UndoStatus::Restored),
                _ => fsops::remove_all(&record.output).map(|_| UndoStatus::Removed),
            };
            let status = match reversal {
                Ok(status) => {
                    record.undone = true;
                    self.write(|tx| put(tx, OPERATIONS, record.id, &record))?;
                    status
                }
                Err(err) => {
                    tracing::debug!(record = record.id, error = %format!("{err:#}"), "undo failed");
                    UndoStatus::Failed(format!("{err:#}"))
                }
            };
            report.outcomes.push(UndoOutcome { record, status });
        }
        Ok(report)
    }

    /// Save `batch`'s command under `name` (case-insensitive, unique).
    pub fn add_favorite(&mut self, name: &str, batch: &Batch) -> Result<Favorite> {
        let name = name.to_lowercase();
        self.write(|tx| {
            let existing: Vec<Favorite> = scan(tx, FAVORITES)?;
            if existing.iter().any(|f| f.name == name) {
                return Err(JournalError::FavoriteExists(name.clone()));
            }
            let favorite = Favorite {
                id: next_sequence(tx, FAVORITES)?,
                name: name.clone(),
                command_type: batch.command_type.clone(),
                command: batch.command.clone(),
                command_string: batch.command_string.clone(),
            };
            put(tx, FAVORITES, favorite.id, &favorite)?;
            Ok(favorite)
        })
    }

    pub fn favorite(&self, name: &str) -> Result<Option<Favorite>> {
        let name = name.to_lowercase();
        Ok(self.list_favorites()?.into_iter().find(|f| f.name == name))
    }

    pub fn list_favorites(&self) -> Result<Vec<Favorite>> {
        scan(&self.conn, FAVORITES)
    }
}

fn key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn next_sequence(tx: &Transaction<'_>, bucket: &str) -> Result<u64> {
    tx.execute(
        "INSERT INTO sequences (bucket, value) VALUES (?1, 1)
         ON CONFLICT(bucket) DO UPDATE SET value = value + 1",
        params![bucket],
    )?;
    let value: i64 = tx.query_row(
        "SELECT value FROM sequences WHERE bucket = ?1",
        params![bucket],
        |row| row.get(0),
    )?;
    Ok(value as u64)
}

fn put<T: Serialize>(tx: &Transaction<'_>, bucket: &str, id: u64, record: &T) -> Result<()> {
    let value = serde_json::to_string(record)?;
    tx.execute(
        &format!("INSERT OR REPLACE INTO {bucket} (key, value) VALUES (?1, ?2)"),
        params![&key(id)[..], value],
    )?;
    Ok(())
}

fn fetch<T: DeserializeOwned>(conn: &Connection, bucket: &str, id: u64) -> Result<Option<T>> {
    let value: Option<String> = conn
        .query_row(
            &format!("SELECT value FROM {bucket} WHERE key = ?1"),
            params![&key(id)[..]],
            |row| row.get(0),
        )
        .optional()?;
    value.map(|v| serde_json::from_str(&v)).transpose().map_err(Into::into)
}

/// All decodable records of `bucket` in key order; undecodable ones are skipped.
fn scan<T: DeserializeOwned>(conn: &Connection, bucket: &str) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(&format!("SELECT key, value FROM {bucket} ORDER BY key"))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))?;
    let mut records = Vec::new();
    for row in rows {
        let (key, value) = row?;
        match serde_json::from_str(&value) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(%bucket, key = ?key, error = %err, "skipping undecodable record"),
        }
    }
    Ok(records)
}

/// Render command tokens as a shell-ish string, quoting tokens that need it.
pub fn format_command(tokens: &[String]) -> String {
    const SPECIAL: &[char] = &[' ', '|', '\'', '?', '%', '*', '+', '[', ']', ';', '&', '<', '>', '!', '$'];
    tokens
        .iter()
        .map(|token| {
            if token.contains(SPECIAL) {
                format!("\"{token}\"")
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
