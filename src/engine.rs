use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

use crate::cli::{FavoriteArgs, FavoriteCommand, HistoryArgs, HistoryCommand, TransferArgs, UndoArgs};
use crate::error::{JournalError, PlanError, PromptError};
use crate::events::Event;
use crate::exit_codes::exit;
use crate::fsops;
use crate::history;
use crate::journal::{Journal, UndoReport, UndoStatus, generate_schema};
use crate::model::{OperationKind, PlanOptions, PlannedOperation, RunOptions};
use crate::path::PathDescriptor;
use crate::planner;
use crate::prompt::{ConflictChoice, DialoguerPrompter, Prompter};
use crate::reporter::Reporter;
use crate::resolve::resolve_patterns;
use crate::template::OutputTemplate;

/// Options that apply to every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub json: bool,
    pub db: Option<PathBuf>,
}

/// Counts for one executor run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub batch_id: Option<u64>,
    pub completed: usize,
    pub simulated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: bool,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            exit::ABORTED
        } else if self.failed > 0 {
            exit::OPERATIONAL_FAILURE
        } else {
            exit::SUCCESS
        }
    }
}

enum Outcome {
    Completed,
    Skipped,
    Failed,
    Aborted,
}

/// Runs a plan entry by entry, in order, recording each success.
pub struct Executor<'a> {
    options: RunOptions,
    prompter: &'a mut dyn Prompter,
    reporter: &'a mut Reporter,
}

impl<'a> Executor<'a> {
    pub fn new(options: RunOptions, prompter: &'a mut dyn Prompter, reporter: &'a mut Reporter) -> Self {
        Self {
            options,
            prompter,
            reporter,
        }
    }

    /// Execute `ops`. A batch is opened in `journal` before the first entry
    /// unless simulating; without a journal nothing is recorded.
    pub fn run(
        &mut self,
        kind: OperationKind,
        ops: &[PlannedOperation],
        mut journal: Option<&mut Journal>,
        command: &[String],
        working_dir: &Path,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if self.options.simulate {
            for op in ops.iter().filter(|op| !op.skip) {
                let Some(output) = &op.output else { continue };
                self.reporter.record(Event::OpSimulated {
                    input: op.input.abs().to_path_buf(),
                    output: output.abs().to_path_buf(),
                    size: op.snapshot.size,
                    conflict: op.has_conflict(),
                });
                summary.simulated += 1;
            }
            return Ok(summary);
        }

        if let Some(journal) = journal.as_deref_mut() {
            let batch = journal
                .create_batch(kind.as_str(), command, working_dir)
                .context("failed to start a batch")?;
            self.reporter.record(Event::BatchCreated {
                batch_id: batch.id,
                kind: batch.command_type.clone(),
            });
            summary.batch_id = Some(batch.id);
        }

        self.reporter.start_progress(ops.len() as u64);
        for op in ops {
            if op.skip {
                continue;
            }
            let outcome = match &op.output {
                Some(output) => self.execute(kind, op, output.clone(), journal.as_deref_mut(), summary.batch_id),
                None => continue,
            };
            self.reporter.advance();
            match outcome {
                Outcome::Completed => summary.completed += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Aborted => {
                    summary.aborted = true;
                    self.reporter.record(Event::RunAborted);
                    break;
                }
            }
        }
        self.reporter.finish_progress();
        tracing::info!(?summary, "run finished");
        Ok(summary)
    }

    fn execute(
        &mut self,
        kind: OperationKind,
        op: &PlannedOperation,
        mut output: PathDescriptor,
        journal: Option<&mut Journal>,
        batch_id: Option<u64>,
    ) -> Outcome {
        let input = &op.input;
        if input.abs() == output.abs() {
            self.reporter.record(Event::OpUnchanged {
                input: input.abs().to_path_buf(),
            });
            return Outcome::Skipped;
        }

        if !self.options.no_mkdir
            && let Err(err) = fsops::ensure_dir(output.dir(), input.dir())
        {
            return self.failed(input, &output, format!("{err:#}"));
        }

        let mut replace = false;
        loop {
            if !exists(output.abs()) || (kind == OperationKind::Move && is_case_only_rename(input.abs(), output.abs())) {
                break;
            }
            if self.options.force {
                replace = true;
                break;
            }
            let prompter = &mut *self.prompter;
            let choice = self.reporter.suspend(|| prompter.resolve_conflict(input, &output));
            match choice {
                Ok(ConflictChoice::Overwrite) => {
                    replace = true;
                    break;
                }
                Ok(ConflictChoice::Rename(name)) if !name.is_empty() => {
                    output = output.with_base_name(&name);
                }
                Ok(ConflictChoice::Rename(_)) => {}
                Ok(ConflictChoice::Skip) => {
                    self.reporter.record(Event::OpSkipped {
                        input: input.abs().to_path_buf(),
                        output: output.abs().to_path_buf(),
                    });
                    return Outcome::Skipped;
                }
                Err(PromptError::Aborted) => return Outcome::Aborted,
                Err(err) => {
                    tracing::debug!(error = %err, "prompt failed");
                    return Outcome::Aborted;
                }
            }
        }
        if replace {
            self.reporter.record(Event::OpOverwriting {
                output: output.abs().to_path_buf(),
            });
        }

        if let Err(err) = fsops::dispatch(kind, input.abs(), output.abs(), replace) {
            return self.failed(input, &output, format!("{err:#}"));
        }

        let record_id = match (journal, batch_id) {
            (Some(journal), Some(batch_id)) => match journal.append_operation(batch_id, input.abs(), output.abs()) {
                Ok(record) => record.id,
                Err(err) => return self.failed(input, &output, format!("done, but not logged: {err}")),
            },
            _ => 0,
        };
        self.reporter.record(Event::OpCompleted {
            record_id,
            input: input.abs().to_path_buf(),
            output: output.abs().to_path_buf(),
        });
        Outcome::Completed
    }

    fn failed(&mut self, input: &PathDescriptor, output: &PathDescriptor, error: String) -> Outcome {
        self.reporter.record(Event::OpFailed {
            input: input.abs().to_path_buf(),
            output: output.abs().to_path_buf(),
            error,
        });
        Outcome::Failed
    }
}

/// True for anything at `path`, including a dangling symlink.
fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// A move whose output differs from the input only in case, where the
/// existing output is the input itself (a case-insensitive filesystem).
fn is_case_only_rename(input: &Path, output: &Path) -> bool {
    if input == output || input.to_string_lossy().to_lowercase() != output.to_string_lossy().to_lowercase() {
        return false;
    }
    same_file(input, output)
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (std::fs::symlink_metadata(a), std::fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, _b: &Path) -> bool {
    std::fs::symlink_metadata(a).is_ok()
}

/// Parse the template, resolve `patterns` and run the planner.
///
/// Returns the plan plus resolution warnings.
pub fn prepare(
    kind: OperationKind,
    patterns: &[String],
    template: &str,
    options: &PlanOptions,
) -> Result<(Vec<PlannedOperation>, Vec<String>), PlanError> {
    let template = OutputTemplate::parse(template)?;
    let resolution = resolve_patterns(patterns, &options.working_dir)?;
    let ops = planner::plan(kind, resolution.paths, &template, options, Local::now())?;
    Ok((ops, resolution.warnings))
}

fn open_journal(global: &GlobalArgs) -> Result<Journal> {
    let path = match &global.db {
        Some(path) => path.clone(),
        None => Journal::default_path()?,
    };
    Journal::open(&path).with_context(|| format!("failed to open operation log {}", path.display()))
}

/// `fu cp`, `fu mv`, `fu ln`.
pub fn transfer(
    kind: OperationKind,
    args: &TransferArgs,
    no_move: bool,
    global: &GlobalArgs,
    command: &[String],
) -> Result<i32> {
    let cwd = std::env::current_dir().context("cannot read the working directory")?;
    let mut reporter = Reporter::new(global.json).verbose(args.verbose).relative_to(&cwd);

    let Some((patterns, template)) = args.inputs_and_template() else {
        reporter.record(Event::InputRejected {
            error: "expected at least one input and a template".into(),
        });
        return Ok(exit::INPUT_FAILURE);
    };

    let options = PlanOptions {
        working_dir: cwd.clone(),
        sort: args.sort,
        ignore_directories: args.ignore_directories,
        no_index: args.no_index,
        no_ext: args.no_ext,
        no_move,
        force: args.force,
    };
    let (ops, warnings) = match prepare(kind, patterns, template, &options) {
        Ok(prepared) => prepared,
        Err(err) => {
            reporter.record(Event::InputRejected { error: err.to_string() });
            return Ok(exit::INPUT_FAILURE);
        }
    };
    for message in warnings {
        reporter.record(Event::Warning { message });
    }
    if ops.is_empty() {
        reporter.record(Event::Warning {
            message: "nothing to do".into(),
        });
        return Ok(exit::SUCCESS);
    }

    let run_options = RunOptions {
        force: args.force,
        simulate: args.simulate,
        verbose: args.verbose,
        no_mkdir: args.no_mkdir,
    };
    let mut journal = if args.simulate { None } else { Some(open_journal(global)?) };
    let mut prompter = DialoguerPrompter::new();
    let summary = Executor::new(run_options, &mut prompter, &mut reporter).run(
        kind,
        &ops,
        journal.as_mut(),
        command,
        &cwd,
    )?;
    Ok(summary.exit_code())
}

/// Turn an undo report into events.
pub fn report_undo(reporter: &mut Reporter, report: &UndoReport) {
    for outcome in &report.outcomes {
        let record = &outcome.record;
        let event = match &outcome.status {
            UndoStatus::Restored => Event::RecordRestored {
                record_id: record.id,
                input: record.input.clone(),
                output: record.output.clone(),
            },
            UndoStatus::Removed => Event::RecordRemoved {
                record_id: record.id,
                output: record.output.clone(),
            },
            UndoStatus::AlreadyUndone => Event::RecordAlreadyUndone { record_id: record.id },
            UndoStatus::NotAttempted => Event::RecordNotAttempted { record_id: record.id },
            UndoStatus::Failed(error) => Event::RecordUndoFailed {
                record_id: record.id,
                error: error.clone(),
            },
        };
        reporter.record(event);
    }
    reporter.record(Event::UndoCompleted {
        batch_id: report.batch_id,
        reversed: report.reversed(),
        failed: report.failed(),
        already_undone: report.already_undone,
    });
}

fn undo_exit_code(report: &UndoReport) -> i32 {
    if report.already_undone || report.failed() > 0 {
        exit::OPERATIONAL_FAILURE
    } else {
        exit::SUCCESS
    }
}

/// `fu undo`.
pub fn undo(args: &UndoArgs, global: &GlobalArgs) -> Result<i32> {
    let mut journal = open_journal(global)?;
    let batch = match args.batch {
        Some(id) => journal.get_batch(id)?,
        None => journal.last_undoable()?,
    };
    let mut reporter = Reporter::new(global.json);
    let Some(batch) = batch else {
        let message = match args.batch {
            Some(id) => JournalError::BatchNotFound(id).to_string(),
            None => "nothing to undo".to_string(),
        };
        reporter.record(Event::Warning { message });
        return Ok(exit::OPERATIONAL_FAILURE);
    };
    let mut reporter = reporter.relative_to(&batch.working_dir);
    if !batch.undoable {
        reporter.record(Event::Warning {
            message: JournalError::NotUndoable {
                id: batch.id,
                kind: batch.command_type.clone(),
            }
            .to_string(),
        });
        return Ok(exit::OPERATIONAL_FAILURE);
    }

    let selection = match &args.operations {
        Some(ids) => {
            let records = journal.operations_for(batch.id)?;
            match history::parse_operation_selection(ids, &records) {
                Ok(selected) => Some(selected),
                Err(err) => {
                    reporter.record(Event::InputRejected { error: err.to_string() });
                    return Ok(exit::INPUT_FAILURE);
                }
            }
        }
        None => None,
    };

    if !args.yes {
        let question = match &selection {
            Some(selected) => format!("Undo {} operation(s) of batch {}?", selected.len(), batch.id),
            None => format!("Undo batch {} (fu {})?", batch.id, batch.command_string),
        };
        let mut prompter = DialoguerPrompter::new();
        if !matches!(prompter.confirm(&question), Ok(true)) {
            reporter.record(Event::RunAborted);
            return Ok(exit::ABORTED);
        }
    }

    let report = match selection {
        Some(selected) => {
            let mut report = journal.undo_operations(&selected, &batch.command_type, &batch.working_dir)?;
            report.batch_id = Some(batch.id);
            report
        }
        None => journal.undo_batch(&batch)?,
    };
    report_undo(&mut reporter, &report);
    Ok(undo_exit_code(&report))
}

/// `fu history`.
pub fn history(args: &HistoryArgs, global: &GlobalArgs) -> Result<i32> {
    let journal = open_journal(global)?;

    if let Some(HistoryCommand::Show { batch }) = &args.command {
        let Some(batch) = journal.get_batch(*batch)? else {
            Reporter::new(global.json).record(Event::Warning {
                message: JournalError::BatchNotFound(*batch).to_string(),
            });
            return Ok(exit::OPERATIONAL_FAILURE);
        };
        let records = journal.operations_for(batch.id)?;
        if global.json {
            let doc = serde_json::json!({ "batch": batch, "operations": records });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        } else {
            println!("Command: fu {}", batch.command_string);
            println!();
            println!(
                "{}",
                history::render_table(
                    &history::OPERATION_HEADERS,
                    &history::operation_rows(&records, &batch.working_dir)
                )
            );
        }
        return Ok(exit::SUCCESS);
    }

    let mut batches = journal.list_batches()?;
    if !args.oldest_first {
        batches.reverse();
    }
    let page = history::paginate(&batches, args.page, args.per_page);
    if global.json {
        println!("{}", serde_json::to_string_pretty(page.items)?);
        return Ok(exit::SUCCESS);
    }
    println!(
        "{}",
        history::render_table(&history::BATCH_HEADERS, &history::batch_rows(page.items, Local::now()))
    );
    println!();
    println!("Page {} of {}", page.number, page.total_pages);
    if page.has_prev() {
        println!("  --page {} for the previous page", page.number - 1);
    }
    if page.has_next() {
        println!("  --page {} for the next page", page.number + 1);
    }
    println!("  fu history show <ID> to list a batch's operations");
    Ok(exit::SUCCESS)
}

/// `fu favorite`.
pub fn favorite(args: &FavoriteArgs, global: &GlobalArgs) -> Result<i32> {
    let mut journal = open_journal(global)?;
    let mut reporter = Reporter::new(global.json);
    match &args.command {
        FavoriteCommand::List => {
            let favorites = journal.list_favorites()?;
            if global.json {
                println!("{}", serde_json::to_string_pretty(&favorites)?);
            } else {
                let rows: Vec<Vec<String>> = favorites
                    .iter()
                    .map(|f| vec![f.id.to_string(), f.name.clone(), format!("fu {}", f.command_string)])
                    .collect();
                println!("{}", history::render_table(&["ID", "Name", "Command"], &rows));
            }
            Ok(exit::SUCCESS)
        }
        FavoriteCommand::Add { batch, name } => {
            let Some(batch) = journal.get_batch(*batch)? else {
                reporter.record(Event::Warning {
                    message: JournalError::BatchNotFound(*batch).to_string(),
                });
                return Ok(exit::OPERATIONAL_FAILURE);
            };
            match journal.add_favorite(name, &batch) {
                Ok(saved) => {
                    println!("Saved `fu {}` as {}", saved.command_string, saved.name);
                    Ok(exit::SUCCESS)
                }
                Err(err @ JournalError::FavoriteExists(_)) => {
                    reporter.record(Event::Warning { message: err.to_string() });
                    Ok(exit::OPERATIONAL_FAILURE)
                }
                Err(err) => Err(err.into()),
            }
        }
        FavoriteCommand::Run { name } => {
            let Some(saved) = journal.favorite(name)? else {
                reporter.record(Event::Warning {
                    message: JournalError::FavoriteNotFound(name.to_lowercase()).to_string(),
                });
                return Ok(exit::OPERATIONAL_FAILURE);
            };
            drop(journal);
            let cwd = std::env::current_dir().context("cannot read the working directory")?;
            let exe = std::env::current_exe().context("cannot locate the fu executable")?;
            let mut child = std::process::Command::new(exe);
            child.args(&saved.command).current_dir(&cwd);
            if let Some(db) = &global.db {
                child.env("FU_DB", db);
            }
            tracing::info!(favorite = %saved.name, command = %saved.command_string, "re-running");
            let status = child.status().context("failed to re-run the saved command")?;
            Ok(status.code().unwrap_or(exit::OPERATIONAL_FAILURE))
        }
    }
}

/// `fu schema`.
pub fn schema() -> Result<i32> {
    println!("{}", generate_schema()?);
    Ok(exit::SUCCESS)
}
