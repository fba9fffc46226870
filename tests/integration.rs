use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use fileutils::engine::{Executor, RunSummary, prepare, report_undo};
use fileutils::error::PlanError;
use fileutils::events::Event;
use fileutils::exit_codes::exit;
use fileutils::history::parse_operation_selection;
use fileutils::journal::Journal;
use fileutils::model::{OperationKind, PlanOptions, RunOptions};
use fileutils::prompt::{ConflictChoice, Scripted, ScriptedPrompter};
use fileutils::reporter::Reporter;

fn run(
    root: &Path,
    kind: OperationKind,
    patterns: &[&str],
    template: &str,
    options: RunOptions,
    prompter: &mut ScriptedPrompter,
    journal: Option<&mut Journal>,
) -> Result<(RunSummary, Reporter)> {
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
    let mut plan_options = PlanOptions::new(root);
    plan_options.force = options.force;
    let (ops, _warnings) = prepare(kind, &patterns, template, &plan_options)?;

    let mut command = vec![kind.as_str().to_string()];
    command.extend(patterns);
    command.push(template.to_string());

    let mut reporter = Reporter::new(false);
    let summary = Executor::new(options, prompter, &mut reporter).run(kind, &ops, journal, &command, root)?;
    Ok((summary, reporter))
}

#[test]
fn test_copy_indexes_conflicting_outputs() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("a"))?;
    fs::create_dir_all(root.join("b"))?;
    fs::write(root.join("a/report.csv"), "from a")?;
    fs::write(root.join("b/report.csv"), "from b")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::Copy,
        &["*/report.csv"],
        "out/{{f}}_{{i}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.exit_code(), exit::SUCCESS);
    assert_eq!(fs::read_to_string(root.join("out/report_1.csv"))?, "from a");
    assert_eq!(fs::read_to_string(root.join("out/report_2.csv"))?, "from b");
    assert!(root.join("a/report.csv").exists());

    let batch = journal.get_batch(summary.batch_id.unwrap())?.unwrap();
    assert_eq!(batch.command_type, "copy");
    assert!(batch.undoable);
    assert_eq!(batch.command_string, "copy \"*/report.csv\" out/{{f}}_{{i}}");
    let outputs: Vec<_> = journal
        .operations_for(batch.id)?
        .into_iter()
        .map(|op| op.output)
        .collect();
    assert_eq!(outputs, vec![root.join("out/report_1.csv"), root.join("out/report_2.csv")]);
    assert!(prompter.asked.is_empty());
    Ok(())
}

#[test]
fn test_move_onto_itself_records_nothing() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("a.txt"), "a")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, reporter) = run(
        root,
        OperationKind::Move,
        &["a.txt"],
        "{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!((summary.completed, summary.skipped), (0, 1));
    assert!(journal.operations_for(summary.batch_id.unwrap())?.is_empty());
    assert!(matches!(reporter.events().last(), Some(Event::OpUnchanged { .. })));
    assert!(root.join("a.txt").exists());
    Ok(())
}

#[test]
fn test_simulate_changes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join("a.txt"), "a")?;

    let options = RunOptions {
        simulate: true,
        ..RunOptions::default()
    };
    let mut prompter = ScriptedPrompter::default();
    let (summary, reporter) = run(root, OperationKind::Move, &["*.txt"], "moved/{{f}}", options, &mut prompter, None)?;

    assert_eq!(summary.simulated, 1);
    assert_eq!(summary.batch_id, None);
    assert!(root.join("a.txt").exists());
    assert!(!root.join("moved").exists());
    assert_eq!(
        reporter.events(),
        &[Event::OpSimulated {
            input: root.join("a.txt"),
            output: root.join("moved/a.txt"),
            size: 1,
            conflict: false,
        }]
    );
    Ok(())
}

fn conflict_fixture(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("dst"))?;
    fs::write(root.join("a.txt"), "new")?;
    fs::write(root.join("dst/a.txt"), "old")?;
    Ok(())
}

#[test]
fn test_prompt_skip_leaves_both_files() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    conflict_fixture(root)?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::new([Scripted::Choice(ConflictChoice::Skip)]);
    let (summary, _) = run(
        root,
        OperationKind::Move,
        &["a.txt"],
        "dst/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.skipped, 1);
    assert_eq!(fs::read_to_string(root.join("dst/a.txt"))?, "old");
    assert!(root.join("a.txt").exists());
    assert!(journal.operations_for(summary.batch_id.unwrap())?.is_empty());
    Ok(())
}

#[test]
fn test_prompt_overwrite_replaces_destination() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    conflict_fixture(root)?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::new([Scripted::Choice(ConflictChoice::Overwrite)]);
    let (summary, _) = run(
        root,
        OperationKind::Move,
        &["a.txt"],
        "dst/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.completed, 1);
    assert_eq!(fs::read_to_string(root.join("dst/a.txt"))?, "new");
    assert!(!root.join("a.txt").exists());
    assert_eq!(prompter.asked, vec![(root.join("a.txt"), root.join("dst/a.txt"))]);
    Ok(())
}

#[test]
fn test_prompt_rename_keeps_extension() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    conflict_fixture(root)?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::new([Scripted::Choice(ConflictChoice::Rename("b".into()))]);
    let (summary, _) = run(
        root,
        OperationKind::Copy,
        &["a.txt"],
        "dst/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.completed, 1);
    assert_eq!(fs::read_to_string(root.join("dst/a.txt"))?, "old");
    assert_eq!(fs::read_to_string(root.join("dst/b.txt"))?, "new");
    let records = journal.operations_for(summary.batch_id.unwrap())?;
    assert_eq!(records[0].output, root.join("dst/b.txt"));
    Ok(())
}

#[test]
fn test_prompt_abort_stops_the_run() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    conflict_fixture(root)?;
    fs::write(root.join("b.txt"), "b")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::new([Scripted::Abort]);
    let (summary, reporter) = run(
        root,
        OperationKind::Move,
        &["*.txt"],
        "dst/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert!(summary.aborted);
    assert_eq!(summary.exit_code(), exit::ABORTED);
    assert!(root.join("b.txt").exists());
    assert!(!root.join("dst/b.txt").exists());
    assert!(matches!(reporter.events().last(), Some(Event::RunAborted)));
    Ok(())
}

#[test]
fn test_force_overwrites_without_asking() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    conflict_fixture(root)?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let (summary, _) = run(
        root,
        OperationKind::LinkHard,
        &["a.txt"],
        "dst/{{f}}",
        options,
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.completed, 1);
    assert!(prompter.asked.is_empty());
    assert_eq!(fs::read_to_string(root.join("dst/a.txt"))?, "new");
    Ok(())
}

#[test]
fn test_undo_move_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("x"))?;
    fs::write(root.join("x/a.txt"), "A")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::Move,
        &["x/a.txt"],
        "y/b",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;
    assert_eq!(fs::read_to_string(root.join("y/b.txt"))?, "A");

    let batch = journal.last_undoable()?.unwrap();
    assert_eq!(Some(batch.id), summary.batch_id);
    let report = journal.undo_batch(&batch)?;
    assert_eq!(report.reversed(), 1);
    assert_eq!(fs::read_to_string(root.join("x/a.txt"))?, "A");
    assert!(!root.join("y/b.txt").exists());

    let again = journal.undo_batch(&batch)?;
    assert!(again.already_undone);
    assert_eq!(again.reversed(), 0);
    assert!(journal.last_undoable()?.is_none());
    Ok(())
}

#[test]
fn test_undo_selected_operations() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    for name in ["1.log", "2.log", "3.log"] {
        fs::write(root.join(name), name)?;
    }

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::Copy,
        &["*.log"],
        "copies/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;
    let batch = journal.get_batch(summary.batch_id.unwrap())?.unwrap();
    let records = journal.operations_for(batch.id)?;
    assert_eq!(records.len(), 3);

    let ids = format!("{},{}", records[2].id, records[0].id);
    let selected = parse_operation_selection(&ids, &records)?;
    let report = journal.undo_operations(&selected, &batch.command_type, &batch.working_dir)?;

    assert_eq!(report.reversed(), 2);
    assert!(!root.join("copies/1.log").exists());
    assert!(root.join("copies/2.log").exists());
    assert!(!root.join("copies/3.log").exists());
    assert!(!journal.get_batch(batch.id)?.unwrap().undone);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_soft_links_point_at_absolute_input() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("data.bin"), "d")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::LinkSoft,
        &["data.bin"],
        "links/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    let link = root.join("links/data.bin");
    assert_eq!(fs::read_link(&link)?, root.join("data.bin"));

    let batch = journal.get_batch(summary.batch_id.unwrap())?.unwrap();
    journal.undo_batch(&batch)?;
    assert!(fs::symlink_metadata(&link).is_err());
    assert!(root.join("data.bin").exists());
    Ok(())
}

#[test]
fn test_bad_input_is_rejected_before_anything_runs() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join("a.txt"), "a")?;
    let options = PlanOptions::new(root);
    let patterns = vec!["a.txt".to_string()];

    assert!(matches!(
        prepare(OperationKind::Copy, &patterns, "{{ f", &options),
        Err(PlanError::Template(_))
    ));
    assert!(matches!(
        prepare(OperationKind::Copy, &["[".to_string()], "{{f}}", &options),
        Err(PlanError::Pattern { .. })
    ));
    assert!(matches!(
        prepare(OperationKind::Copy, &patterns, "{{ missing }}", &options),
        Err(PlanError::Render { .. })
    ));
    assert!(matches!(
        prepare(OperationKind::Copy, &patterns, "{% if false %}x{% endif %}", &options),
        Err(PlanError::EmptyOutput(_))
    ));
    Ok(())
}

#[test]
fn test_failed_entry_is_not_logged_and_run_continues() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("a.txt"), "a")?;
    fs::write(root.join("b.txt"), "b")?;
    // A plain file where `a.txt` expects a directory.
    fs::write(root.join("blocker"), "")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, reporter) = run(
        root,
        OperationKind::Copy,
        &["*.txt"],
        r#"{% if f == "a" %}blocker{% else %}out{% endif %}/{{f}}"#,
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!((summary.failed, summary.completed), (1, 1));
    assert_eq!(summary.exit_code(), exit::OPERATIONAL_FAILURE);
    assert!(reporter.events().iter().any(|e| matches!(e, Event::OpFailed { input, .. } if *input == root.join("a.txt"))));
    let outputs: Vec<_> = journal
        .operations_for(summary.batch_id.unwrap())?
        .into_iter()
        .map(|op| op.output)
        .collect();
    assert_eq!(outputs, vec![root.join("out/b.txt")]);
    Ok(())
}

#[test]
fn test_case_only_rename_moves_without_asking() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("Report.txt"), "R")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::Move,
        &["Report.txt"],
        "report",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.completed, 1);
    assert!(prompter.asked.is_empty());
    assert_eq!(fs::read_to_string(root.join("report.txt"))?, "R");
    Ok(())
}

#[test]
fn test_case_only_rename_onto_another_file_asks() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("Report.txt"), "R")?;
    fs::write(root.join("report.txt"), "r")?;
    if fs::read_to_string(root.join("Report.txt"))? != "R" {
        // Case-insensitive filesystem: the two names are one file.
        return Ok(());
    }

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::new([Scripted::Choice(ConflictChoice::Skip)]);
    let (summary, _) = run(
        root,
        OperationKind::Move,
        &["Report.txt"],
        "report",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;

    assert_eq!(summary.skipped, 1);
    assert_eq!(prompter.asked, vec![(root.join("Report.txt"), root.join("report.txt"))]);
    assert_eq!(fs::read_to_string(root.join("Report.txt"))?, "R");
    assert_eq!(fs::read_to_string(root.join("report.txt"))?, "r");
    Ok(())
}

#[test]
fn test_second_undo_reports_every_record() -> Result<()> {
    let dir = tempdir()?;
    let db = tempdir()?;
    let root = dir.path();
    fs::write(root.join("1.log"), "1")?;
    fs::write(root.join("2.log"), "2")?;

    let mut journal = Journal::open(db.path().join("fu.db"))?;
    let mut prompter = ScriptedPrompter::default();
    let (summary, _) = run(
        root,
        OperationKind::Copy,
        &["*.log"],
        "copies/{{f}}",
        RunOptions::default(),
        &mut prompter,
        Some(&mut journal),
    )?;
    let batch = journal.get_batch(summary.batch_id.unwrap())?.unwrap();
    let records = journal.operations_for(batch.id)?;
    fs::remove_file(root.join("copies/1.log"))?;

    let first = journal.undo_batch(&batch)?;
    assert_eq!((first.reversed(), first.failed()), (1, 1));

    let second = journal.undo_batch(&batch)?;
    let mut reporter = Reporter::new(false);
    report_undo(&mut reporter, &second);
    assert_eq!(
        reporter.events(),
        &[
            Event::RecordNotAttempted { record_id: records[0].id },
            Event::RecordAlreadyUndone { record_id: records[1].id },
            Event::UndoCompleted {
                batch_id: Some(batch.id),
                reversed: 0,
                failed: 0,
                already_undone: true,
            },
        ]
    );
    Ok(())
}
