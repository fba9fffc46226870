use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::history::DEFAULT_PER_PAGE;
use crate::model::SortMode;

/// Bulk move, copy and link with templated destinations and undo.
#[derive(Parser)]
#[command(name = "fu", version, about, long_about = None)]
pub struct Cli {
    /// Output structured JSON to stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Operation log location (default: ~/.fileutils/fu.db).
    #[arg(long, global = true, env = "FU_DB", value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy files to templated destinations.
    #[command(visible_alias = "copy")]
    Cp(TransferArgs),
    /// Move or rename files to templated destinations.
    #[command(visible_alias = "move")]
    Mv(MoveArgs),
    /// Hard-link (or with --soft, symlink) files to templated destinations.
    #[command(visible_alias = "link")]
    Ln(LinkArgs),
    /// List past batches, or the operations of one batch.
    #[command(visible_alias = "h")]
    History(HistoryArgs),
    /// Undo a batch, or selected operations of it.
    Undo(UndoArgs),
    /// Save and re-run commands by name.
    #[command(visible_aliases = ["f", "fav"])]
    Favorite(FavoriteArgs),
    /// Print JSON Schema for the stored records.
    Schema,
}

/// Flags shared by `cp`, `mv` and `ln`.
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Input files or glob patterns, followed by the output template.
    #[arg(required = true, num_args = 2.., value_name = "INPUT... TEMPLATE")]
    pub paths: Vec<String>,

    /// Overwrite existing destinations without asking.
    #[arg(short, long)]
    pub force: bool,

    /// Print what would happen without touching anything.
    #[arg(short, long)]
    pub simulate: bool,

    /// Report every completed operation.
    #[arg(short, long)]
    pub verbose: bool,

    /// Order in which inputs are processed and indexed.
    #[arg(long, value_enum, default_value_t = SortMode::None)]
    pub sort: SortMode,

    /// Skip inputs that are directories.
    #[arg(short = 'd', long)]
    pub ignore_directories: bool,

    /// Do not append an index to conflicting outputs.
    #[arg(long)]
    pub no_index: bool,

    /// Do not give extension-less outputs the input's extension.
    #[arg(long)]
    pub no_ext: bool,

    /// Do not create missing output directories.
    #[arg(long)]
    pub no_mkdir: bool,
}

impl TransferArgs {
    /// Split the positional values into input patterns and the template.
    pub fn inputs_and_template(&self) -> Option<(&[String], &str)> {
        match self.paths.split_last() {
            Some((template, inputs)) if !inputs.is_empty() => Some((inputs, template.as_str())),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    #[command(flatten)]
    pub common: TransferArgs,

    /// Keep each output in its input's directory (rename only).
    #[arg(long)]
    pub no_move: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(flatten)]
    pub common: TransferArgs,

    /// Create symbolic links instead of hard links.
    #[arg(long)]
    pub soft: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: Option<HistoryCommand>,

    /// List oldest batches first.
    #[arg(short, long)]
    pub oldest_first: bool,

    /// Page to show, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Batches per page.
    #[arg(short = 'i', long, default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: usize,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Show the command and operations of one batch.
    Show { batch: u64 },
}

#[derive(Args, Debug)]
pub struct UndoArgs {
    /// Batch to undo (default: the most recent one that can be undone).
    #[arg(long)]
    pub batch: Option<u64>,

    /// Only undo these operation ids of the batch, e.g. `3,5,8`.
    #[arg(long, value_name = "IDS")]
    pub operations: Option<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct FavoriteArgs {
    #[command(subcommand)]
    pub command: FavoriteCommand,
}

#[derive(Subcommand, Debug)]
pub enum FavoriteCommand {
    /// List saved commands.
    List,
    /// Save the command of a batch under a name.
    Add { batch: u64, name: String },
    /// Re-run a saved command in the current directory.
    Run { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_positional_is_the_template() {
        let cli = Cli::try_parse_from(["fu", "mv", "*.txt", "b/*.md", "out/{{f}}", "--no-move", "-f"]).unwrap();
        let Command::Mv(args) = cli.command else {
            panic!("expected mv");
        };
        let (inputs, template) = args.common.inputs_and_template().unwrap();
        assert_eq!(inputs, ["*.txt", "b/*.md"]);
        assert_eq!(template, "out/{{f}}");
        assert!(args.no_move && args.common.force);
    }

    #[test]
    fn a_template_alone_is_rejected() {
        assert!(Cli::try_parse_from(["fu", "cp", "out/{{f}}"]).is_err());
    }

    #[test]
    fn aliases_and_sort_values() {
        let cli = Cli::try_parse_from(["fu", "link", "a", "b", "--soft", "--sort", "reverse-size"]).unwrap();
        let Command::Ln(args) = cli.command else {
            panic!("expected ln");
        };
        assert!(args.soft);
        assert_eq!(args.common.sort, SortMode::ReverseSize);
    }

    #[test]
    fn history_show_takes_a_batch_id() {
        let cli = Cli::try_parse_from(["fu", "history", "show", "7"]).unwrap();
        let Command::History(args) = cli.command else {
            panic!("expected history");
        };
        assert!(matches!(args.command, Some(HistoryCommand::Show { batch: 7 })));
    }
}
