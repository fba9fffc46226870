//! `fu` - bulk move, copy and link with templated destinations and undo.
//!
//! See `DESIGN.md` for architecture.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fileutils::cli::{Cli, Command};
use fileutils::engine::{self, GlobalArgs};
use fileutils::model::OperationKind;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_env("FU_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Stored with each batch so favorites can replay it.
    let tokens: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse();
    let global = GlobalArgs {
        json: cli.json,
        db: cli.db,
    };
    let exit_code = match cli.command {
        Command::Cp(args) => engine::transfer(OperationKind::Copy, &args, false, &global, &tokens)?,
        Command::Mv(args) => engine::transfer(OperationKind::Move, &args.common, args.no_move, &global, &tokens)?,
        Command::Ln(args) => {
            let kind = if args.soft {
                OperationKind::LinkSoft
            } else {
                OperationKind::LinkHard
            };
            engine::transfer(kind, &args.common, false, &global, &tokens)?
        }
        Command::History(args) => engine::history(&args, &global)?,
        Command::Undo(args) => engine::undo(&args, &global)?,
        Command::Favorite(args) => engine::favorite(&args, &global)?,
        Command::Schema => engine::schema()?,
    };
    std::process::exit(exit_code);
}
