//! Template-driven bulk move, copy and link with a reversible operation log.
//!
//! The pipeline is [`resolve`] → [`planner`] → [`engine::Executor`], with
//! every executed action recorded in the [`journal`].

pub mod cli;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fsops;
pub mod history;
pub mod journal;
pub mod model;
pub mod path;
pub mod planner;
pub mod prompt;
pub mod reporter;
pub mod resolve;
pub mod template;
