//! CLI module: clap parsing and config assembly.

mod clap_parser;

pub use clap_parser::{Cli, Command, MergeArgs, MergePlanArgs, ReconcileArgs};
