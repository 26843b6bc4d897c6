//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Terrace - apply planned infrastructure changes.
#[derive(Parser, Debug)]
#[command(name = "terrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a saved plan.
    Apply {
        /// Path to the plan file (JSON).
        #[arg(short, long)]
        plan: PathBuf,

        /// Path to the configuration file (searched for if omitted).
        #[arg(short, long, env = "TERRACE_CONFIG")]
        config: Option<PathBuf>,

        /// Where to write the resulting state (JSON).
        #[arg(long)]
        state_out: Option<PathBuf>,

        /// Maximum number of concurrent operations (overrides TERRACE_PARALLELISM).
        #[arg(long)]
        parallelism: Option<usize>,
    },

    /// Show the apply graph of a saved plan.
    Graph {
        /// Path to the plan file (JSON).
        #[arg(short, long)]
        plan: PathBuf,

        /// Path to the configuration file (searched for if omitted).
        #[arg(short, long, env = "TERRACE_CONFIG")]
        config: Option<PathBuf>,

        /// Graph format.
        #[arg(long, default_value = "dot")]
        format: GraphFormat,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Graph rendering formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum GraphFormat {
    /// Graphviz DOT.
    #[default]
    Dot,
    /// JSON nodes and edges.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "terrace",
            "apply",
            "--plan",
            "plan.json",
            "--state-out",
            "state.json",
            "--parallelism",
            "3",
            "--output",
            "json",
        ])
        .expect("valid arguments");

        assert!(matches!(cli.output, OutputFormat::Json));
        match cli.command {
            Commands::Apply {
                plan,
                state_out,
                parallelism,
                ..
            } => {
                assert_eq!(plan, PathBuf::from("plan.json"));
                assert_eq!(state_out, Some(PathBuf::from("state.json")));
                assert_eq!(parallelism, Some(3));
            }
            Commands::Graph { .. } => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_graph_requires_plan() {
        assert!(Cli::try_parse_from(["terrace", "graph"]).is_err());
        let cli = Cli::try_parse_from(["terrace", "graph", "-p", "plan.json", "--format", "json"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Commands::Graph {
                format: GraphFormat::Json,
                ..
            }
        ));
    }
}
