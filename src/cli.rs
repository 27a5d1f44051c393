//! Command-line interface implementation for metalware.
//! Provides argument parsing using clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::context::ScopeOverrides;

/// Command-line arguments structure for metalware.
#[derive(Parser, Debug)]
#[command(author, version, about = "Metalware: resolve and render cluster configuration", long_about = None)]
pub struct Args {
    /// Repository root holding configuration/, answers/, assets/ and genders
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum nested renders before a value is treated as recursive
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Fail instead of warning when an answer is missing
    #[arg(long)]
    pub strict_answers: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a template file for the cluster, a group or a node
    Render {
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Print the fully resolved configuration as YAML
    ViewConfig {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Print the resolved answers as YAML
    ViewAnswers {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Print an asset with its references resolved
    ViewAsset {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct ScopeArgs {
    /// Render for this node
    #[arg(long, conflicts_with = "group")]
    pub node: Option<String>,

    /// Render for this group
    #[arg(long)]
    pub group: Option<String>,
}

impl From<ScopeArgs> for ScopeOverrides {
    fn from(args: ScopeArgs) -> Self {
        ScopeOverrides { node: args.node, group: args.group }
    }
}

/// Parses command line arguments and returns the Args structure.
pub fn get_args() -> Args {
    Args::parse()
}
