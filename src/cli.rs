//! Command-line interface definition.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wit")]
#[command(about = "Workspace integration tool for multi-repository projects")]
#[command(version)]
#[command(arg_required_else_help = true)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Specify level of verbosity (-v, -vv, -vvv, -vvvv)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help_heading = "Global Options"
    )]
    pub verbose: u8,

    /// Run in the given path
    #[arg(
        short = 'C',
        value_name = "path",
        global = true,
        help_heading = "Global Options"
    )]
    pub directory: Option<PathBuf>,

    /// Alternative paths to look for packages, colon or space separated
    #[arg(
        long,
        env = wit::env::REPO_PATH,
        value_name = "paths",
        global = true,
        help_heading = "Global Options"
    )]
    pub repo_path: Option<String>,

    /// Prepend paths to the repo search path
    #[arg(
        long,
        value_name = "paths",
        global = true,
        help_heading = "Global Options"
    )]
    pub prepend_repo_path: Option<String>,

    /// Number of parallel jobs for clone and fetch
    #[arg(
        short = 'j',
        long,
        value_name = "jobs",
        global = true,
        help_heading = "Global Options"
    )]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a workspace
    Init {
        workspace_name: String,

        /// Add an initial package
        #[arg(short = 'a', long = "add-pkg", value_name = "repo[::revision]")]
        add_pkg: Vec<String>,

        /// Don't run update upon creating the workspace
        #[arg(long)]
        no_update: bool,
    },

    /// Add a package to the workspace
    AddPkg {
        #[arg(value_name = "repo[::revision]")]
        repo: String,
    },

    /// Update the revision of a previously added package
    UpdatePkg {
        #[arg(value_name = "repo[::revision]")]
        repo: String,
    },

    /// Add a dependency to the package in the current directory
    AddDep {
        #[arg(value_name = "pkg[::revision]")]
        pkg: String,

        /// Comment recorded with the manifest entry
        #[arg(short = 'm', long, value_name = "text")]
        message: Option<String>,
    },

    /// Update the revision of a dependency in the current package
    UpdateDep {
        #[arg(value_name = "pkg[::revision]")]
        pkg: String,

        /// Comment recorded with the manifest entry
        #[arg(short = 'm', long, value_name = "text")]
        message: Option<String>,
    },

    /// Show the status of the workspace
    Status,

    /// Resolve the dependency graph and check out the chosen commits
    Update,

    /// Inspect the resolved dependency graph
    Inspect {
        /// Print the dependency tree
        #[arg(long)]
        tree: bool,

        /// Print a graphviz digraph
        #[arg(long, conflicts_with = "tree")]
        dot: bool,
    },

    /// Run a command in each locked package
    Foreach {
        /// Keep going when the command fails in a package
        #[arg(long)]
        continue_on_fail: bool,

        cmd: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Recreate a workspace from its lock file
    Restore {
        /// Read the workspace manifest and lock from this directory
        #[arg(long, value_name = "path")]
        from_workspace: Option<PathBuf>,

        /// Create this directory and restore into it instead of the cwd
        workspace_name: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_anywhere() {
        let cli = Cli::parse_from(["wit", "update", "-vv", "-j", "4"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.jobs, Some(4));
        assert!(matches!(cli.command, Commands::Update));
    }

    #[test]
    fn foreach_passes_hyphenated_args_through() {
        let cli = Cli::parse_from(["wit", "foreach", "git", "log", "--oneline", "-n1"]);
        match cli.command {
            Commands::Foreach { cmd, args, .. } => {
                assert_eq!(cmd, "git");
                assert_eq!(args, vec!["log", "--oneline", "-n1"]);
            }
            _ => panic!("expected foreach"),
        }
    }
}
