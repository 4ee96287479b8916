use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use wit::env;
use wit::workspace::Workspace;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        if let Some(exit) = err.downcast_ref::<commands::SilentExit>() {
            std::process::exit(exit.code);
        }
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

/// Bare messages at info level; everything else gets a level prefix. The
/// RUST_LOG variable overrides the -v mapping when set.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| {
            use std::io::Write;
            if record.level() == log::Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
        })
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(reference) = env::workspace_reference()
        && reference.is_relative()
    {
        anyhow::bail!(
            "environment variable ${} contains a relative path: '{}'. Please use an absolute path.",
            env::WORKSPACE_REFERENCE,
            reference.display()
        );
    }

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("cannot run in '{}'", dir.display()))?;
    }

    let repo_paths = repo_paths(&cli);

    match cli.command {
        Commands::Init {
            workspace_name,
            add_pkg,
            no_update,
        } => commands::handle_init(&workspace_name, &add_pkg, no_update, repo_paths, cli.jobs),
        Commands::Restore {
            from_workspace,
            workspace_name,
        } => commands::handle_restore(from_workspace, workspace_name),
        command => {
            // Every other command runs against an existing workspace.
            let start =
                std::env::current_dir().context("cannot determine the current directory")?;
            let mut ws = Workspace::find(&start, repo_paths, cli.jobs)?;
            match command {
                Commands::AddPkg { repo } => commands::handle_add_pkg(&mut ws, &repo),
                Commands::UpdatePkg { repo } => commands::handle_update_pkg(&mut ws, &repo),
                Commands::AddDep { pkg, message } => commands::handle_add_dep(&ws, &pkg, message),
                Commands::UpdateDep { pkg, message } => {
                    commands::handle_update_dep(&ws, &pkg, message)
                }
                Commands::Status => commands::handle_status(&ws),
                Commands::Update => commands::handle_update(&mut ws),
                Commands::Inspect { tree, dot } => {
                    if !tree && !dot {
                        anyhow::bail!("`wit inspect` must be run with --tree or --dot");
                    }
                    commands::handle_inspect(&ws, tree, dot)
                }
                Commands::Foreach {
                    continue_on_fail,
                    cmd,
                    args,
                } => commands::handle_foreach(&ws, &cmd, &args, continue_on_fail),
                Commands::Init { .. } | Commands::Restore { .. } => unreachable!("handled above"),
            }
        }
    }
}

fn repo_paths(cli: &Cli) -> Vec<PathBuf> {
    let mut combined = String::new();
    if let Some(prepend) = &cli.prepend_repo_path {
        combined.push_str(prepend);
    }
    if let Some(paths) = &cli.repo_path {
        if !combined.is_empty() {
            combined.push(' ');
        }
        combined.push_str(paths);
    }
    env::split_repo_path(&combined)
}
