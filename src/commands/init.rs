//! Workspace creation.

use std::path::PathBuf;

use anyhow::Context;

use wit::dependency::parse_tag;
use wit::workspace::Workspace;

use crate::commands::handle_update;

pub fn handle_init(
    name: &str,
    add_pkg: &[String],
    no_update: bool,
    repo_paths: Vec<PathBuf>,
    jobs: Option<usize>,
) -> anyhow::Result<()> {
    let parent = std::env::current_dir().context("cannot determine the current directory")?;
    let mut ws = Workspace::create(&parent, name, repo_paths, jobs)?;

    for tag in add_pkg {
        let (source, revision) = parse_tag(tag);
        ws.add_dependency(&source, revision)?;
    }

    if !no_update {
        handle_update(&mut ws)?;
    }
    Ok(())
}
