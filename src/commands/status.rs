//! Workspace status: classify locked packages, list untracked repositories,
//! and annotate what an update would change.

use std::collections::HashSet;
use std::path::PathBuf;

use wit::git::GitRepo;
use wit::workspace::{self, Workspace};

use crate::commands::{SilentExit, report_errors};

pub fn handle_status(ws: &Workspace) -> anyhow::Result<()> {
    log::debug!("Checking workspace status");
    if ws.lock.is_empty() {
        log::info!("{} is empty. Have you run `wit update`?", workspace::LOCK_FILE);
        return Ok(());
    }

    let mut clean = Vec::new();
    let mut dirty = Vec::new();
    let mut missing = Vec::new();
    let mut seen_paths: HashSet<PathBuf> = HashSet::new();

    for mut package in ws.lock.packages(&ws.repo_paths) {
        package.load(&ws.root, false, None, None)?;
        let Some(repo) = &package.repo else {
            missing.push(package);
            continue;
        };
        seen_paths.insert(repo.path().to_path_buf());

        let lock_commit = package
            .revision
            .clone()
            .expect("lock entries carry a revision");
        let new_commits = lock_commit != repo.get_head_commit()?;

        if new_commits || !repo.clean()? {
            let mut flags = Vec::new();
            if new_commits {
                flags.push("new commits");
            }
            if repo.modified()? {
                flags.push("modified content");
            }
            if repo.untracked()? {
                flags.push("untracked content");
            }
            dirty.push((package, flags));
        } else {
            clean.push(package);
        }
    }

    // Repositories at the root that the lock does not know about.
    let mut untracked = Vec::new();
    for entry in std::fs::read_dir(&ws.root)? {
        let path = entry?.path();
        if seen_paths.contains(&path) || !path.is_dir() {
            continue;
        }
        if GitRepo::is_git_repo(&path) {
            untracked.push(path);
        }
    }

    println!("Clean packages:");
    for package in &clean {
        println!("    {}", package.name);
    }
    println!("Dirty packages:");
    for (package, flags) in &dirty {
        println!("    {} ({})", package.name, flags.join(", "));
    }
    if !untracked.is_empty() {
        println!("Untracked packages:");
        for path in &untracked {
            let relative = path.strip_prefix(&ws.root).unwrap_or(path);
            println!("    {}", relative.display());
        }
    }
    if !missing.is_empty() {
        println!("Missing packages:");
        for package in &missing {
            println!("    {}", package.name);
        }
    }

    // A dry resolve shows what `wit update` would change.
    let resolution = ws.resolve(false)?;
    for package in resolution.store.chosen() {
        if let Some(annotation) = package.status_annotation(&ws.lock) {
            println!("{} {}", package.name, annotation);
        }
    }

    if !resolution.is_clean() {
        report_errors(&resolution.errors);
        return Err(SilentExit { code: 1 }.into());
    }
    Ok(())
}
