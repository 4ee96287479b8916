//! Recreate a workspace from its lock file.
//!
//! A workspace can be restored in the current directory, or in a new one.
//! The manifest and lock are found either in the current directory or in a
//! directory given by `--from-workspace`.

use std::path::PathBuf;

use anyhow::{Context, bail};

use wit::workspace::{self, Workspace};

pub fn handle_restore(
    from_workspace: Option<PathBuf>,
    workspace_name: Option<String>,
) -> anyhow::Result<()> {
    let current_dir = std::env::current_dir().context("cannot determine the current directory")?;
    let mut dest = current_dir.clone();

    if let Some(name) = &workspace_name {
        dest = current_dir.join(name);
        if dest.exists() {
            bail!("new workspace directory [{}] already exists", dest.display());
        }
        log::info!("Creating new workspace [{}]", dest.display());
        std::fs::create_dir(&dest)
            .with_context(|| format!("unable to create [{}]", dest.display()))?;
    }

    let cache = dest.join(workspace::CACHE_DIR);
    if cache.exists() {
        bail!(
            "directory [{}] is already a workspace, contains a {} directory",
            dest.display(),
            workspace::CACHE_DIR
        );
    }
    std::fs::create_dir_all(&cache)
        .with_context(|| format!("failed to create {}", cache.display()))?;

    let lock_dir = from_workspace.unwrap_or(current_dir);
    let manifest_src = lock_dir.join(workspace::MANIFEST_FILE);
    let lock_src = lock_dir.join(workspace::LOCK_FILE);
    if !lock_src.exists() {
        bail!("could not find {}", lock_src.display());
    }
    if !manifest_src.exists() {
        bail!("could not find {}", manifest_src.display());
    }

    if lock_dir != dest {
        std::fs::copy(&manifest_src, dest.join(workspace::MANIFEST_FILE))?;
        std::fs::copy(&lock_src, dest.join(workspace::LOCK_FILE))?;
    }

    Workspace::restore(&dest)?;
    Ok(())
}
