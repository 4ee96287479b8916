//! Package-manifest edits: add-dep and update-dep.
//!
//! Both run against the package containing the current working directory,
//! which must be a direct child of the workspace root and present in the
//! lock. Packages that declare dependencies through git submodules only are
//! refused, since their declaration is not a manifest wit can edit.

use std::path::{Path, PathBuf};

use anyhow::Context;

use wit::dependency::parse_tag;
use wit::git;
use wit::manifest::Manifest;
use wit::package::PackageStore;
use wit::workspace::{Workspace, WorkspaceError};

pub fn handle_add_dep(ws: &Workspace, tag: &str, message: Option<String>) -> anyhow::Result<()> {
    let (source, revision) = parse_tag(tag);
    let mut dep = ws.dependency_from_tag(&source, revision, message)?;

    let (pkg_name, pkg_dir) = package_from_cwd(ws, "add-dep")?;
    if !ws.lock.contains(&pkg_name) {
        return Err(WorkspaceError::NotAPackage {
            name: pkg_name,
            root: ws.root.clone(),
        }
        .into());
    }

    // Bind the dependency to disk (cloning into the cache if necessary) so
    // the revision can be resolved before anything is written.
    let mut store = PackageStore::from_lock(&ws.lock, &ws.repo_paths);
    ws.bind_dependency(&mut dep, &mut store, true)?;
    let resolved = dep.resolved(&store)?;
    let package_id = dep.package.expect("bound above");
    store.get_mut(package_id).revision = Some(resolved.specified_revision.clone());

    check_submodule_only(&pkg_name, &pkg_dir)?;

    let manifest_path = pkg_dir.join(git::PKG_MANIFEST_FILE);
    let mut manifest = Manifest::read_or_empty(&manifest_path)?;
    if manifest.contains_dependency(&dep.name) {
        return Err(WorkspaceError::AlreadyDepends {
            package: pkg_name,
            dependency: dep.name,
        }
        .into());
    }

    manifest.add_dependency(resolved);
    manifest.write(&manifest_path)?;

    log::info!("'{}' now depends on '{}'", pkg_name, store.get(package_id).id());
    Ok(())
}

pub fn handle_update_dep(ws: &Workspace, tag: &str, message: Option<String>) -> anyhow::Result<()> {
    let (source, revision) = parse_tag(tag);
    let mut dep = ws.dependency_from_tag(&source, revision, message)?;

    let (pkg_name, pkg_dir) = package_from_cwd(ws, "update-dep")?;
    check_submodule_only(&pkg_name, &pkg_dir)?;

    let manifest_path = pkg_dir.join(git::PKG_MANIFEST_FILE);
    let mut manifest = Manifest::read_or_empty(&manifest_path)?;
    if !manifest.contains_dependency(&dep.name) {
        return Err(WorkspaceError::DoesNotDepend {
            package: pkg_name,
            dependency: dep.name,
        }
        .into());
    }

    let mut store = PackageStore::from_lock(&ws.lock, &ws.repo_paths);
    ws.bind_dependency(&mut dep, &mut store, true)?;
    let package_id = dep.package.expect("bound above");
    if store.get(package_id).repo.is_none() {
        return Err(WorkspaceError::DepNotFetched { name: dep.name }.into());
    }

    let resolved = dep.resolved(&store)?;
    store.get_mut(package_id).revision = Some(resolved.specified_revision.clone());

    log::info!("Updating to {}", resolved.specified_revision);
    manifest.replace_dependency(resolved);
    manifest.write(&manifest_path)?;

    log::info!("'{}' now depends on '{}'", pkg_name, store.get(package_id).id());
    Ok(())
}

/// The package the current working directory belongs to, as (name, root dir).
fn package_from_cwd(ws: &Workspace, command: &'static str) -> anyhow::Result<(String, PathBuf)> {
    let cwd = dunce::canonicalize(
        std::env::current_dir().context("cannot determine the current directory")?,
    )?;
    let root = dunce::canonicalize(&ws.root)?;

    if cwd == root {
        return Err(WorkspaceError::RunInPackage { command }.into());
    }
    let name = cwd
        .strip_prefix(&root)
        .ok()
        .and_then(|relative| relative.components().next())
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .ok_or(WorkspaceError::RunInPackage { command })?;

    let dir = root.join(&name);
    Ok((name, dir))
}

/// Refuse to modify dependencies of repositories that only use git submodules.
fn check_submodule_only(name: &str, dir: &Path) -> anyhow::Result<()> {
    let manifest = dir.join(git::PKG_MANIFEST_FILE);
    let submodules = dir.join(git::SUBMODULE_FILE);
    if !manifest.exists() && submodules.exists() {
        return Err(WorkspaceError::SubmoduleOnly {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}
