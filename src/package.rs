//! Packages: the chosen identity for a dependency name.
//!
//! Several dependencies of the same name are linked together by one
//! [`Package`]; the resolver decides which of them "wins" and records the
//! result in the lock. A package with `revision == None` is still in its
//! transitive state. Packages live in a [`PackageStore`] arena and are
//! referred to by index, which keeps the dependency/dependent back-references
//! acyclic.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use indexmap::IndexMap;

use crate::dependency::{DepId, Dependency};
use crate::git::{GitError, GitRepo};
use crate::lock::Lock;
use crate::repo_entries::RepoEntry;
use crate::styling::{ADDED, ATTENTION, PENDING};

/// Index of a package in the resolver's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(pub usize);

#[derive(Debug)]
pub struct Package {
    pub name: String,
    /// The chosen source, set when the resolver picks this package's revision.
    pub source: Option<String>,
    /// The chosen 40-char commit; `None` until resolved.
    pub revision: Option<String>,
    /// Local search paths tried before any remote.
    pub repo_paths: Vec<PathBuf>,
    /// On-disk handle; `None` when the repository is missing from disk.
    pub repo: Option<GitRepo>,
    /// Every dependency edge that selected this package.
    pub dependents: Vec<DepId>,
    /// The edge whose pop chose this package's revision.
    pub chosen_by: Option<DepId>,
    /// Whether the checkout lives at the workspace root rather than `.wit`.
    pub in_root: bool,
}

impl Package {
    pub fn new(name: &str, repo_paths: Vec<PathBuf>) -> Self {
        Package {
            name: name.to_string(),
            source: None,
            revision: None,
            repo_paths,
            repo: None,
            dependents: Vec::new(),
            chosen_by: None,
            in_root: false,
        }
    }

    pub fn from_entry(entry: &RepoEntry, repo_paths: Vec<PathBuf>) -> Self {
        Package {
            name: entry.checkout_path.clone(),
            source: entry.remote_url.clone(),
            revision: Some(entry.revision.clone()),
            repo_paths,
            repo: None,
            dependents: Vec::new(),
            chosen_by: None,
            in_root: false,
        }
    }

    /// Project this package into a lock record.
    pub fn to_entry(&self) -> RepoEntry {
        RepoEntry {
            message: None,
            revision: self
                .revision
                .clone()
                .expect("only resolved packages are written to the lock"),
            checkout_path: self.name.clone(),
            remote_url: self.source.clone(),
        }
    }

    pub fn set_source(&mut self, source: Option<&str>) {
        self.source = self.resolve_source(source);
    }

    /// Substitute a local mirror for `candidate`: the first `repo_path/name`
    /// that probes as a repository wins; otherwise the candidate is returned
    /// unchanged.
    pub fn resolve_source(&self, candidate: Option<&str>) -> Option<String> {
        for path in &self.repo_paths {
            let local = path.join(&self.name);
            if GitRepo::is_git_repo(&local) {
                return Some(local.display().to_string());
            }
        }
        candidate.map(str::to_owned)
    }

    /// Connect this package to a git repository on disk.
    ///
    /// The on-disk home is `wsroot/name` when that directory already exists,
    /// otherwise the hidden cache directory. When the repository is absent,
    /// lacks the wanted commit, or the revision is neither a hash nor a tag
    /// (a branch tip may have moved), the repo is downloaded. Without
    /// `download`, `repo` is left `None` as a missing-from-disk marker.
    /// A bad source clears the handle and propagates.
    pub fn load(
        &mut self,
        wsroot: &Path,
        download: bool,
        source: Option<&str>,
        revision: Option<&str>,
    ) -> anyhow::Result<()> {
        let source = self
            .resolve_source(source)
            .or_else(|| self.resolve_source(self.source.as_deref()));
        let revision = revision.map(str::to_owned).or_else(|| self.revision.clone());

        let Some(revision) = revision else {
            bail!("cannot load repo for '{}' without a commit", self.name);
        };
        let Some(source) = source else {
            bail!("cannot load repo for '{}' without a source", self.name);
        };

        // Check if we are already checked out.
        self.in_root = wsroot.join(&self.name).exists();
        let home = if self.in_root {
            wsroot.to_path_buf()
        } else {
            let cache = wsroot.join(crate::workspace::CACHE_DIR);
            if !cache.exists() {
                std::fs::create_dir_all(&cache)
                    .with_context(|| format!("failed to create {}", cache.display()))?;
            }
            cache
        };

        let repo = GitRepo::new(&self.name, &home);
        let needs_download = if !repo.path().exists() || !repo.has_commit(&revision)? {
            true
        } else {
            !(repo.is_hash(&revision)? || repo.is_tag(&revision)?)
        };

        if needs_download {
            if !download {
                self.repo = None;
                return Ok(());
            }
            if let Err(err) = repo.download(&source) {
                let bad_source = matches!(
                    err.downcast_ref::<GitError>(),
                    Some(GitError::BadSource { .. })
                );
                self.repo = if bad_source { None } else { Some(repo) };
                return Err(err);
            }
        }
        self.repo = Some(repo);
        Ok(())
    }

    /// Whether `other_commit` is an ancestor of the chosen revision.
    pub fn is_ancestor(&self, other_commit: &str) -> anyhow::Result<bool> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| anyhow!("package '{}' is not materialized", self.name))?;
        let revision = self
            .revision
            .as_ref()
            .ok_or_else(|| anyhow!("package '{}' has no chosen revision", self.name))?;
        repo.is_ancestor(other_commit, revision)
    }

    /// Whether the specified revisions of all dependents share a common
    /// ancestor. Used to reconcile same-name dependencies from different
    /// sources.
    pub fn dependents_have_common_ancestor(&self, deps: &[Dependency]) -> anyhow::Result<bool> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| anyhow!("package '{}' is not materialized", self.name))?;
        let commits: Vec<&str> = self
            .dependents
            .iter()
            .map(|id| deps[id.0].specified_revision.as_str())
            .collect();
        repo.have_common_ancestor(&commits)
    }

    /// Abbreviated chosen revision: the tag name if tagged, else a short hash.
    pub fn short_revision(&self) -> Option<String> {
        let revision = self.revision.as_ref()?;
        let repo = self.repo.as_ref()?;
        if repo.is_tag(revision).unwrap_or(false) {
            return Some(revision.clone());
        }
        repo.get_shortened_rev(revision).ok()
    }

    /// Display tag, e.g. `chisel::4ee6e4d5`.
    pub fn id(&self) -> String {
        let short = self.short_revision().unwrap_or_else(|| {
            self.revision
                .as_deref()
                .map(|rev| rev.chars().take(8).collect())
                .unwrap_or_else(|| "?".to_string())
        });
        format!("{}::{}", self.name, short)
    }

    /// Move the checkout into the workspace root and check out the chosen
    /// revision. Rewrites origin for cached repositories; repositories the
    /// user already promoted only get a warning.
    pub fn checkout(&mut self, wsroot: &Path) -> anyhow::Result<()> {
        let revision = self
            .revision
            .clone()
            .expect("package resolved before checkout");
        let wanted_origin = self
            .source
            .clone()
            .expect("package source chosen before checkout");

        {
            let repo = self
                .repo
                .as_ref()
                .expect("package materialized before checkout");
            let current_origin = repo.get_remote()?;
            if current_origin != wanted_origin {
                if self.in_root {
                    log::warn!(
                        "Package '{}' wants a different git remote origin.\n\
                         Origin is currently:\n  {current_origin}\n\
                         '{}' wants origin:\n  {wanted_origin}\n\
                         Please manually update the origin with:\n  \
                         git -C {} remote set-url origin {wanted_origin}",
                        self.name,
                        self.name,
                        repo.path().display(),
                    );
                } else {
                    repo.set_origin(&wanted_origin)?;
                }
            }
        }

        if !self.in_root {
            let repo = self.repo.as_mut().expect("checked above");
            let dest = wsroot.join(&self.name);
            std::fs::rename(repo.path(), &dest).with_context(|| {
                format!("failed to move '{}' into the workspace root", self.name)
            })?;
            repo.move_to_root(wsroot);
            self.in_root = true;
        }

        self.repo
            .as_ref()
            .expect("checked above")
            .checkout(&revision)
    }

    /// What `update` would do to this package, relative to the lock.
    pub fn status_annotation(&self, lock: &Lock) -> Option<String> {
        if lock.contains(&self.name) {
            let repo = self.repo.as_ref()?;
            let revision = self.revision.as_ref()?;
            let head = repo.get_head_commit().ok()?;
            if head != *revision {
                let short = self.short_revision().unwrap_or_else(|| revision.clone());
                return Some(format!("{PENDING}(will be checked out to {short}){PENDING:#}"));
            }
            None
        } else if !self.in_root {
            Some(format!("{ADDED}(will be added to workspace and lockfile){ADDED:#}"))
        } else {
            Some(format!("{ATTENTION}(will be added to lockfile){ATTENTION:#}"))
        }
    }
}

/// Arena of packages, addressed by [`PackageId`] and by name.
///
/// Iteration follows first-encounter order, which keeps checkout, lock
/// projection, and status output deterministic.
#[derive(Debug, Default)]
pub struct PackageStore {
    packages: Vec<Package>,
    by_name: IndexMap<String, PackageId>,
}

impl PackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from lock entries so operations against an existing
    /// workspace reuse the recorded source and revision.
    pub fn from_lock(lock: &Lock, repo_paths: &[PathBuf]) -> Self {
        let mut store = Self::new();
        for entry in lock.entries() {
            let id = PackageId(store.packages.len());
            store.by_name.insert(entry.checkout_path.clone(), id);
            store
                .packages
                .push(Package::from_entry(entry, repo_paths.to_vec()));
        }
        store
    }

    pub fn get_or_insert(&mut self, name: &str, repo_paths: &[PathBuf]) -> PackageId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = PackageId(self.packages.len());
        self.by_name.insert(name.to_string(), id);
        self.packages.push(Package::new(name, repo_paths.to_vec()));
        id
    }

    pub fn lookup(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub fn get_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    /// Take a package out for a parallel load, leaving a placeholder.
    pub(crate) fn take(&mut self, id: PackageId) -> Package {
        let name = self.packages[id.0].name.clone();
        std::mem::replace(&mut self.packages[id.0], Package::new(&name, Vec::new()))
    }

    pub(crate) fn put_back(&mut self, id: PackageId, package: Package) {
        self.packages[id.0] = package;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.packages.iter_mut()
    }

    /// Packages with a chosen revision, in first-encounter order.
    pub fn chosen(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(|pkg| pkg.revision.is_some())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_reuses_packages_by_name() {
        let mut store = PackageStore::new();
        let a = store.get_or_insert("a", &[]);
        let b = store.get_or_insert("b", &[]);
        assert_ne!(a, b);
        assert_eq!(store.get_or_insert("a", &[]), a);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("b"), Some(b));
        assert_eq!(store.lookup("c"), None);
    }

    #[test]
    fn resolve_source_falls_back_to_the_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        // No repo at tmp/pkg, so the candidate survives.
        let package = Package::new("pkg", vec![tmp.path().to_path_buf()]);
        assert_eq!(
            package.resolve_source(Some("https://host/pkg.git")),
            Some("https://host/pkg.git".to_string())
        );
        assert_eq!(package.resolve_source(None), None);
    }

    #[test]
    fn lock_entry_round_trip() {
        let entry = RepoEntry {
            message: None,
            revision: "a".repeat(40),
            checkout_path: "pkg".to_string(),
            remote_url: Some("/srv/git/pkg".to_string()),
        };
        let package = Package::from_entry(&entry, vec![]);
        assert_eq!(package.to_entry(), entry);
    }
}
