//! The resolver: time-ordered, single-version-per-name selection.
//!
//! Every dependency edge carries the committer time of its specified
//! revision. The frontier is kept sorted ascending and popped from the back,
//! so the newest edge always wins a name first; any later pop for that name
//! is older, and is consistent exactly when it asks for an ancestor of the
//! existing choice. Two invariants are enforced along the way:
//!
//! - ancestry: an older edge must point at an ancestor of the chosen commit;
//! - age: a child edge must not be newer than the manifest that declared it.
//!
//! Violations are accumulated, not thrown: the caller gets the full set of
//! graph conflicts at once and must refuse to check out when any exist.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use rayon::prelude::*;

use crate::dependency::{DepId, Dependency};
use crate::package::{Package, PackageId, PackageStore};
use crate::workspace::Workspace;

/// A graph conflict found during resolution.
///
/// These are accumulated in [`Resolution::errors`]; any entry makes the
/// result non-actionable.
#[derive(Debug)]
pub enum ResolutionError {
    /// Two dependents pin incompatible commits of the same name: the older
    /// request is not an ancestor of the newer choice.
    NotAncestor {
        name: String,
        chosen_parent: String,
        chosen_tag: String,
        loser_parent: String,
        loser_tag: String,
    },
    /// A child edge is newer than the manifest commit that declared it.
    DependeeNewerThanDepender { parent: String, child: String },
    /// The same name is requested from different sources whose dependent
    /// revisions share no common ancestor.
    SourceConflict {
        name: String,
        first: String,
        second: String,
    },
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::NotAncestor {
                name,
                chosen_parent,
                chosen_tag,
                loser_parent,
                loser_tag,
            } => write!(
                f,
                "ancestry error: '{chosen_parent}' and '{loser_parent}' both depend on '{name}':\n    \
                 {chosen_parent} depends on {chosen_tag}\n    \
                 {loser_parent} depends on {loser_tag}\n\
                 Although {chosen_tag} is newer than {loser_tag}, it is not a descendant of it,\n\
                 so the dependee needed by {loser_parent} may not be satisfied by {chosen_tag}."
            ),
            ResolutionError::DependeeNewerThanDepender { parent, child } => write!(
                f,
                "'{child}' was committed after its depender '{parent}'; \
                 a dependee must not be newer than the packages that depend on it"
            ),
            ResolutionError::SourceConflict { name, first, second } => write!(
                f,
                "dependency '{name}' has multiple conflicting sources:\n  {first}\n  {second}"
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// The outcome of a resolve: one chosen package per reachable name, plus the
/// arena of dependency edges (kept for error reporting and `inspect`) and any
/// accumulated graph conflicts.
#[derive(Debug)]
pub struct Resolution {
    pub store: PackageStore,
    pub deps: Vec<Dependency>,
    pub errors: Vec<ResolutionError>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub(crate) fn resolve(ws: &Workspace, download: bool) -> anyhow::Result<Resolution> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ws.jobs.unwrap_or(0))
        .build()
        .context("failed to build the clone worker pool")?;

    let mut resolver = Resolver {
        wsroot: ws.root.clone(),
        repo_paths: ws.repo_paths.clone(),
        download,
        pool,
        store: PackageStore::new(),
        deps: Vec::new(),
        source_map: HashMap::new(),
        frontier: Vec::new(),
        errors: Vec::new(),
    };

    // The workspace manifest is the root node: same expansion path as package
    // manifests, but with no parent and therefore no age check.
    resolver.expand(None, None, ws.manifest.dependencies.clone())?;

    while let Some((commit_time, dep_id)) = resolver.frontier.pop() {
        resolver.step(commit_time, dep_id)?;
    }

    resolver.warn_diverged()?;

    Ok(Resolution {
        store: resolver.store,
        deps: resolver.deps,
        errors: resolver.errors,
    })
}

struct Resolver {
    wsroot: PathBuf,
    repo_paths: Vec<PathBuf>,
    download: bool,
    pool: rayon::ThreadPool,
    store: PackageStore,
    deps: Vec<Dependency>,
    /// First-seen resolved source per name, for conflict detection.
    source_map: HashMap<String, String>,
    /// `(commit_time, edge)`, sorted ascending and popped from the back.
    frontier: Vec<(i64, DepId)>,
    errors: Vec<ResolutionError>,
}

impl Resolver {
    /// Handle the newest remaining edge: either verify it against an existing
    /// choice, or make it the choice and expand its manifest.
    fn step(&mut self, commit_time: i64, dep_id: DepId) -> anyhow::Result<()> {
        log::debug!("{} {}", commit_time, self.deps[dep_id.0].tag(&self.store));
        let package_id = self.deps[dep_id.0]
            .package
            .expect("popped dependencies are bound");

        if self.store.get(package_id).revision.is_some() {
            let consistent = self
                .store
                .get(package_id)
                .is_ancestor(&self.deps[dep_id.0].specified_revision)?;
            if !consistent {
                let err = self.not_ancestor(package_id, dep_id);
                self.errors.push(err);
            }
            return Ok(());
        }

        let resolved = self.deps[dep_id.0].resolved_rev(&self.store)?;
        {
            let source = self.deps[dep_id.0].source.clone();
            let package = self.store.get_mut(package_id);
            package.revision = Some(resolved.clone());
            package.chosen_by = Some(dep_id);
            package.set_source(source.as_deref());
        }

        let entries = {
            let package = self.store.get(package_id);
            let repo = package
                .repo
                .as_ref()
                .expect("chosen packages are materialized");
            repo.repo_entries_from_commit(&resolved)?
        };
        let children: Vec<Dependency> = entries.iter().map(Dependency::from_entry).collect();
        self.expand(Some(package_id), Some(commit_time), children)
    }

    /// Bind, materialize, check, and enqueue one batch of edges.
    fn expand(
        &mut self,
        parent: Option<PackageId>,
        parent_time: Option<i64>,
        children: Vec<Dependency>,
    ) -> anyhow::Result<()> {
        if children.is_empty() {
            return Ok(());
        }
        if let Some(parent) = parent {
            let names: Vec<&str> = children.iter().map(|dep| dep.name.as_str()).collect();
            log::debug!(
                "Dependencies of [{}]: [{}]",
                self.store.get(parent).name,
                names.join(", ")
            );
        }

        let mut batch = Vec::with_capacity(children.len());
        for mut dep in children {
            dep.parent = parent;
            let package_id = self.store.get_or_insert(&dep.name, &self.repo_paths);
            dep.package = Some(package_id);
            let dep_id = DepId(self.deps.len());
            self.deps.push(dep);
            self.store.get_mut(package_id).dependents.push(dep_id);
            batch.push(dep_id);
        }

        self.materialize(&batch)?;

        for &dep_id in &batch {
            let (package_id, name, source) = {
                let dep = &self.deps[dep_id.0];
                (
                    dep.package.expect("bound above"),
                    dep.name.clone(),
                    dep.source.clone(),
                )
            };

            // Same name from a different source is acceptable only when every
            // dependent's revision still shares a common ancestor (the
            // sources are mirrors of one history).
            if let Some(resolved_source) =
                self.store.get(package_id).resolve_source(source.as_deref())
            {
                let existing = self.source_map.get(&name).cloned();
                if let Some(existing) = existing
                    && existing != resolved_source
                {
                    let package = self.store.get(package_id);
                    let reconciled = package.repo.is_some()
                        && package.dependents_have_common_ancestor(&self.deps)?;
                    if !reconciled {
                        self.errors.push(ResolutionError::SourceConflict {
                            name,
                            first: existing,
                            second: resolved_source,
                        });
                        continue;
                    }
                }
                self.source_map.insert(name, resolved_source);
            }

            if self.store.get(package_id).repo.is_none() {
                // Missing from disk (download disabled); nothing to order or
                // expand for this edge.
                continue;
            }

            let commit_time = self.deps[dep_id.0].commit_time(&self.store)?;
            if let Some(parent_time) = parent_time
                && commit_time > parent_time
            {
                let err = self.dependee_newer(dep_id);
                self.errors.push(err);
                continue;
            }
            self.frontier.push((commit_time, dep_id));
        }

        // Stable ascending sort: the newest edge pops first, and equal times
        // pop in a deterministic (reverse insertion) order.
        self.frontier.sort_by_key(|&(commit_time, _)| commit_time);
        Ok(())
    }

    /// Clone/fetch one batch on the worker pool.
    ///
    /// Workers own their package while they touch the network and the disk;
    /// the shared store is mutated only on this thread after the join, and
    /// worker failures are surfaced together once the pool drains.
    fn materialize(&mut self, batch: &[DepId]) -> anyhow::Result<()> {
        let mut jobs = Vec::with_capacity(batch.len());
        for &dep_id in batch {
            let dep = &self.deps[dep_id.0];
            let package_id = dep.package.expect("bound above");
            let package = self.store.take(package_id);
            jobs.push((
                package_id,
                package,
                dep.source.clone(),
                dep.specified_revision.clone(),
            ));
        }

        let wsroot = self.wsroot.clone();
        let download = self.download;
        let results: Vec<(PackageId, Package, anyhow::Result<()>)> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|(package_id, mut package, source, revision)| {
                    let result =
                        package.load(&wsroot, download, source.as_deref(), Some(&revision));
                    (package_id, package, result)
                })
                .collect()
        });

        let mut failures = Vec::new();
        for (package_id, package, result) in results {
            self.store.put_back(package_id, package);
            if let Err(err) = result {
                failures.push(err);
            }
        }
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.pop().expect("length checked")),
            _ => {
                let details: Vec<String> =
                    failures.iter().map(|err| format!("  {err:#}")).collect();
                bail!(
                    "{} packages failed to materialize:\n{}",
                    failures.len(),
                    details.join("\n")
                )
            }
        }
    }

    fn not_ancestor(&self, package_id: PackageId, loser: DepId) -> ResolutionError {
        let package = self.store.get(package_id);
        let chosen = package.chosen_by.expect("chosen packages record their edge");
        ResolutionError::NotAncestor {
            name: package.name.clone(),
            chosen_parent: self.parent_label(chosen),
            chosen_tag: self.deps[chosen.0].tag(&self.store),
            loser_parent: self.parent_label(loser),
            loser_tag: self.deps[loser.0].tag(&self.store),
        }
    }

    fn dependee_newer(&self, dep_id: DepId) -> ResolutionError {
        let dep = &self.deps[dep_id.0];
        ResolutionError::DependeeNewerThanDepender {
            parent: self.parent_label(dep_id),
            child: dep.tag(&self.store),
        }
    }

    fn parent_label(&self, dep_id: DepId) -> String {
        match self.deps[dep_id.0].parent {
            Some(parent) => self.store.get(parent).id(),
            None => "[root]".to_string(),
        }
    }

    /// One warning per root-checked-out package whose working tree disagrees
    /// with the resolution. The committed manifest stays the truth either way.
    fn warn_diverged(&self) -> anyhow::Result<()> {
        for package in self.store.iter() {
            let Some(repo) = &package.repo else { continue };
            if !package.in_root {
                continue;
            }
            let Some(revision) = &package.revision else {
                continue;
            };
            if repo.get_head_commit()? != *revision {
                log::warn!(
                    "using '{}' manifest instead of checked-out version of '{}'",
                    package.id(),
                    package.name
                );
                continue;
            }
            if repo.modified_manifest()? {
                log::warn!(
                    "disregarding uncommitted changes to the '{}' manifest",
                    package.name
                );
            }
        }
        Ok(())
    }
}
