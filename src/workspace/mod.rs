//! The workspace: a root directory with a manifest, a lock file, a hidden
//! cache of not-yet-promoted repositories, and one checked-out subdirectory
//! per resolved package.

pub mod resolve;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::dependency::Dependency;
use crate::git::GitRepo;
use crate::lock::Lock;
use crate::manifest::Manifest;
use crate::package::PackageStore;

pub use resolve::{Resolution, ResolutionError};

/// Workspace manifest at the root.
pub const MANIFEST_FILE: &str = "wit-workspace.json";

/// Full resolution snapshot at the root.
pub const LOCK_FILE: &str = "wit-lock.json";

/// Hidden cache directory for repositories that are depended upon but not yet
/// promoted to a workspace-root checkout.
pub const CACHE_DIR: &str = ".wit";

/// User errors from workspace operations, printed without a backtrace.
#[derive(Debug)]
pub enum WorkspaceError {
    NotFound { start: PathBuf },
    ManifestExists { path: PathBuf },
    AlreadyContains { name: String },
    NotInWorkspaceManifest { name: String },
    UpdateTargetMissing { name: String, in_lock: bool },
    RunInPackage { command: &'static str },
    NotAPackage { name: String, root: PathBuf },
    SubmoduleOnly { name: String },
    AlreadyDepends { package: String, dependency: String },
    DoesNotDepend { package: String, dependency: String },
    DepNotFetched { name: String },
}

impl std::fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceError::NotFound { start } => {
                write!(
                    f,
                    "unable to find a workspace above [{}]. Cannot continue.",
                    start.display()
                )
            }
            WorkspaceError::ManifestExists { path } => {
                write!(f, "manifest file [{}] already exists", path.display())
            }
            WorkspaceError::AlreadyContains { name } => {
                write!(f, "manifest already contains package '{name}'")
            }
            WorkspaceError::NotInWorkspaceManifest { name } => {
                write!(
                    f,
                    "package '{name}' is not in {MANIFEST_FILE}\n\
                     Did you mean to run 'wit add-pkg' or 'wit update-dep'?"
                )
            }
            WorkspaceError::UpdateTargetMissing { name, in_lock } => {
                if *in_lock {
                    write!(
                        f,
                        "cannot update package '{name}':\n\
                         Although '{name}' exists (according to {LOCK_FILE}), \
                         it has not been cloned to the root workspace."
                    )
                } else {
                    write!(
                        f,
                        "cannot update package '{name}' because it does not exist in the workspace"
                    )
                }
            }
            WorkspaceError::RunInPackage { command } => {
                write!(
                    f,
                    "{command} must be run inside of a package, not the workspace root"
                )
            }
            WorkspaceError::NotAPackage { name, root } => {
                write!(
                    f,
                    "'{name}' is not a package in workspace at '{}'",
                    root.display()
                )
            }
            WorkspaceError::SubmoduleOnly { name } => {
                write!(f, "{name} uses git submodules to specify dependencies")
            }
            WorkspaceError::AlreadyDepends { package, dependency } => {
                write!(f, "'{package}' already depends on '{dependency}'")
            }
            WorkspaceError::DoesNotDepend { package, dependency } => {
                write!(f, "'{package}' does not depend on '{dependency}'")
            }
            WorkspaceError::DepNotFetched { name } => {
                write!(f, "'{name}' not found in workspace. Have you run 'wit update'?")
            }
        }
    }
}

impl std::error::Error for WorkspaceError {}

#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub repo_paths: Vec<PathBuf>,
    pub manifest: Manifest,
    pub lock: Lock,
    /// Worker-pool size for parallel clone/fetch; `None` uses one per core.
    pub jobs: Option<usize>,
}

impl Workspace {
    /// Open an existing workspace rooted at `root`.
    pub fn open(
        root: PathBuf,
        repo_paths: Vec<PathBuf>,
        jobs: Option<usize>,
    ) -> anyhow::Result<Self> {
        let manifest = Manifest::read(&Self::manifest_path_in(&root))?;
        let lock = Lock::read(&Self::lockfile_path_in(&root))?;
        Ok(Workspace {
            root,
            repo_paths,
            manifest,
            lock,
            jobs,
        })
    }

    /// Create a workspace at `parent/name` with empty manifest and lock.
    ///
    /// An existing directory is reused, but an existing manifest is refused.
    /// The cache directory is recreated from scratch: on an explicit re-init
    /// the user wants a clean slate, not stale cached repositories.
    pub fn create(
        parent: &Path,
        name: &str,
        repo_paths: Vec<PathBuf>,
        jobs: Option<usize>,
    ) -> anyhow::Result<Self> {
        let root = parent.join(name);
        let manifest_path = Self::manifest_path_in(&root);
        if root.exists() {
            log::info!("Using existing directory [{}]", root.display());
            if manifest_path.exists() {
                return Err(WorkspaceError::ManifestExists {
                    path: manifest_path,
                }
                .into());
            }
        } else {
            log::info!("Creating new workspace [{}]", root.display());
            std::fs::create_dir_all(&root)
                .with_context(|| format!("unable to create workspace [{}]", root.display()))?;
        }

        let cache = root.join(CACHE_DIR);
        if cache.exists() {
            std::fs::remove_dir_all(&cache)
                .with_context(|| format!("failed to clear {}", cache.display()))?;
        }
        std::fs::create_dir(&cache)
            .with_context(|| format!("failed to create {}", cache.display()))?;

        Manifest::default().write(&manifest_path)?;
        Lock::default().write(&Self::lockfile_path_in(&root))?;

        Self::open(root, repo_paths, jobs)
    }

    /// Walk up from `start` to the first directory containing a workspace
    /// manifest.
    pub fn find(
        start: &Path,
        repo_paths: Vec<PathBuf>,
        jobs: Option<usize>,
    ) -> anyhow::Result<Self> {
        let start = dunce::canonicalize(start)
            .with_context(|| format!("cannot resolve '{}'", start.display()))?;
        for dir in start.ancestors() {
            let manifest_path = Self::manifest_path_in(dir);
            log::debug!("Checking [{}]", manifest_path.display());
            if manifest_path.is_file() {
                log::debug!("Found workspace at [{}]", dir.display());
                return Self::open(dir.to_path_buf(), repo_paths, jobs);
            }
        }
        Err(WorkspaceError::NotFound { start }.into())
    }

    /// Clone and check out every lock entry as-is, ignoring the manifest.
    ///
    /// This is a one-shot fan-out bounded by the lock size, so each package
    /// gets its own thread. Failures are collected and reported together;
    /// any failure is fatal.
    pub fn restore(root: &Path) -> anyhow::Result<Self> {
        let ws = Self::open(root.to_path_buf(), Vec::new(), None)?;
        let mut packages = ws.lock.packages(&[]);

        let errors: Vec<anyhow::Error> = std::thread::scope(|scope| {
            let handles: Vec<_> = packages
                .iter_mut()
                .map(|package| {
                    scope.spawn(move || -> anyhow::Result<()> {
                        package.load(root, true, None, None)?;
                        package.checkout(root)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().expect("restore worker panicked").err())
                .collect()
        });

        if !errors.is_empty() {
            for err in &errors {
                log::error!("Unable to restore workspace [{}]: {err:#}", root.display());
            }
            bail!(
                "failed to restore {} of {} packages",
                errors.len(),
                ws.lock.entries().len()
            );
        }
        Ok(ws)
    }

    pub fn manifest_path(&self) -> PathBuf {
        Self::manifest_path_in(&self.root)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        Self::lockfile_path_in(&self.root)
    }

    fn manifest_path_in(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    fn lockfile_path_in(root: &Path) -> PathBuf {
        root.join(LOCK_FILE)
    }

    /// Resolve the dependency graph. With `download`, repositories are cloned
    /// or fetched as needed; without it, missing repositories are recorded
    /// but left on the side.
    pub fn resolve(&self, download: bool) -> anyhow::Result<Resolution> {
        resolve::resolve(self, download)
    }

    /// Promote every chosen package into the root, check out its revision,
    /// and rewrite the lock to cover exactly these packages.
    ///
    /// Callers must refuse to get here when the resolution carries errors.
    pub fn checkout(&mut self, resolution: &mut Resolution) -> anyhow::Result<()> {
        for package in resolution.store.iter_mut() {
            if package.revision.is_none() {
                continue;
            }
            package.checkout(&self.root)?;
        }
        let lock = Lock::from_packages(resolution.store.chosen());
        lock.write(&self.lockfile_path())?;
        self.lock = lock;
        Ok(())
    }

    /// Bind a dependency to a package in `store`, creating it if first seen,
    /// and connect the package to disk.
    pub fn bind_dependency(
        &self,
        dep: &mut Dependency,
        store: &mut PackageStore,
        download: bool,
    ) -> anyhow::Result<()> {
        let package_id = store.get_or_insert(&dep.name, &self.repo_paths);
        dep.package = Some(package_id);
        let source = dep.source.clone();
        let revision = dep.specified_revision.clone();
        store
            .get_mut(package_id)
            .load(&self.root, download, source.as_deref(), Some(&revision))
    }

    /// Resolve a dependency and append it to the workspace manifest.
    ///
    /// The lock is left alone; the user runs `wit update` to act on it.
    pub fn add_dependency(&mut self, source: &str, revision: Option<String>) -> anyhow::Result<()> {
        let mut dep = self.dependency_from_tag(source, revision, None)?;
        if self.manifest.contains_dependency(&dep.name) {
            return Err(WorkspaceError::AlreadyContains { name: dep.name }.into());
        }

        let mut store = PackageStore::from_lock(&self.lock, &self.repo_paths);
        self.bind_dependency(&mut dep, &mut store, true)?;
        let resolved = dep.resolved(&store)?;
        let package_id = dep.package.expect("bound above");
        store.get_mut(package_id).revision = Some(resolved.specified_revision.clone());

        self.manifest.add_dependency(resolved);
        log::debug!("my manifest path = {}", self.manifest_path().display());
        self.manifest.write(&self.manifest_path())?;

        log::info!("The workspace now depends on '{}'", store.get(package_id).id());
        Ok(())
    }

    /// Replace an existing workspace-manifest entry with a newly resolved
    /// revision, warning when nothing actually changes.
    pub fn update_dependency(
        &mut self,
        source: &str,
        revision: Option<String>,
    ) -> anyhow::Result<()> {
        let mut requested = self.dependency_from_tag(source, revision, None)?;

        let Some(existing) = self.manifest.get_dependency(&requested.name) else {
            return Err(WorkspaceError::NotInWorkspaceManifest {
                name: requested.name,
            }
            .into());
        };
        let mut existing = existing.clone();

        let mut store = PackageStore::from_lock(&self.lock, &self.repo_paths);
        self.bind_dependency(&mut requested, &mut store, true)?;
        self.bind_dependency(&mut existing, &mut store, true)?;

        let package_id = requested.package.expect("bound above");
        if store.get(package_id).repo.is_none() {
            return Err(WorkspaceError::UpdateTargetMissing {
                in_lock: self.lock.contains(&requested.name),
                name: requested.name,
            }
            .into());
        }

        let resolved = requested.resolved(&store)?;
        store.get_mut(package_id).revision = Some(resolved.specified_revision.clone());

        if existing.resolved_rev(&store)? == resolved.specified_revision {
            log::warn!(
                "Updating '{}' to the same revision it already is!",
                requested.name
            );
        }

        self.manifest.replace_dependency(resolved.clone());
        self.manifest.write(&self.manifest_path())?;

        log::info!("The workspace now depends on '{}'", store.get(package_id).id());

        let locked = self
            .lock
            .get(&requested.name)
            .map(|entry| entry.revision.as_str());
        if locked != Some(resolved.specified_revision.as_str()) {
            log::info!("Don't forget to run 'wit update'!");
        }
        Ok(())
    }

    /// Turn a CLI `source[::revision]` tag into a dependency, substituting
    /// the origin URL when the source names a repository already present in
    /// the workspace (or its cache), and canonicalizing filesystem paths.
    pub fn dependency_from_tag(
        &self,
        source: &str,
        revision: Option<String>,
        message: Option<String>,
    ) -> anyhow::Result<Dependency> {
        let cache_dir = self.root.join(CACHE_DIR);
        let root_child = self.root.join(source);
        let cache_child = cache_dir.join(source);
        let basename = root_child
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string());

        let source = if root_child.exists() && root_child.parent() == Some(self.root.as_path()) {
            GitRepo::new(&basename, &self.root).get_remote()?
        } else if cache_child.exists() && cache_child.parent() == Some(cache_dir.as_path()) {
            GitRepo::new(&basename, &cache_dir).get_remote()?
        } else if root_child.exists() {
            dunce::canonicalize(&root_child)?.display().to_string()
        } else if Path::new(source).exists() {
            dunce::canonicalize(source)?.display().to_string()
        } else {
            source.to_string()
        };

        Ok(Dependency::new(None, Some(source), revision, message))
    }
}
