//! Git repository abstraction.
//!
//! [`GitRepo`] wraps the external `git` tool with the operations the resolver
//! needs: probing, cloning (with an optional local reference cache), fetching,
//! ref resolution, ancestry tests, reading a manifest at a specific commit,
//! and checkout. There can be multiple `GitRepo` values for the same on-disk
//! repository, and a value may be out of sync with the filesystem.
//!
//! All subprocess invocations are synchronous; concurrency is provided above
//! this layer. Pure lookups are memoized, keyed on hashes already seen by a
//! successful resolve (anything else, like a branch tip, may move).

use std::collections::HashSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;

use anyhow::Context;
use dashmap::DashMap;

use crate::env;
use crate::repo_entries::{FormatError, RepoEntry};

mod parse;

/// Per-package dependency manifest, read from commits and the working tree.
pub const PKG_MANIFEST_FILE: &str = "wit-manifest.json";

/// Fallback dependency declaration for submodule-based repositories.
pub const SUBMODULE_FILE: &str = ".gitmodules";

/// The signal git prints when a ref cannot be resolved at all.
const UNKNOWN_REVISION: &str = "unknown revision or path not in the working tree";

/// Structured failures from the git layer.
///
/// `CommandFailed` retains everything needed to reproduce the invocation.
/// `BadSource` and `CommitNotFound` are user errors: callers downcast to them
/// to produce short messages without a backtrace.
#[derive(Debug)]
pub enum GitError {
    CommandFailed {
        command: String,
        cwd: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    BadSource {
        name: String,
        source: String,
    },
    CommitNotFound {
        name: String,
        revision: String,
    },
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::CommandFailed {
                command,
                cwd,
                code,
                stdout,
                stderr,
            } => {
                let status = match code {
                    Some(code) => format!("exit status [{code}]"),
                    None => "termination by signal".to_string(),
                };
                write!(
                    f,
                    "command [{command}] in [{}] failed with {status}\nstdout: [{stdout}]\nstderr: [{stderr}]",
                    cwd.display()
                )
            }
            GitError::BadSource { name, source } => {
                write!(f, "bad remote for '{name}':\n  {source}")
            }
            GitError::CommitNotFound { name, revision } => {
                write!(f, "could not find commit or reference '{revision}' in '{name}'")
            }
        }
    }
}

impl std::error::Error for GitError {}

/// A git repository at `parent/name`, addressed through the external tool.
#[derive(Debug)]
pub struct GitRepo {
    name: String,
    path: PathBuf,
    /// Hashes confirmed by a successful resolve; lookups keyed on these are
    /// safe to memoize because the objects are immutable.
    known_hashes: Mutex<HashSet<String>>,
    /// Memoized command results, keyed on the canonicalized argument list.
    memo: DashMap<String, String>,
}

impl GitRepo {
    pub fn new(name: &str, parent: &Path) -> Self {
        GitRepo {
            name: name.to_string(),
            path: parent.join(name),
            known_hashes: Mutex::new(HashSet::new()),
            memo: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Repoint this handle after the checkout was promoted from the cache
    /// directory into the workspace root.
    pub fn move_to_root(&mut self, wsroot: &Path) {
        self.path = wsroot.join(&self.name);
    }

    /// Whether `path` is a repository reachable by git.
    pub fn is_git_repo(path: &Path) -> bool {
        let status = Command::new("git")
            .args(["ls-remote", "--exit-code"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        matches!(status, Ok(status) if status.success())
    }

    // =========================================================================
    // Clone and fetch
    // =========================================================================

    /// Clone if the repository is not on disk yet, then fetch.
    pub fn download(&self, source: &str) -> anyhow::Result<()> {
        if !Self::is_git_repo(&self.path) {
            self.clone_from(source)?;
        }
        self.fetch(source)
    }

    /// Clone `source` with history only (no working-tree checkout).
    fn clone_from(&self, source: &str) -> anyhow::Result<()> {
        let mut args: Vec<String> = vec!["clone".to_string()];
        args.extend(self.reference_options());
        args.push("--no-checkout".to_string());
        args.push(source.to_string());
        args.push(self.path.display().to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let output = run_git(parent, &args, None)?;
        if !output.status.success() {
            if self.is_bad_source(source)? {
                return Err(GitError::BadSource {
                    name: self.name.clone(),
                    source: source.to_string(),
                }
                .into());
            }
            return Err(command_failed(parent, &args, &output));
        }
        log::info!("Cloned {}", self.name);
        Ok(())
    }

    /// Use `git clone --reference` to point at a local repository cache to copy
    /// objects from, saving network traffic. Missing objects are still fetched
    /// from the true remote. Older git lacks `--reference-if-able`, so the
    /// "if able" part is emulated here.
    fn reference_options(&self) -> Vec<String> {
        let Some(base) = env::workspace_reference() else {
            return Vec::new();
        };
        for candidate in [base.join(&self.name), base.join(format!("{}.git", self.name))] {
            if candidate.is_dir() {
                return vec![
                    "--reference".to_string(),
                    candidate.display().to_string(),
                    "--dissociate".to_string(),
                ];
            }
        }
        Vec::new()
    }

    /// Fetch `source` plus all configured remotes.
    pub fn fetch(&self, source: &str) -> anyhow::Result<()> {
        // In case source is a remote and a bare commit is wanted.
        let output = self.git(&["fetch", source])?;
        // In case source is a file path and a remote-tracking ref like
        // origin/master is wanted.
        self.git(&["fetch", "--all"])?;
        if !output.status.success() {
            if self.is_bad_source(source)? {
                return Err(GitError::BadSource {
                    name: self.name.clone(),
                    source: source.to_string(),
                }
                .into());
            }
            return Err(command_failed(&self.path, &["fetch", source], &output));
        }
        Ok(())
    }

    /// Distinguish "source unreachable" from other tool failures by listing
    /// the remote from a sibling working directory.
    fn is_bad_source(&self, source: &str) -> anyhow::Result<bool> {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        let output = run_git(parent, &["ls-remote", source], None)?;
        Ok(!output.status.success())
    }

    // =========================================================================
    // Commit resolution
    // =========================================================================

    /// Resolve a ref to a 40-char commit, trying `ref` then `origin/ref`.
    pub fn get_commit(&self, revision: &str) -> anyhow::Result<String> {
        let key = memo_key(&["rev-parse", revision]);
        let known = self.is_known_hash(revision);
        if known && let Some(hit) = self.memo.get(&key) {
            return Ok(hit.value().clone());
        }
        let result = self.get_commit_impl(revision)?;
        if known {
            self.memo.insert(key, result.clone());
        }
        self.add_known_hash(&result);
        Ok(result)
    }

    fn get_commit_impl(&self, revision: &str) -> anyhow::Result<String> {
        let output = self.git(&["rev-parse", revision])?;
        if output.status.success() {
            return Ok(text(&output.stdout).trim_end().to_string());
        }
        let origin_ref = format!("origin/{revision}");
        let args = ["rev-parse", origin_ref.as_str()];
        let output = self.git(&args)?;
        if output.status.success() {
            return Ok(text(&output.stdout).trim_end().to_string());
        }
        if text(&output.stderr).contains(UNKNOWN_REVISION) {
            return Err(GitError::CommitNotFound {
                name: self.name.clone(),
                revision: revision.to_string(),
            }
            .into());
        }
        Err(command_failed(&self.path, &args, &output))
    }

    pub fn get_head_commit(&self) -> anyhow::Result<String> {
        self.get_commit("HEAD")
    }

    pub fn get_shortened_rev(&self, revision: &str) -> anyhow::Result<String> {
        let key = memo_key(&["rev-parse", "--short", revision]);
        let known = self.is_known_hash(revision);
        if known && let Some(hit) = self.memo.get(&key) {
            return Ok(hit.value().clone());
        }
        let result = self
            .checked(&["rev-parse", "--short", revision])?
            .trim_end()
            .to_string();
        if known {
            self.memo.insert(key, result.clone());
        }
        Ok(result)
    }

    pub fn is_hash(&self, reference: &str) -> anyhow::Result<bool> {
        Ok(self.get_commit(reference)? == reference)
    }

    pub fn is_tag(&self, reference: &str) -> anyhow::Result<bool> {
        let stdout = self.checked(&["tag", "--list", reference])?;
        Ok(stdout.lines().any(|line| line == reference))
    }

    /// Cheap object existence check.
    pub fn has_commit(&self, commit: &str) -> anyhow::Result<bool> {
        // rev-parse does not always fail when a commit is missing
        let output = self.git(&["cat-file", "-t", commit])?;
        Ok(output.status.success())
    }

    pub fn is_ancestor(&self, ancestor: &str, current: &str) -> anyhow::Result<bool> {
        let output = self.git(&["merge-base", "--is-ancestor", ancestor, current])?;
        Ok(output.status.success())
    }

    /// Whether all of `commits` share a common ancestor (octopus merge-base).
    pub fn have_common_ancestor(&self, commits: &[&str]) -> anyhow::Result<bool> {
        let mut args = vec!["merge-base", "--octopus"];
        args.extend_from_slice(commits);
        let output = self.git(&args)?;
        Ok(output.status.success())
    }

    /// Committer time of `revision` in unix seconds.
    pub fn commit_to_time(&self, revision: &str) -> anyhow::Result<i64> {
        let key = memo_key(&["log", "-n1", "--format=%ct", revision]);
        let known = self.is_known_hash(revision);
        let raw = if known && let Some(hit) = self.memo.get(&key) {
            hit.value().clone()
        } else {
            let raw = self
                .checked(&["log", "-n1", "--format=%ct", revision])?
                .trim_end()
                .to_string();
            if known {
                self.memo.insert(key, raw.clone());
            }
            raw
        };
        raw.parse::<i64>()
            .with_context(|| format!("unexpected commit time '{raw}' for '{revision}'"))
    }

    fn is_known_hash(&self, commit: &str) -> bool {
        self.known_hashes.lock().expect("known-hash lock").contains(commit)
    }

    fn add_known_hash(&self, commit: &str) {
        self.known_hashes
            .lock()
            .expect("known-hash lock")
            .insert(commit.to_string());
    }

    // =========================================================================
    // Remotes
    // =========================================================================

    pub fn get_remote(&self) -> anyhow::Result<String> {
        Ok(self
            .checked(&["remote", "get-url", "origin"])?
            .trim_end()
            .to_string())
    }

    pub fn set_origin(&self, source: &str) -> anyhow::Result<()> {
        self.checked(&["remote", "set-url", "origin", source])?;
        Ok(())
    }

    // =========================================================================
    // Working-tree status
    // =========================================================================

    pub fn clean(&self) -> anyhow::Result<bool> {
        Ok(self.porcelain_status()?.is_empty())
    }

    pub fn modified(&self) -> anyhow::Result<bool> {
        Ok(parse::has_modified(&self.porcelain_status()?))
    }

    pub fn untracked(&self) -> anyhow::Result<bool> {
        Ok(parse::has_untracked(&self.porcelain_status()?))
    }

    /// Whether the committed manifest differs from the working tree.
    pub fn modified_manifest(&self) -> anyhow::Result<bool> {
        Ok(parse::has_modified_file(
            &self.porcelain_status()?,
            PKG_MANIFEST_FILE,
        ))
    }

    fn porcelain_status(&self) -> anyhow::Result<String> {
        self.checked(&["status", "--porcelain"])
    }

    // =========================================================================
    // Dependency declarations at a commit
    // =========================================================================

    /// Read the committed manifest at `revision`; if absent, synthesize
    /// entries from the committed submodule description.
    pub fn repo_entries_from_commit(&self, revision: &str) -> anyhow::Result<Vec<RepoEntry>> {
        let entries = self.read_manifest_at(revision)?;
        if !entries.is_empty() {
            return Ok(entries);
        }
        self.read_submodules_at(revision)
    }

    fn read_manifest_at(&self, revision: &str) -> anyhow::Result<Vec<RepoEntry>> {
        let spec = format!("{revision}:{PKG_MANIFEST_FILE}");
        let output = self.git(&["show", &spec])?;
        if !output.status.success() {
            log::debug!(
                "No wit dependency file found in repo [{}:{}]",
                revision,
                self.path.display()
            );
            return Ok(Vec::new());
        }
        Ok(crate::repo_entries::parse_manifest(
            &text(&output.stdout),
            Path::new(PKG_MANIFEST_FILE),
            Some(revision),
        )?)
    }

    fn read_submodules_at(&self, revision: &str) -> anyhow::Result<Vec<RepoEntry>> {
        let spec = format!("{revision}:{SUBMODULE_FILE}");
        let output = self.git(&["show", &spec])?;
        if !output.status.success() {
            log::debug!(
                "No {} file found in repo [{}:{}]",
                SUBMODULE_FILE,
                revision,
                self.path.display()
            );
            return Ok(Vec::new());
        }

        log::debug!(
            "{}:{} does not have {}, reading dependencies from {} instead",
            self.name,
            revision,
            PKG_MANIFEST_FILE,
            SUBMODULE_FILE
        );

        // Use the git config parser to read the submodule contents.
        let args = ["config", "-f-", "--get-regexp", r"submodule\..*"];
        let config = self.git_with_input(&args, &text(&output.stdout))?;
        self.expect_success(&args, &config)?;

        let declarations = parse::parse_submodule_config(&text(&config.stdout)).map_err(|reason| {
            FormatError {
                path: PathBuf::from(SUBMODULE_FILE),
                revision: Some(revision.to_string()),
                reason,
            }
        })?;

        let mut entries = Vec::new();
        for (name, path, url) in declarations {
            let pointer = self.submodule_pointer(revision, &path)?;
            // wit keeps a flat checkout. Submodules are named by their
            // relative checkout path unless the user adds an explicit name,
            // so a path-shaped name is replaced by the url basename.
            let checkout_path = if name.contains('/') {
                crate::dependency::infer_name(&url)
            } else {
                name
            };
            entries.push(RepoEntry {
                message: None,
                revision: pointer,
                checkout_path,
                remote_url: Some(url),
            });
        }
        Ok(entries)
    }

    /// The submodule pointer commit in the index at `revision`. This is not
    /// necessarily the currently checked-out commit of the submodule.
    fn submodule_pointer(&self, revision: &str, path: &str) -> anyhow::Result<String> {
        let args = ["ls-tree", revision, path];
        let output = self.git(&args)?;
        self.expect_success(&args, &output)?;
        parse::ls_tree_object(&text(&output.stdout)).ok_or_else(|| {
            anyhow::anyhow!(
                "unexpected ls-tree output for '{path}' at '{revision}' in '{}'",
                self.name
            )
        })
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Check out `revision`. When HEAD already matches, re-invoke checkout
    /// with no argument to restore the working tree. Otherwise prefer a
    /// non-remote ref whose tip equals the resolved commit, so branches stay
    /// attached where possible.
    pub fn checkout(&self, revision: &str) -> anyhow::Result<()> {
        let wanted = self.get_commit(revision)?;
        if self.get_head_commit()? == wanted {
            let output = self.git(&["checkout"])?;
            return self.expect_success(&["checkout"], &output);
        }

        let show_ref = self.checked(&["show-ref"])?;
        let names = parse::ref_names_for(show_ref.trim_end(), &wanted);

        let target = if names.len() == 1 {
            log::info!("Checking out '{}' at '{}' ({})", self.name, names[0], revision);
            names[0].clone()
        } else {
            let suggestions = if names.len() > 1 {
                format!(" ({})", names.join(", "))
            } else {
                String::new()
            };
            log::info!("Checking out '{}' at '{}'{}", self.name, revision, suggestions);
            revision.to_string()
        };

        let args = ["checkout", target.as_str()];
        let output = self.git(&args)?;
        self.expect_success(&args, &output)
    }

    // =========================================================================
    // Command execution
    // =========================================================================

    fn git(&self, args: &[&str]) -> anyhow::Result<Output> {
        run_git(&self.path, args, None)
    }

    fn git_with_input(&self, args: &[&str], input: &str) -> anyhow::Result<Output> {
        run_git(&self.path, args, Some(input))
    }

    /// Run a command and fail with the full invocation context on non-zero exit.
    fn checked(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = self.git(args)?;
        self.expect_success(args, &output)?;
        Ok(text(&output.stdout))
    }

    fn expect_success(&self, args: &[&str], output: &Output) -> anyhow::Result<()> {
        if output.status.success() {
            return Ok(());
        }
        Err(command_failed(&self.path, args, output))
    }
}

fn run_git(cwd: &Path, args: &[&str], input: Option<&str>) -> anyhow::Result<Output> {
    log::debug!("$ git {} [{}]", args.join(" "), cwd.display());
    let mut child = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to execute: git {}", args.join(" ")))?;

    if let Some(content) = input {
        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(content.as_bytes())
            .context("failed to write to git stdin")?;
        // stdin drops here, closing the pipe
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for: git {}", args.join(" ")))?;
    log::trace!("  stdout: [{}]", text(&output.stdout).trim_end());
    log::trace!("  stderr: [{}]", text(&output.stderr).trim_end());
    Ok(output)
}

fn command_failed(cwd: &Path, args: &[&str], output: &Output) -> anyhow::Error {
    GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        cwd: cwd.to_path_buf(),
        code: output.status.code(),
        stdout: text(&output.stdout).trim_end().to_string(),
        stderr: text(&output.stderr).trim_end().to_string(),
    }
    .into()
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn memo_key(args: &[&str]) -> String {
    args.join("\u{1f}")
}
