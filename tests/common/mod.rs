// Helpers are shared across test binaries; not every binary uses all of them.
#![allow(dead_code)]

//! Test fixtures: throwaway git repositories with pinned commit times.
//!
//! The resolver orders its frontier by committer time, so every commit made
//! here carries an explicit `GIT_AUTHOR_DATE`/`GIT_COMMITTER_DATE` and a
//! fixed identity. Times are expressed as offsets from [`EPOCH`] to keep the
//! intended ordering visible at the call site.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use wit::repo_entries::{RepoEntry, emit_manifest, write_manifest};
use wit::workspace::Workspace;

pub const EPOCH: i64 = 1_700_000_000;

/// A real git repository under a test's temp directory.
pub struct TestRepo {
    pub path: PathBuf,
    pub name: String,
}

impl TestRepo {
    pub fn init(parent: &Path, name: &str) -> TestRepo {
        let path = parent.join(name);
        std::fs::create_dir_all(&path).unwrap();
        git(&path, EPOCH, &["init", "--initial-branch=master"]);
        TestRepo {
            path,
            name: name.to_string(),
        }
    }

    /// The clone/fetch source for this repository (its filesystem path).
    pub fn source(&self) -> String {
        self.path.display().to_string()
    }

    /// Write `file`, commit it at `time`, and return the new commit hash.
    pub fn commit_file(&self, file: &str, content: &str, time: i64) -> String {
        std::fs::write(self.path.join(file), content).unwrap();
        git(&self.path, time, &["add", file]);
        git(
            &self.path,
            time,
            &["commit", "-m", &format!("update {file}")],
        );
        self.head()
    }

    /// Commit a `wit-manifest.json` declaring `(name, commit, source)` deps.
    pub fn commit_manifest(&self, entries: &[(&str, &str, &str)], time: i64) -> String {
        let entries: Vec<RepoEntry> = entries
            .iter()
            .map(|(name, commit, source)| RepoEntry {
                message: None,
                revision: commit.to_string(),
                checkout_path: name.to_string(),
                remote_url: Some(source.to_string()),
            })
            .collect();
        std::fs::write(self.path.join("wit-manifest.json"), emit_manifest(&entries)).unwrap();
        git(&self.path, time, &["add", "wit-manifest.json"]);
        git(&self.path, time, &["commit", "-m", "update dependencies"]);
        self.head()
    }

    /// Commit a `.gitmodules` plus gitlink entries, without cloning anything.
    /// `modules` is `(submodule_name, path, url, pointer_commit)`.
    pub fn commit_submodules(&self, modules: &[(&str, &str, &str, &str)], time: i64) -> String {
        let mut content = String::new();
        for (name, path, url, _) in modules {
            content.push_str(&format!(
                "[submodule \"{name}\"]\n\tpath = {path}\n\turl = {url}\n"
            ));
        }
        std::fs::write(self.path.join(".gitmodules"), content).unwrap();
        git(&self.path, time, &["add", ".gitmodules"]);
        for (_, path, _, pointer) in modules {
            git(
                &self.path,
                time,
                &[
                    "update-index",
                    "--add",
                    "--cacheinfo",
                    &format!("160000,{pointer},{path}"),
                ],
            );
        }
        git(&self.path, time, &["commit", "-m", "add submodules"]);
        self.head()
    }

    pub fn head(&self) -> String {
        git_stdout(&self.path, &["rev-parse", "HEAD"])
    }

    pub fn branch(&self, name: &str, start: &str) {
        git(&self.path, EPOCH, &["branch", name, start]);
    }

    pub fn checkout(&self, rev: &str) {
        git(&self.path, EPOCH, &["checkout", "-q", rev]);
    }
}

/// Run git with pinned dates and identity, asserting success.
pub fn git(dir: &Path, time: i64, args: &[&str]) {
    let date = format!("{time} +0000");
    let status = Command::new("git")
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

pub fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stderr(Stdio::null())
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?} failed in {}",
        dir.display()
    );
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

pub fn head_of(dir: &Path) -> String {
    git_stdout(dir, &["rev-parse", "HEAD"])
}

/// Create a workspace under `parent` whose manifest lists
/// `(name, commit, source)` entries.
pub fn workspace_with_manifest(parent: &Path, entries: &[(&str, &str, &str)]) -> Workspace {
    let ws = Workspace::create(parent, "ws", Vec::new(), None).unwrap();
    let entries: Vec<RepoEntry> = entries
        .iter()
        .map(|(name, commit, source)| RepoEntry {
            message: None,
            revision: commit.to_string(),
            checkout_path: name.to_string(),
            remote_url: Some(source.to_string()),
        })
        .collect();
    write_manifest(&ws.manifest_path(), &entries).unwrap();
    Workspace::open(ws.root.clone(), Vec::new(), None).unwrap()
}
