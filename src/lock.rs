//! The complete post-resolution snapshot of every chosen package.

use std::path::{Path, PathBuf};

use crate::package::Package;
use crate::repo_entries::{self, RepoEntry};

/// One entry per name, each with a resolved commit and a source. Rewritten in
/// full after each successful resolve + checkout.
#[derive(Debug, Default)]
pub struct Lock {
    entries: Vec<RepoEntry>,
}

impl Lock {
    pub fn new(entries: Vec<RepoEntry>) -> Self {
        Lock { entries }
    }

    pub fn from_packages<'a>(packages: impl Iterator<Item = &'a Package>) -> Self {
        Lock {
            entries: packages.map(Package::to_entry).collect(),
        }
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        Ok(Lock {
            entries: repo_entries::read_lock(path)?,
        })
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        log::debug!("Writing lock file to {}", path.display());
        repo_entries::write_lock(path, &self.entries)
    }

    pub fn get(&self, name: &str) -> Option<&RepoEntry> {
        self.entries.iter().find(|entry| entry.checkout_path == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RepoEntry] {
        &self.entries
    }

    /// Project every entry into a package ready to be loaded from disk.
    pub fn packages(&self, repo_paths: &[PathBuf]) -> Vec<Package> {
        self.entries
            .iter()
            .map(|entry| Package::from_entry(entry, repo_paths.to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, commit: &str) -> RepoEntry {
        RepoEntry {
            message: None,
            revision: commit.to_string(),
            checkout_path: name.to_string(),
            remote_url: Some(format!("/srv/git/{name}")),
        }
    }

    #[test]
    fn lookup_by_name() {
        let lock = Lock::new(vec![entry("a", "1"), entry("b", "2")]);
        assert!(lock.contains("a"));
        assert_eq!(lock.get("b").unwrap().revision, "2");
        assert!(lock.get("c").is_none());
    }

    #[test]
    fn file_round_trip_is_byte_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wit-lock.json");

        let lock = Lock::new(vec![entry("zeta", "1"), entry("alpha", "2")]);
        lock.write(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let reread = Lock::read(&path).unwrap();
        reread.write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert!(reread.contains("zeta"));
    }

    #[test]
    fn empty_lock_writes_an_empty_object() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wit-lock.json");
        Lock::default().write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
