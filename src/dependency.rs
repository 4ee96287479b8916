//! Dependency edges declared by manifests.

use std::path::Path;

use anyhow::anyhow;

use crate::package::{Package, PackageId, PackageStore};
use crate::repo_entries::RepoEntry;

/// Revision used when a dependency tag does not specify one.
pub const DEFAULT_REVISION: &str = "HEAD";

/// Index of a dependency edge in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(pub usize);

/// A directed edge from a manifest to a repository name.
///
/// Dependencies come from `wit-workspace.json`, per-package manifests read at
/// a commit, or the CLI. During resolution each edge is bound to the single
/// [`Package`] chosen for its name; `package` and `parent` are arena indices,
/// so the dependent/package back-references form plain graph edges instead of
/// ownership cycles.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub source: Option<String>,
    pub specified_revision: String,
    pub message: Option<String>,
    /// Bound during resolution.
    pub package: Option<PackageId>,
    /// The package whose manifest introduced this edge; `None` for edges from
    /// the workspace manifest.
    pub parent: Option<PackageId>,
}

impl Dependency {
    /// Build a dependency, inferring the name from the source when absent.
    pub fn new(
        name: Option<&str>,
        source: Option<String>,
        revision: Option<String>,
        message: Option<String>,
    ) -> Self {
        let name = match name {
            Some(name) => name.to_string(),
            None => infer_name(
                source
                    .as_deref()
                    .expect("a dependency needs a name or a source"),
            ),
        };
        Dependency {
            name,
            source,
            specified_revision: revision
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
            message,
            package: None,
            parent: None,
        }
    }

    pub fn from_entry(entry: &RepoEntry) -> Self {
        Dependency {
            name: entry.checkout_path.clone(),
            source: entry.remote_url.clone(),
            specified_revision: entry.revision.clone(),
            message: entry.message.clone(),
            package: None,
            parent: None,
        }
    }

    pub fn to_entry(&self) -> RepoEntry {
        RepoEntry {
            message: self.message.clone(),
            revision: self.specified_revision.clone(),
            checkout_path: self.name.clone(),
            remote_url: self.source.clone(),
        }
    }

    fn bound_package<'s>(&self, store: &'s PackageStore) -> anyhow::Result<&'s Package> {
        let id = self
            .package
            .ok_or_else(|| anyhow!("dependency '{}' is not bound to a package", self.name))?;
        Ok(store.get(id))
    }

    /// The 40-char commit `specified_revision` resolves to. Requires a bound,
    /// materialized package.
    pub fn resolved_rev(&self, store: &PackageStore) -> anyhow::Result<String> {
        let package = self.bound_package(store)?;
        let repo = package.repo.as_ref().ok_or_else(|| {
            anyhow!("cannot resolve dependency '{}' that is unbound from disk", self.name)
        })?;
        repo.get_commit(&self.specified_revision)
    }

    /// Committer time of the specified revision, in unix seconds.
    pub fn commit_time(&self, store: &PackageStore) -> anyhow::Result<i64> {
        let package = self.bound_package(store)?;
        let repo = package.repo.as_ref().ok_or_else(|| {
            anyhow!("cannot date dependency '{}' that is unbound from disk", self.name)
        })?;
        repo.commit_to_time(&self.specified_revision)
    }

    /// A copy with the revision pinned to its resolved commit, for writing to
    /// manifests.
    pub fn resolved(&self, store: &PackageStore) -> anyhow::Result<Dependency> {
        Ok(Dependency {
            specified_revision: self.resolved_rev(store)?,
            ..self.clone()
        })
    }

    /// Abbreviated revision for display. Falls back to a prefix of the
    /// specified revision when the edge is unbound.
    pub fn short_revision(&self, store: &PackageStore) -> String {
        if let Some(id) = self.package
            && let Some(repo) = &store.get(id).repo
        {
            if repo.is_hash(&self.specified_revision).unwrap_or(false)
                && let Ok(short) = repo.get_shortened_rev(&self.specified_revision)
            {
                return short;
            }
            return self.specified_revision.clone();
        }
        self.specified_revision.chars().take(8).collect()
    }

    /// Display tag, e.g. `chisel::4ee6e4d5`.
    pub fn tag(&self, store: &PackageStore) -> String {
        format!("{}::{}", self.name, self.short_revision(store))
    }
}

/// Infer a dependency name from its source: the final path component, with a
/// trailing `.git` stripped.
pub fn infer_name(source: &str) -> String {
    let base = Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    base.strip_suffix(".git").unwrap_or(&base).to_string()
}

/// Split a `source[::revision]` dependency tag.
pub fn parse_tag(tag: &str) -> (String, Option<String>) {
    let mut parts = tag.split("::");
    let source = parts.next().unwrap_or_default().to_string();
    let revision = parts.next().filter(|rev| !rev.is_empty()).map(str::to_owned);
    (source, revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_names_from_urls_and_paths() {
        assert_eq!(infer_name("https://host/path/foo.git"), "foo");
        assert_eq!(infer_name("/a/b/foo"), "foo");
        assert_eq!(infer_name("foo.git"), "foo");
        assert_eq!(infer_name("ghi"), "ghi");
        // Only a trailing .git is stripped.
        assert_eq!(infer_name("a.github.io"), "a.github.io");
    }

    #[test]
    fn parses_dependency_tags() {
        assert_eq!(
            parse_tag("https://host/r.git::v1.2"),
            ("https://host/r.git".to_string(), Some("v1.2".to_string()))
        );
        assert_eq!(parse_tag("r"), ("r".to_string(), None));
        assert_eq!(parse_tag("r::"), ("r".to_string(), None));
    }

    #[test]
    fn defaults_the_revision_to_head() {
        let dep = Dependency::new(None, Some("/srv/git/foo.git".to_string()), None, None);
        assert_eq!(dep.name, "foo");
        assert_eq!(dep.specified_revision, DEFAULT_REVISION);
    }

    #[test]
    fn explicit_name_wins_over_inference() {
        let dep = Dependency::new(
            Some("renamed"),
            Some("/srv/git/foo.git".to_string()),
            Some("abc".to_string()),
            None,
        );
        assert_eq!(dep.name, "renamed");
        assert_eq!(dep.specified_revision, "abc");
    }

    #[test]
    fn entry_round_trip_preserves_the_message() {
        let entry = RepoEntry {
            message: Some("held back, see issue 42".to_string()),
            revision: "abcdef".to_string(),
            checkout_path: "foo".to_string(),
            remote_url: Some("/srv/git/foo".to_string()),
        };
        let dep = Dependency::from_entry(&entry);
        assert_eq!(dep.to_entry(), entry);
    }
}
