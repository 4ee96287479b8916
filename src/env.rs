//! Environment variables consumed by wit.

use std::path::PathBuf;

/// Search paths tried before any remote, colon or space separated.
/// Also exposed as the `--repo-path` flag default.
pub const REPO_PATH: &str = "WIT_REPO_PATH";

/// Directory of local repositories used as an object cache hint during clone.
pub const WORKSPACE_REFERENCE: &str = "WIT_WORKSPACE_REFERENCE";

// Exported per `foreach` invocation. Note that WIT_REPO_PATH is reused there
// with a different meaning: the absolute path of the package being visited.
pub const FOREACH_REPO_NAME: &str = "WIT_REPO_NAME";
pub const FOREACH_REPO_PATH: &str = "WIT_REPO_PATH";
pub const FOREACH_LOCK_SOURCE: &str = "WIT_LOCK_SOURCE";
pub const FOREACH_LOCK_COMMIT: &str = "WIT_LOCK_COMMIT";
pub const FOREACH_WORKSPACE: &str = "WIT_WORKSPACE";

/// Read `WIT_WORKSPACE_REFERENCE`, treating an empty value as unset.
///
/// The returned path is not validated here; `main` refuses to start when it
/// is relative, since clones may run from arbitrary working directories.
pub fn workspace_reference() -> Option<PathBuf> {
    match std::env::var(WORKSPACE_REFERENCE) {
        Ok(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

/// Split a `--repo-path`/`WIT_REPO_PATH` value into individual search paths.
pub fn split_repo_path(value: &str) -> Vec<PathBuf> {
    value
        .split([' ', ':'])
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_spaces_and_colons() {
        let paths = split_repo_path("/a/b:/c/d /e");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/a/b"),
                PathBuf::from("/c/d"),
                PathBuf::from("/e")
            ]
        );
    }

    #[test]
    fn ignores_empty_segments() {
        assert!(split_repo_path("").is_empty());
        assert_eq!(split_repo_path("::/x:"), vec![PathBuf::from("/x")]);
    }
}
