//! Parsers for git command output.

use std::sync::LazyLock;

use regex::Regex;

static REF_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^refs/(?:heads/)?").expect("valid regex"));

static SUBMODULE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^submodule\.(.*)\.path (.*)$").expect("valid regex"));

static SUBMODULE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^submodule\.(.*)\.url (.*)$").expect("valid regex"));

/// Extract the local ref names pointing at `commit` from `git show-ref` output.
///
/// Remote-tracking refs are excluded; `refs/heads/` and `refs/` prefixes are
/// stripped so the result can be passed back to `git checkout`.
pub(super) fn ref_names_for(show_ref: &str, commit: &str) -> Vec<String> {
    show_ref
        .lines()
        .filter_map(|line| {
            let (hash, name) = line.split_once(' ')?;
            if hash != commit || name.starts_with("refs/remotes") {
                return None;
            }
            Some(REF_PREFIX.replace(name, "").into_owned())
        })
        .collect()
}

/// A submodule declaration: `(name, path, url)` in declaration order.
pub(super) type SubmoduleDecl = (String, String, String);

/// Match paths with urls from `git config -f- --get-regexp 'submodule\..*'`
/// output, which is of the form:
///
/// ```text
/// submodule.$NAME.path $PATH
/// submodule.$NAME.url  $REMOTE
/// ```
pub(super) fn parse_submodule_config(text: &str) -> Result<Vec<SubmoduleDecl>, String> {
    let mut paths: Vec<(String, String)> = Vec::new();
    let mut urls: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    for line in text.lines() {
        if let Some(caps) = SUBMODULE_PATH.captures(line) {
            paths.push((caps[1].to_string(), caps[2].to_string()));
        } else if let Some(caps) = SUBMODULE_URL.captures(line) {
            urls.insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    if paths.len() != urls.len() {
        return Err("could not match submodule paths with urls".to_string());
    }

    paths
        .into_iter()
        .map(|(name, path)| {
            let url = urls
                .get(&name)
                .ok_or_else(|| format!("submodule '{name}' declares a path but no url"))?
                .clone();
            Ok((name, path, url))
        })
        .collect()
}

/// Extract the object hash from the first line of `git ls-tree` output:
/// `<mode> SP <type> SP <hash> TAB <file>`.
pub(super) fn ls_tree_object(text: &str) -> Option<String> {
    let first_line = text.lines().next()?;
    let before_tab = first_line.split('\t').next()?;
    before_tab.split(' ').nth(2).map(str::to_owned)
}

/// Any `M` entry in `git status --porcelain` output.
pub(super) fn has_modified(porcelain: &str) -> bool {
    porcelain.lines().any(|line| line.trim_start().starts_with('M'))
}

/// Any `??` entry in porcelain output.
pub(super) fn has_untracked(porcelain: &str) -> bool {
    porcelain.lines().any(|line| line.trim_start().starts_with("??"))
}

/// A modified or deleted entry for the given file name.
pub(super) fn has_modified_file(porcelain: &str, file_name: &str) -> bool {
    porcelain.lines().any(|line| {
        let trimmed = line.trim_start();
        (trimmed.starts_with('M') || trimmed.starts_with('D')) && line.ends_with(file_name)
    })
}
