//! On-disk codec for manifests and the lock file.
//!
//! Both formats serialize the same record. Manifests (`wit-workspace.json`
//! and per-package `wit-manifest.json`) are a sequence of records in
//! insertion order; the lock (`wit-lock.json`) is a mapping keyed by each
//! record's name. No other part of the crate knows the JSON field names.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One repository record, shared by the manifest and lock formats.
///
/// Fields are declared in sorted JSON-key order (`//`, `commit`, `name`,
/// `source`); serialization follows declaration order, keeping emitted files
/// byte-stable under re-emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Free-form comment, preserved on round-trip.
    #[serde(rename = "//", skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,

    /// Desired revision that exists in the history of the remote below.
    #[serde(rename = "commit")]
    pub revision: String,

    /// The path to check out at within the workspace.
    #[serde(rename = "name")]
    pub checkout_path: String,

    /// Url (or local filesystem path) for git to clone and fetch.
    /// May be absent when a `--repo-path` search path supplies it.
    #[serde(rename = "source", skip_serializing_if = "Option::is_none", default)]
    pub remote_url: Option<String>,
}

impl RepoEntry {
    pub fn new(checkout_path: impl Into<String>, revision: impl Into<String>) -> Self {
        RepoEntry {
            message: None,
            revision: revision.into(),
            checkout_path: checkout_path.into(),
            remote_url: None,
        }
    }
}

/// A file (or in-repo blob) that could not be parsed.
///
/// `revision` is set when the content was read out of a commit rather than
/// the filesystem.
#[derive(Debug)]
pub struct FormatError {
    pub path: PathBuf,
    pub revision: Option<String>,
    pub reason: String,
}

impl FormatError {
    fn new(path: &Path, revision: Option<&str>, reason: impl Into<String>) -> Self {
        FormatError {
            path: path.to_path_buf(),
            revision: revision.map(str::to_owned),
            reason: reason.into(),
        }
    }

    fn location(&self) -> String {
        match &self.revision {
            Some(rev) => format!("{}:{}", self.path.display(), rev),
            None => self.path.display().to_string(),
        }
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse {}: {}", self.location(), self.reason)
    }
}

impl std::error::Error for FormatError {}

/// Parse the list-of-records manifest shape.
pub fn parse_manifest(
    text: &str,
    path: &Path,
    revision: Option<&str>,
) -> Result<Vec<RepoEntry>, FormatError> {
    let entries: Vec<RepoEntry> = serde_json::from_str(text)
        .map_err(|e| FormatError::new(path, revision, e.to_string()))?;
    reject_duplicates(&entries, path, revision)?;
    Ok(entries)
}

/// Parse the name-keyed lock shape. Keys must equal each record's name.
pub fn parse_lock(
    text: &str,
    path: &Path,
    revision: Option<&str>,
) -> Result<Vec<RepoEntry>, FormatError> {
    let map: BTreeMap<String, RepoEntry> = serde_json::from_str(text)
        .map_err(|e| FormatError::new(path, revision, e.to_string()))?;
    for (key, entry) in &map {
        if *key != entry.checkout_path {
            return Err(FormatError::new(
                path,
                revision,
                format!(
                    "lock key '{}' does not match entry name '{}'",
                    key, entry.checkout_path
                ),
            ));
        }
    }
    // BTreeMap keys are unique, so duplicate detection is implicit here.
    Ok(map.into_values().collect())
}

fn reject_duplicates(
    entries: &[RepoEntry],
    path: &Path,
    revision: Option<&str>,
) -> Result<(), FormatError> {
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for entry in entries {
        if !seen.insert(entry.checkout_path.as_str())
            && !duplicates.contains(&entry.checkout_path.as_str())
        {
            duplicates.push(entry.checkout_path.as_str());
        }
    }
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(FormatError::new(
        path,
        revision,
        format!(
            "two repositories have the same checkout path: {}",
            duplicates.join(", ")
        ),
    ))
}

/// Read and parse a manifest file from disk.
pub fn read_manifest(path: &Path) -> anyhow::Result<Vec<RepoEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_manifest(&text, path, None)?)
}

/// Read and parse a lock file from disk.
pub fn read_lock(path: &Path) -> anyhow::Result<Vec<RepoEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_lock(&text, path, None)?)
}

/// Serialize the manifest shape: records in input order, sorted object keys,
/// trailing newline.
pub fn emit_manifest(entries: &[RepoEntry]) -> String {
    to_json_pretty(&entries)
}

/// Serialize the lock shape: a mapping sorted by name, trailing newline.
pub fn emit_lock(entries: &[RepoEntry]) -> String {
    let map: BTreeMap<&str, &RepoEntry> = entries
        .iter()
        .map(|e| (e.checkout_path.as_str(), e))
        .collect();
    to_json_pretty(&map)
}

/// Write a manifest file atomically (full content to a temp file, then rename).
pub fn write_manifest(path: &Path, entries: &[RepoEntry]) -> anyhow::Result<()> {
    write_atomically(path, &emit_manifest(entries))
}

/// Write a lock file atomically.
pub fn write_lock(path: &Path, entries: &[RepoEntry]) -> anyhow::Result<()> {
    write_atomically(path, &emit_lock(entries))
}

fn to_json_pretty<T: Serialize>(value: &T) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .expect("repo entries serialize to JSON");
    let mut text = String::from_utf8(buf).expect("serde_json emits UTF-8");
    text.push('\n');
    text
}

fn write_atomically(path: &Path, content: &str) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, commit: &str, source: Option<&str>) -> RepoEntry {
        RepoEntry {
            message: None,
            revision: commit.to_string(),
            checkout_path: name.to_string(),
            remote_url: source.map(str::to_owned),
        }
    }

    #[test]
    fn manifest_round_trip_preserves_order_and_message() {
        let mut second = entry("beta", "deadbeef", Some("https://host/beta.git"));
        second.message = Some("pinned for the 2.x series".to_string());
        let entries = vec![entry("alpha", "cafebabe", Some("/srv/git/alpha")), second];

        let text = emit_manifest(&entries);
        let parsed = parse_manifest(&text, Path::new("wit-workspace.json"), None).unwrap();
        assert_eq!(parsed, entries);

        // Byte-stable under re-emit.
        assert_eq!(emit_manifest(&parsed), text);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn lock_round_trip_is_sorted_and_stable() {
        let entries = vec![
            entry("zeta", "1111111", Some("https://host/zeta.git")),
            entry("alpha", "2222222", Some("https://host/alpha.git")),
        ];
        let text = emit_lock(&entries);
        // Sorted key order in the emitted mapping.
        assert!(text.find("alpha").unwrap() < text.find("zeta").unwrap());

        let parsed = parse_lock(&text, Path::new("wit-lock.json"), None).unwrap();
        assert_eq!(emit_lock(&parsed), text);
    }

    #[test]
    fn empty_lock_serializes_as_empty_object() {
        assert_eq!(emit_lock(&[]), "{}\n");
        assert_eq!(emit_manifest(&[]), "[]\n");
    }

    #[test]
    fn omits_source_only_when_absent() {
        let text = emit_manifest(&[entry("a", "c0ffee", None)]);
        assert!(!text.contains("source"));
        let text = emit_manifest(&[entry("a", "c0ffee", Some("/srv/a"))]);
        assert!(text.contains("\"source\": \"/srv/a\""));
    }

    #[test]
    fn duplicate_names_are_rejected_with_the_offenders() {
        let entries = vec![
            entry("dup", "1", None),
            entry("ok", "2", None),
            entry("dup", "3", None),
        ];
        let text = emit_manifest(&entries);
        let err = parse_manifest(&text, Path::new("wit-workspace.json"), None).unwrap_err();
        assert!(err.to_string().contains("dup"));
        assert!(!err.to_string().contains("ok,"));
    }

    #[test]
    fn malformed_json_reports_path_and_revision() {
        let err = parse_manifest("[{", Path::new("wit-manifest.json"), Some("abc123")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("wit-manifest.json:abc123"), "got: {msg}");
    }

    #[test]
    fn lock_key_must_match_entry_name() {
        let text = r#"{"other": {"commit": "c", "name": "pkg"}}"#;
        let err = parse_lock(text, Path::new("wit-lock.json"), None).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn emitted_object_keys_are_sorted() {
        let mut e = entry("pkg", "c0ffee", Some("/srv/pkg"));
        e.message = Some("note".to_string());
        let text = emit_manifest(&[e]);
        let slash = text.find("\"//\"").unwrap();
        let commit = text.find("\"commit\"").unwrap();
        let name = text.find("\"name\"").unwrap();
        let source = text.find("\"source\"").unwrap();
        assert!(slash < commit && commit < name && name < source);
    }
}
