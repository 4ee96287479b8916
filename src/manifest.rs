//! The list of direct dependencies of the workspace or of a single package.

use std::path::Path;

use crate::dependency::Dependency;
use crate::repo_entries;

/// Ordered dependency records; names are unique and insertion order is
/// preserved for stable diffs.
#[derive(Debug, Default)]
pub struct Manifest {
    pub dependencies: Vec<Dependency>,
}

impl Manifest {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Manifest { dependencies }
    }

    /// Read a manifest that must exist.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let entries = repo_entries::read_manifest(path)?;
        Ok(Manifest {
            dependencies: entries.iter().map(Dependency::from_entry).collect(),
        })
    }

    /// Read a per-package manifest; a missing file is an empty manifest.
    pub fn read_or_empty(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Manifest::default());
        }
        Self::read(path)
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let entries: Vec<_> = self.dependencies.iter().map(Dependency::to_entry).collect();
        repo_entries::write_manifest(path, &entries)
    }

    pub fn get_dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|dep| dep.name == name)
    }

    pub fn contains_dependency(&self, name: &str) -> bool {
        self.get_dependency(name).is_some()
    }

    pub fn add_dependency(&mut self, dep: Dependency) {
        log::debug!("Adding to manifest: {}::{}", dep.name, dep.specified_revision);
        self.dependencies.push(dep);
    }

    /// Replace the entry with the same name in place.
    pub fn replace_dependency(&mut self, dep: Dependency) {
        let slot = self
            .dependencies
            .iter_mut()
            .find(|existing| existing.name == dep.name)
            .unwrap_or_else(|| {
                panic!("trying to update '{}' but it is not in the manifest", dep.name)
            });
        *slot = dep;
    }
}
