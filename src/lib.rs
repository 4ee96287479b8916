//! Multi-repository workspace integration.
//!
//! wit manages a flat checkout of interdependent git repositories. Each
//! repository may declare dependencies on other repositories (remote + commit)
//! in a `wit-manifest.json`; the workspace resolves the transitive graph to a
//! single commit per repository name, clones and fetches as needed, checks
//! everything out, and records the result in `wit-lock.json`.
//!
//! The library API is not stable; the supported interface is the `wit` CLI.

pub mod dependency;
pub mod env;
pub mod git;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod repo_entries;
pub mod styling;
pub mod workspace;
