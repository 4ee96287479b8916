//! Workspace-manifest edits: add-pkg and update-pkg.

use wit::dependency::parse_tag;
use wit::workspace::Workspace;

pub fn handle_add_pkg(ws: &mut Workspace, tag: &str) -> anyhow::Result<()> {
    log::info!("Adding package to workspace");
    let (source, revision) = parse_tag(tag);
    ws.add_dependency(&source, revision)
}

pub fn handle_update_pkg(ws: &mut Workspace, tag: &str) -> anyhow::Result<()> {
    let (source, revision) = parse_tag(tag);
    ws.update_dependency(&source, revision)
}
