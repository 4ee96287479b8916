//! The update command: resolve, then check out.

use wit::workspace::Workspace;

use crate::commands::{SilentExit, report_errors};

/// Resolve the dependency graph and check the chosen commits out. Any
/// resolution error makes the result non-actionable: the errors are reported
/// together and nothing is touched.
pub fn handle_update(ws: &mut Workspace) -> anyhow::Result<()> {
    let mut resolution = ws.resolve(true)?;
    if resolution.is_clean() {
        ws.checkout(&mut resolution)
    } else {
        report_errors(&resolution.errors);
        Err(SilentExit { code: 1 }.into())
    }
}
