//! Run a command sequentially in each locked package.

use std::process::Command;

use anyhow::Context;

use wit::env;
use wit::workspace::Workspace;

use crate::commands::SilentExit;

/// Execute `cmd args...` in every lock entry's checkout, exporting the
/// `WIT_*` context variables per invocation. Output streams through
/// inherited stdio. Without `--continue-on-fail` the first failure exits
/// with the child's code; otherwise failures are counted and the command
/// exits 1 at the end.
pub fn handle_foreach(
    ws: &Workspace,
    cmd: &str,
    args: &[String],
    continue_on_fail: bool,
) -> anyhow::Result<()> {
    let mut has_fail = false;

    for entry in ws.lock.entries() {
        let name = &entry.checkout_path;
        let location = ws.root.join(name);
        log::info!("Entering '{name}'");

        let status = Command::new(cmd)
            .args(args)
            .current_dir(&location)
            .env(env::FOREACH_REPO_NAME, name)
            .env(env::FOREACH_REPO_PATH, &location)
            .env(
                env::FOREACH_LOCK_SOURCE,
                entry.remote_url.as_deref().unwrap_or_default(),
            )
            .env(env::FOREACH_LOCK_COMMIT, &entry.revision)
            .env(env::FOREACH_WORKSPACE, &ws.root)
            .status()
            .with_context(|| format!("failed to run '{cmd}' in '{}'", location.display()))?;

        if !status.success() {
            has_fail = true;
            let code = status.code().unwrap_or(1);
            log::error!(
                "Command '{cmd} {}' in '{}' failed with exit code {code}",
                args.join(" "),
                location.display()
            );
            if !continue_on_fail {
                return Err(SilentExit { code }.into());
            }
        }
    }

    if has_fail {
        return Err(SilentExit { code: 1 }.into());
    }
    Ok(())
}
