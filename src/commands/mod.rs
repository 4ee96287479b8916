//! Command implementations for the `wit` CLI.

mod dep;
mod foreach;
mod init;
mod inspect;
mod pkg;
mod restore;
mod status;
mod update;

pub use dep::{handle_add_dep, handle_update_dep};
pub use foreach::handle_foreach;
pub use init::handle_init;
pub use inspect::handle_inspect;
pub use pkg::{handle_add_pkg, handle_update_pkg};
pub use restore::handle_restore;
pub use status::handle_status;
pub use update::handle_update;

use wit::workspace::ResolutionError;

/// An error whose message has already been shown; main just exits with the
/// carried code.
#[derive(Debug)]
pub struct SilentExit {
    pub code: i32,
}

impl std::fmt::Display for SilentExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit code {}", self.code)
    }
}

impl std::error::Error for SilentExit {}

pub(crate) fn report_errors(errors: &[ResolutionError]) {
    for err in errors {
        log::error!("{err}");
    }
}
