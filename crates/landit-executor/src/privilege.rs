//! Privilege guard.

use landit_core::{Error, Result};
use nix::unistd::{Uid, geteuid};

/// Fail unless the current process runs as a non-root user.
pub fn ensure_unprivileged() -> Result<()> {
    ensure_not_root(geteuid())
}

pub fn ensure_not_root(euid: Uid) -> Result<()> {
    if euid.is_root() {
        return Err(Error::Configuration(
            "refusing to run as root; start the worker as an unprivileged user".to_string(),
        ));
    }
    Ok(())
}
