//! Out-of-band credential helper for git.
//!
//! git runs `$GIT_ASKPASS <prompt>` for the username and the password. The
//! helper answers `x-access-token` for the former and prints the token file
//! for the latter, so the token never lands in argv, remote URLs or
//! `.git/config`.

use landit_core::gateway::Credential;
use landit_core::{Error, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A helper script living in its own temporary directory.
///
/// The directory (and the script) is removed when this value drops.
pub struct AskPass {
    _dir: TempDir,
    script: PathBuf,
}

impl AskPass {
    pub fn create(credential: &Credential) -> Result<Self> {
        // Fail early with a configuration error instead of a git auth failure.
        credential.read_token()?;

        let dir = tempfile::Builder::new().prefix("landit-askpass-").tempdir()?;
        let script = dir.path().join("askpass.sh");
        std::fs::write(&script, render_script(&credential.token_file)?)?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o700))?;
        Ok(Self { _dir: dir, script })
    }

    pub fn path(&self) -> &Path {
        &self.script
    }

    /// Environment for a git process using this helper.
    pub fn env(&self) -> [(String, String); 2] {
        [
            (
                "GIT_ASKPASS".to_string(),
                self.script.to_string_lossy().into_owned(),
            ),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ]
    }
}

fn render_script(token_file: &Path) -> Result<String> {
    let path = token_file.to_str().ok_or_else(|| {
        Error::Configuration(format!(
            "token file path is not valid UTF-8: {}",
            token_file.display()
        ))
    })?;
    if path.contains('\'') {
        return Err(Error::Configuration(format!(
            "token file path may not contain quotes: {path}"
        )));
    }
    Ok(format!(
        "#!/bin/sh\ncase \"$1\" in\n  *Username*) echo x-access-token ;;\n  *) cat '{path}' ;;\nesac\n"
    ))
}
