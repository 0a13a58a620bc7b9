//! Deny-by-default command policy.

use landit_config::PolicySettings;
use landit_core::command::CommandSpec;
use landit_core::{Error, Result};
use std::collections::HashSet;

/// `git push` flags that update refs beyond the ones named on the command line.
const BROAD_PUSH_FLAGS: &[&str] = &["--all", "--mirror"];

/// Decides whether a command may run.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allow: HashSet<(String, String)>,
    protected_branches: Vec<String>,
}

impl CommandPolicy {
    pub fn new(settings: &PolicySettings) -> Self {
        Self {
            allow: settings
                .allow
                .iter()
                .map(|rule| (rule.program.clone(), rule.subcommand.clone()))
                .collect(),
            protected_branches: settings.protected_branches.clone(),
        }
    }

    pub fn is_allowed(&self, program: &str, subcommand: &str) -> bool {
        self.allow
            .contains(&(program.to_string(), subcommand.to_string()))
    }

    /// Check `spec` against the allowlist and, for `git push`, the protected
    /// branches plus `extra_protected`.
    pub fn check(&self, spec: &CommandSpec, extra_protected: &[String]) -> Result<()> {
        let Some(subcommand) = spec.subcommand() else {
            return Err(Error::PolicyViolation(format!(
                "command has no subcommand: {}",
                spec.program
            )));
        };
        if !self.is_allowed(&spec.program, subcommand) {
            return Err(Error::PolicyViolation(format!(
                "command not allowlisted: {} {}",
                spec.program, subcommand
            )));
        }

        if spec.program == "git" && subcommand == "push" {
            let protected: Vec<&str> = self
                .protected_branches
                .iter()
                .chain(extra_protected)
                .map(String::as_str)
                .collect();
            self.check_push(&spec.args[1..], &protected)?;
        }
        Ok(())
    }

    fn check_push(&self, args: &[String], protected: &[&str]) -> Result<()> {
        for arg in args {
            if BROAD_PUSH_FLAGS.contains(&arg.as_str()) {
                return Err(Error::PolicyViolation(format!(
                    "git push {arg} may update protected branches"
                )));
            }
            if arg.starts_with('-') {
                continue;
            }
            if let Some(branch) = protected.iter().find(|b| targets_branch(arg, b)) {
                return Err(Error::PolicyViolation(format!(
                    "push to protected branch '{branch}' denied"
                )));
            }
        }
        Ok(())
    }
}

/// Whether a positional push argument updates `branch`.
///
/// Matches `main`, `refs/heads/main`, and refspecs such as `HEAD:main` or
/// `+feature:refs/heads/main`.
fn targets_branch(arg: &str, branch: &str) -> bool {
    let arg = arg.strip_prefix('+').unwrap_or(arg);
    let destination = match arg.split_once(':') {
        Some((_, dst)) => dst,
        None => arg,
    };
    destination == branch
        || destination
            .strip_prefix("refs/heads/")
            .is_some_and(|name| name == branch)
}
