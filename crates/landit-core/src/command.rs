//! Command specifications and captured invocations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A command a caller asks the execution boundary to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment variables. Never logged.
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Build a spec from a full argv, e.g. `["git", "status"]`.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.as_ref()).args(args.iter().map(|a| a.as_ref().to_string())))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The primary subcommand, i.e. the first argument.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }
}

/// The captured result of a command passed to the execution boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Whether the policy permitted the command.
    pub allowed: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the command was blocked or killed by a signal.
    pub return_code: Option<i32>,
}

impl CommandInvocation {
    pub fn success(&self) -> bool {
        self.allowed && self.return_code == Some(0)
    }

    /// Log block written to the artifact sink (redacted by the sink).
    pub fn log_entry(&self) -> String {
        let rc = self
            .return_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        if !self.allowed {
            return format!("$ {}\nblocked by policy\n", self.argv.join(" "));
        }
        format!(
            "$ {}\nrc={}\nstdout:\n{}\nstderr:\n{}\n",
            self.argv.join(" "),
            rc,
            self.stdout,
            self.stderr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(&["git", "push", "-u", "origin", "feature"]).unwrap();
        assert_eq!(spec.program, "git");
        assert_eq!(spec.subcommand(), Some("push"));
        assert_eq!(spec.display(), "git push -u origin feature");
        assert!(CommandSpec::from_argv::<&str>(&[]).is_none());
    }

    #[test]
    fn test_program_without_subcommand() {
        let spec = CommandSpec::new("ls");
        assert_eq!(spec.subcommand(), None);
        assert_eq!(spec.argv(), vec!["ls"]);
    }

    #[test]
    fn test_log_entry_formats() {
        let ran = CommandInvocation {
            argv: vec!["git".into(), "status".into()],
            cwd: None,
            allowed: true,
            stdout: "clean".into(),
            stderr: String::new(),
            return_code: Some(0),
        };
        assert!(ran.success());
        assert_eq!(ran.log_entry(), "$ git status\nrc=0\nstdout:\nclean\nstderr:\n\n");

        let blocked = CommandInvocation {
            allowed: false,
            return_code: None,
            ..ran
        };
        assert!(!blocked.success());
        assert!(blocked.log_entry().contains("blocked by policy"));
    }
}
