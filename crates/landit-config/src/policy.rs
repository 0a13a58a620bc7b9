//! Command policy configuration.
//!
//! ```kdl
//! policy {
//!     allow "git" "clone" "checkout" "push"
//!     allow "python3" "-m"
//!     protected-branch "main" "master" "release"
//!     redact "corp_[a-z0-9]{32}" "[REDACTED_CORP_TOKEN]"
//!     validate "python3" "-m" "compileall" "."
//! }
//! ```
//!
//! `allow` and `protected-branch` replace the defaults when present;
//! `redact` rules run after the built-in ones.

use crate::kdl_ext::get_all_string_args;
use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A permitted (program, primary subcommand) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowRule {
    pub program: String,
    pub subcommand: String,
}

impl AllowRule {
    pub fn new(program: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.into(),
        }
    }
}

/// A redaction rule: every match of `pattern` becomes `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRule {
    pub pattern: String,
    pub replacement: String,
}

impl RedactionRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    pub allow: Vec<AllowRule>,
    pub protected_branches: Vec<String>,
    /// Applied in order.
    pub redaction: Vec<RedactionRule>,
    /// Local validation commands run best-effort after the template is applied.
    pub validation: Vec<Vec<String>>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            allow: default_allow_rules(),
            protected_branches: vec!["main".to_string(), "master".to_string()],
            redaction: default_redaction_rules(),
            validation: vec![vec![
                "python3".to_string(),
                "-m".to_string(),
                "compileall".to_string(),
                ".".to_string(),
            ]],
        }
    }
}

impl PolicySettings {
    pub fn is_allowed(&self, program: &str, subcommand: &str) -> bool {
        self.allow
            .iter()
            .any(|rule| rule.program == program && rule.subcommand == subcommand)
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.allow.is_empty() {
            return Err(ConfigError::invalid("policy.allow", "allowlist is empty"));
        }
        for rule in &self.redaction {
            Regex::new(&rule.pattern).map_err(|e| {
                ConfigError::invalid("policy.redact", format!("{}: {e}", rule.pattern))
            })?;
        }
        for command in &self.validation {
            match command.as_slice() {
                [program, subcommand, ..] if self.is_allowed(program, subcommand) => {}
                _ => {
                    return Err(ConfigError::invalid(
                        "policy.validate",
                        format!("command not allowlisted: {}", command.join(" ")),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_allow_rules() -> Vec<AllowRule> {
    let git = [
        "clone",
        "checkout",
        "config",
        "add",
        "status",
        "commit",
        "push",
        "remote",
        "rev-parse",
    ];
    git.into_iter()
        .map(|sub| AllowRule::new("git", sub))
        .chain(std::iter::once(AllowRule::new("python3", "-m")))
        .collect()
}

/// Built-in rules. Shapes follow GitHub and common provider token formats.
pub fn default_redaction_rules() -> Vec<RedactionRule> {
    vec![
        RedactionRule::new(r"x-access-token:[^@\s]+@", "x-access-token:[REDACTED]@"),
        RedactionRule::new(
            r"(?i)(authorization:\s*bearer\s+)[^\s'\x22]+",
            "${1}[REDACTED]",
        ),
        RedactionRule::new(
            r"([a-zA-Z][a-zA-Z0-9+.-]*://)[^/\s:@]+:[^/\s@]+@",
            "${1}[REDACTED]@",
        ),
        RedactionRule::new(r"gh[pousr]_[A-Za-z0-9_]+", "[REDACTED_GITHUB_TOKEN]"),
        RedactionRule::new(r"github_pat_[A-Za-z0-9_]+", "[REDACTED_GITHUB_TOKEN]"),
        RedactionRule::new(r"sk-[A-Za-z0-9_-]{20,}", "[REDACTED_API_KEY]"),
        RedactionRule::new(r"AKIA[0-9A-Z]{16}", "[REDACTED_API_KEY]"),
    ]
}

pub(crate) fn parse_policy(node: &KdlNode) -> ConfigResult<PolicySettings> {
    let mut settings = PolicySettings::default();
    let mut allow = Vec::new();
    let mut protected = Vec::new();
    let mut validation = Vec::new();
    let mut saw_validate = false;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "allow" => {
                    let args = get_all_string_args(child);
                    let (program, subcommands) = args
                        .split_first()
                        .ok_or_else(|| ConfigError::MissingField("policy.allow program".to_string()))?;
                    if subcommands.is_empty() {
                        return Err(ConfigError::invalid(
                            "policy.allow",
                            format!("'{program}' needs at least one subcommand"),
                        ));
                    }
                    for sub in subcommands {
                        let rule = AllowRule::new(program.clone(), sub.clone());
                        if allow.contains(&rule) {
                            return Err(ConfigError::Duplicate(format!(
                                "policy.allow {program} {sub}"
                            )));
                        }
                        allow.push(rule);
                    }
                }
                "protected-branch" => {
                    protected.extend(get_all_string_args(child));
                }
                "redact" => {
                    let args = get_all_string_args(child);
                    match args.as_slice() {
                        [pattern, replacement] => settings
                            .redaction
                            .push(RedactionRule::new(pattern.clone(), replacement.clone())),
                        [pattern] => settings
                            .redaction
                            .push(RedactionRule::new(pattern.clone(), "[REDACTED]")),
                        _ => {
                            return Err(ConfigError::invalid(
                                "policy.redact",
                                "expected a pattern and an optional replacement",
                            ));
                        }
                    }
                }
                "validate" => {
                    saw_validate = true;
                    let argv = get_all_string_args(child);
                    if argv.is_empty() {
                        return Err(ConfigError::MissingField("policy.validate command".to_string()));
                    }
                    validation.push(argv);
                }
                "no-validation" => {
                    saw_validate = true;
                }
                _ => {}
            }
        }
    }

    if !allow.is_empty() {
        settings.allow = allow;
    }
    if !protected.is_empty() {
        settings.protected_branches = protected;
    }
    if saw_validate {
        settings.validation = validation;
    }
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdl::KdlDocument;

    fn policy_node(kdl: &str) -> ConfigResult<PolicySettings> {
        let doc: KdlDocument = kdl.parse()?;
        let node = doc
            .nodes()
            .iter()
            .find(|n| n.name().value() == "policy")
            .expect("policy node");
        parse_policy(node)
    }

    #[test]
    fn test_defaults_cover_git_workflow() {
        let policy = PolicySettings::default();
        for sub in ["clone", "checkout", "add", "commit", "push", "status"] {
            assert!(policy.is_allowed("git", sub), "git {sub}");
        }
        assert!(policy.is_allowed("python3", "-m"));
        assert!(!policy.is_allowed("curl", "https://example.com"));
        assert!(!policy.is_allowed("git", "reset"));
        policy.validate().unwrap();
    }

    #[test]
    fn test_allow_replaces_defaults() {
        let policy = policy_node(
            r#"
            policy {
                allow "git" "clone" "push"
                no-validation
            }
            "#,
        )
        .unwrap();
        assert_eq!(
            policy.allow,
            vec![AllowRule::new("git", "clone"), AllowRule::new("git", "push")]
        );
        assert!(!policy.is_allowed("python3", "-m"));
        assert!(policy.validation.is_empty());
    }

    #[test]
    fn test_validation_must_be_allowlisted() {
        let result = policy_node(
            r#"
            policy {
                validate "make" "test"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_redact_rules_append_to_defaults() {
        let policy = policy_node(
            r#"
            policy {
                redact "corp_[a-z0-9]{8}" "[CORP]"
                redact "internal-[0-9]+"
            }
            "#,
        )
        .unwrap();
        let defaults = default_redaction_rules().len();
        assert_eq!(policy.redaction.len(), defaults + 2);
        assert_eq!(policy.redaction[defaults].replacement, "[CORP]");
        assert_eq!(policy.redaction[defaults + 1].replacement, "[REDACTED]");
    }

    #[test]
    fn test_invalid_redaction_pattern_rejected() {
        let result = policy_node(
            r#"
            policy {
                redact "([unclosed" "x"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_duplicate_allow_rule_rejected() {
        let result = policy_node(
            r#"
            policy {
                allow "git" "push"
                allow "git" "push"
            }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_protected_branches_and_no_validation() {
        let policy = policy_node(
            r#"
            policy {
                protected-branch "trunk" "release"
                no-validation
            }
            "#,
        )
        .unwrap();
        assert_eq!(policy.protected_branches, vec!["trunk", "release"]);
        assert!(policy.validation.is_empty());
    }
}
