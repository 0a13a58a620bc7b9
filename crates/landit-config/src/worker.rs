//! Worker configuration parsing.
//!
//! A complete file looks like:
//!
//! ```kdl
//! worker "worker-1" {
//!     poll-interval-secs 3
//!     workspaces "/var/lib/landit/workspaces"
//!     artifacts "/var/lib/landit/jobs"
//!     templates "/etc/landit/templates"
//!     command-timeout-secs 900
//!     database "postgres://landit@localhost/landit"
//! }
//! github {
//!     api-url "https://api.github.com"
//!     clone-host "github.com"
//!     token-file "/run/secrets/github_pat.txt"
//! }
//! git {
//!     author name="landit-bot" email="landit-bot@users.noreply.github.com"
//!     co-author name="Jane Doe" email="jane@example.com"
//! }
//! ci {
//!     required-check "tests"
//!     attempts 2
//!     poll-interval-secs 15
//!     attempt-deadline-secs 1800
//! }
//! model {
//!     provider-base-url "http://llm.internal:8000/v1"
//!     name "coder"
//!     temperature "0.2"
//!     max-tokens "4096"
//! }
//! policy { ... }
//! ```
//!
//! Every section and field is optional; missing values keep their defaults.

use crate::kdl_ext::{
    get_first_string_arg, get_string_prop, require_path, require_secs, require_string, require_u64,
};
use crate::policy::{PolicySettings, parse_policy};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use landit_core::gateway::Author;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on CI attempts accepted from configuration.
const MAX_CI_ATTEMPTS: u32 = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanditConfig {
    pub worker: WorkerSettings,
    pub github: GitHubSettings,
    pub git: GitSettings,
    pub ci: CiSettings,
    pub model: ModelSettings,
    pub policy: PolicySettings,
}

impl LanditConfig {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        parse_config(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub id: String,
    pub poll_interval: Duration,
    pub workspaces_dir: PathBuf,
    pub artifact_root: PathBuf,
    pub templates_dir: PathBuf,
    pub command_timeout: Duration,
    pub database_url: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            id: "worker".to_string(),
            poll_interval: Duration::from_secs(3),
            workspaces_dir: PathBuf::from("/workspaces"),
            artifact_root: PathBuf::from("/data/landit/jobs"),
            templates_dir: PathBuf::from("/app/templates"),
            command_timeout: Duration::from_secs(900),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSettings {
    pub api_url: String,
    /// Host used for clone URLs, e.g. `github.com`.
    pub clone_host: String,
    pub token_file: PathBuf,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            clone_host: "github.com".to_string(),
            token_file: PathBuf::from("/run/secrets/github_pat.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSettings {
    pub author: Author,
    /// Added as a `Co-authored-by` trailer when set.
    pub co_author: Option<Author>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            author: Author {
                name: "landit-bot".to_string(),
                email: "landit-bot@users.noreply.github.com".to_string(),
            },
            co_author: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiSettings {
    pub required_check: String,
    /// Total polling attempts; each failed attempt but the last triggers a remediation.
    pub attempts: u32,
    pub poll_interval: Duration,
    pub attempt_deadline: Duration,
}

impl Default for CiSettings {
    fn default() -> Self {
        Self {
            required_check: "tests".to_string(),
            attempts: 2,
            poll_interval: Duration::from_secs(15),
            attempt_deadline: Duration::from_secs(1800),
        }
    }
}

/// Model provider settings, recorded on each job as a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub provider_base_url: String,
    pub model: String,
    pub temperature: String,
    pub max_tokens: String,
}

impl ModelSettings {
    /// Names of the fields that are still blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("provider_base_url", &self.provider_base_url),
            ("model", &self.model),
            ("temperature", &self.temperature),
            ("max_tokens", &self.max_tokens),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "provider_base_url": self.provider_base_url,
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// Parse a configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<LanditConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = LanditConfig::default();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        let name = node.name().value();
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::Duplicate(format!("section '{name}'")));
        }
        match name {
            "worker" => config.worker = parse_worker(node)?,
            "github" => config.github = parse_github(node)?,
            "git" => config.git = parse_git(node)?,
            "ci" => config.ci = parse_ci(node)?,
            "model" => config.model = parse_model(node)?,
            "policy" => config.policy = parse_policy(node)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_worker(node: &KdlNode) -> ConfigResult<WorkerSettings> {
    let mut settings = WorkerSettings::default();
    if let Some(id) = get_first_string_arg(node) {
        settings.id = id;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "poll-interval-secs" => {
                    settings.poll_interval = require_secs(child, "worker.poll-interval-secs")?;
                }
                "workspaces" => settings.workspaces_dir = require_path(child, "worker.workspaces")?,
                "artifacts" => settings.artifact_root = require_path(child, "worker.artifacts")?,
                "templates" => settings.templates_dir = require_path(child, "worker.templates")?,
                "command-timeout-secs" => {
                    settings.command_timeout = require_secs(child, "worker.command-timeout-secs")?;
                }
                "database" => {
                    settings.database_url = Some(require_string(child, "worker.database")?);
                }
                _ => {}
            }
        }
    }

    if settings.id.trim().is_empty() {
        return Err(ConfigError::invalid("worker", "id must not be empty"));
    }
    Ok(settings)
}

fn parse_github(node: &KdlNode) -> ConfigResult<GitHubSettings> {
    let mut settings = GitHubSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "api-url" => settings.api_url = require_string(child, "github.api-url")?,
                "clone-host" => settings.clone_host = require_string(child, "github.clone-host")?,
                "token-file" => settings.token_file = require_path(child, "github.token-file")?,
                _ => {}
            }
        }
    }

    let parsed = url::Url::parse(&settings.api_url)
        .map_err(|e| ConfigError::invalid("github.api-url", e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "github.api-url",
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    settings.api_url = settings.api_url.trim_end_matches('/').to_string();

    if settings.clone_host.is_empty() || settings.clone_host.contains(['/', '@', ' ']) {
        return Err(ConfigError::invalid(
            "github.clone-host",
            "expected a bare host name",
        ));
    }
    Ok(settings)
}

fn parse_author(node: &KdlNode, field: &str) -> ConfigResult<Author> {
    let name = get_string_prop(node, "name")
        .ok_or_else(|| ConfigError::MissingField(format!("{field} name")))?;
    let email = get_string_prop(node, "email")
        .ok_or_else(|| ConfigError::MissingField(format!("{field} email")))?;
    if !email.contains('@') {
        return Err(ConfigError::invalid(field, format!("invalid email '{email}'")));
    }
    Ok(Author { name, email })
}

fn parse_git(node: &KdlNode) -> ConfigResult<GitSettings> {
    let mut settings = GitSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "author" => settings.author = parse_author(child, "git.author")?,
                "co-author" => settings.co_author = Some(parse_author(child, "git.co-author")?),
                _ => {}
            }
        }
    }
    Ok(settings)
}

fn parse_ci(node: &KdlNode) -> ConfigResult<CiSettings> {
    let mut settings = CiSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "required-check" => {
                    settings.required_check = require_string(child, "ci.required-check")?;
                }
                "attempts" => {
                    let attempts = require_u64(child, "ci.attempts")?;
                    settings.attempts = u32::try_from(attempts)
                        .ok()
                        .filter(|n| (1..=MAX_CI_ATTEMPTS).contains(n))
                        .ok_or_else(|| {
                            ConfigError::invalid(
                                "ci.attempts",
                                format!("must be between 1 and {MAX_CI_ATTEMPTS}"),
                            )
                        })?;
                }
                "poll-interval-secs" => {
                    settings.poll_interval = require_secs(child, "ci.poll-interval-secs")?;
                }
                "attempt-deadline-secs" => {
                    settings.attempt_deadline = require_secs(child, "ci.attempt-deadline-secs")?;
                }
                _ => {}
            }
        }
    }

    if settings.required_check.trim().is_empty() {
        return Err(ConfigError::invalid("ci.required-check", "must not be empty"));
    }
    Ok(settings)
}

fn parse_model(node: &KdlNode) -> ConfigResult<ModelSettings> {
    let mut settings = ModelSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "provider-base-url" => {
                    settings.provider_base_url = require_string(child, "model.provider-base-url")?;
                }
                "name" => settings.model = require_string(child, "model.name")?,
                "temperature" => settings.temperature = require_string(child, "model.temperature")?,
                "max-tokens" => settings.max_tokens = require_string(child, "model.max-tokens")?,
                _ => {}
            }
        }
    }
    Ok(settings)
}
