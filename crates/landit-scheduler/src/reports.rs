//! Markdown and JSON documents written to the artifact sink.

use landit_core::Job;
use serde_json::{Value, json};

use crate::CiReport;

pub const PREFLIGHT_REPORT: &str = "PREFLIGHT_REPORT.md";
pub const SPEC_MD: &str = "SPEC.md";
pub const SPEC_JSON: &str = "SPEC.json";
pub const ARCHITECTURE: &str = "ARCHITECTURE.md";
pub const BOOTSTRAP_TICKET: &str = "TICKETS/0001-bootstrap.md";
pub const INTEGRATION_REPORT: &str = "INTEGRATION_REPORT.md";
pub const FINAL_SUMMARY: &str = "FINAL_SUMMARY.md";
pub const TEST_REPORT: &str = "TEST_REPORT.md";
pub const SECURITY_NOTES: &str = "SECURITY_NOTES.md";

const ACCEPTANCE: [&str; 2] = ["pull request opened", "required check green"];

pub fn preflight_report(job: &Job, required_check: &str, model: &Value) -> String {
    format!(
        "# Preflight report\n\n\
         - repository: {repo}\n\
         - trace id: {trace}\n\
         - credentials: token file readable\n\
         - git auth: askpass helper, verified on clone and push\n\
         - model: {model}\n\
         - required check: {required_check}\n",
        repo = job.full_name(),
        trace = job.trace_id,
        model = model.get("model").and_then(Value::as_str).unwrap_or("unknown"),
    )
}

pub fn spec_markdown(job: &Job) -> String {
    let acceptance: String = ACCEPTANCE.iter().map(|a| format!("- {a}\n")).collect();
    format!("# Spec\n\n## Task\n\n{}\n\n## Acceptance\n\n{acceptance}", job.task)
}

pub fn spec_json(job: &Job) -> Value {
    json!({
        "scope": job.task,
        "acceptance": ACCEPTANCE,
        "repository": job.full_name(),
        "template": job.template,
    })
}

pub fn architecture(job: &Job) -> String {
    format!(
        "# Architecture\n\n\
         - template `{}` applied onto `{}`\n\
         - worker: policy-gated git and local validation\n\
         - job store plus per-job artifact directory\n\
         - landing: draft pull request gated on CI\n",
        job.template,
        job.full_name()
    )
}

pub fn bootstrap_ticket(allowed: &[String], validation: &[Vec<String>]) -> String {
    let mut out = String::from("# Ticket 0001: bootstrap\n\n- Goal: scaffold, validate and land\n\n## Allowed commands\n\n");
    for command in allowed {
        out.push_str(&format!("- `{command}`\n"));
    }
    out.push_str("\n## Local validation\n\n");
    if validation.is_empty() {
        out.push_str("- none configured\n");
    }
    for argv in validation {
        out.push_str(&format!("- `{}`\n", argv.join(" ")));
    }
    out
}

pub fn integration_report(branch: &str, base: &str, validation_ok: bool) -> String {
    format!(
        "# Integration report\n\n\
         - branch: {branch}\n\
         - base: {base}\n\
         - local validation: {}\n\
         - pushed: yes\n",
        if validation_ok { "passed" } else { "warnings, see logs/validation_warn.log" }
    )
}

pub fn final_summary(job: &Job, ci: &CiReport) -> String {
    format!(
        "# Final summary\n\n\
         - trace id: {}\n\
         - repository: {}\n\
         - pull request: {}\n\
         - ci: {}\n\
         - remediation attempts: {}\n",
        job.trace_id,
        job.full_name(),
        ci.pr_url,
        ci.outcome,
        ci.remediations
    )
}

pub fn test_report(required_check: &str, ci: &CiReport) -> String {
    format!(
        "# Test report\n\n\
         - required check: {required_check}\n\
         - head: {}\n\
         - ci: {}\n\
         - check log: logs/ci_checks.log\n",
        ci.head_sha.as_deref().unwrap_or("unknown"),
        ci.outcome
    )
}

pub fn security_notes(protected: &[String]) -> String {
    format!(
        "# Security notes\n\n\
         - deny-by-default command policy\n\
         - protected branches: {}, plus the repository default branch\n\
         - secrets redacted in every log and report\n\
         - credentials supplied through GIT_ASKPASS, never in URLs or argv\n\
         - worker refuses to run as root\n",
        protected.join(", ")
    )
}
