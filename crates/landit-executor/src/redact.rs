//! Secret redaction applied at every text sink.

use landit_config::RedactionRule;
use landit_config::policy::default_redaction_rules;
use landit_core::{Error, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    /// Compile `rules`, applied in order.
    pub fn new(rules: &[RedactionRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|e| {
                        Error::Configuration(format!("invalid redaction pattern {}: {e}", rule.pattern))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The built-in rules only.
    pub fn with_defaults() -> Self {
        let rules = default_redaction_rules()
            .into_iter()
            .filter_map(|rule| Regex::new(&rule.pattern).ok().map(|re| (re, rule.replacement)))
            .collect();
        Self { rules }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, replacement) in &self.rules {
            if re.is_match(&out) {
                out = re.replace_all(&out, replacement.as_str()).into_owned();
            }
        }
        out
    }

    /// Redact then truncate to `max` characters.
    pub fn redact_truncated(&self, text: &str, max: usize) -> String {
        landit_core::error::truncate(&self.redact(text), max)
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::with_defaults()
    }
}
