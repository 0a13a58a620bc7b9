// Helper functions for extracting values from KDL nodes

use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use std::path::PathBuf;
use std::time::Duration;

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn require_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

pub(crate) fn require_path(node: &KdlNode, field: &str) -> ConfigResult<PathBuf> {
    require_string(node, field).map(PathBuf::from)
}

pub(crate) fn require_u64(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    u64::try_from(value)
        .map_err(|_| ConfigError::invalid(field, format!("expected a non-negative integer, got {value}")))
}

pub(crate) fn require_secs(node: &KdlNode, field: &str) -> ConfigResult<Duration> {
    let secs = require_u64(node, field)?;
    if secs == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}
