//! Access-control rules for the entry point.
//!
//! Rules are scanned in order; the first whose condition matches produces
//! the verdict. An explicitly provided ACL file that fails to load aborts
//! startup; running with a silently gutted ACL would be worse than not
//! starting.

use std::path::Path;

use axum::http::StatusCode;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::RequestMeta;

/// Verdict of an ACL evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Explicitly allowed; the pipeline continues and no later rule runs.
    Allow,
    /// Refused with the given status and optional body.
    Deny(StatusCode, Option<String>),
    /// No rule matched, or a matching rule declined to decide.
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AclAction {
    Allow,
    Deny,
    Other,
}

#[derive(Debug, Deserialize)]
struct AclRuleSpec {
    name: String,
    condition: String,
    value: serde_yaml::Value,
    action: AclAction,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AclFile {
    rules: Vec<AclRuleSpec>,
}

#[derive(Debug, Error)]
pub enum AclError {
    #[error("failed to read ACL file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse ACL file {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("ACL rule {name}: unknown condition {condition}")]
    UnknownCondition { name: String, condition: String },
    #[error("ACL rule {name}: invalid regex: {reason}")]
    InvalidRegex { name: String, reason: String },
}

#[derive(Debug, Clone)]
enum Matcher {
    SrcIp(String),
    PathPrefix(String),
    PathRegex(Regex),
    Method(String),
    UserAgentContains(String),
}

impl Matcher {
    fn matches(&self, meta: &RequestMeta<'_>) -> bool {
        match self {
            Matcher::SrcIp(ip) => meta.remote_ip.to_string() == *ip,
            Matcher::PathPrefix(prefix) => meta.uri.path().starts_with(prefix),
            Matcher::PathRegex(re) => re.is_match(meta.uri.path()),
            Matcher::Method(method) => meta.method.as_str().eq_ignore_ascii_case(method),
            Matcher::UserAgentContains(needle) => meta
                .headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(|ua| ua.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()))
                .unwrap_or(false),
        }
    }
}

/// One compiled ACL rule.
#[derive(Debug, Clone)]
pub struct AclRule {
    name: String,
    matcher: Matcher,
    action: AclAction,
    deny_status: StatusCode,
    deny_body: Option<String>,
}

/// Ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct AclConfig {
    rules: Vec<AclRule>,
}

impl AclConfig {
    /// First match wins; no match is `Passthrough`.
    pub fn evaluate(&self, meta: &RequestMeta<'_>) -> Verdict {
        for rule in &self.rules {
            if rule.matcher.matches(meta) {
                tracing::debug!(rule = %rule.name, action = ?rule.action, "ACL rule matched");
                return match rule.action {
                    AclAction::Allow => Verdict::Allow,
                    AclAction::Deny => Verdict::Deny(rule.deny_status, rule.deny_body.clone()),
                    AclAction::Other => Verdict::Passthrough,
                };
            }
        }
        Verdict::Passthrough
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn yaml_value_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn compile_rule(spec: &AclRuleSpec) -> Result<AclRule, AclError> {
    let value = yaml_value_string(&spec.value);
    let matcher = match spec.condition.as_str() {
        "src-ip" => Matcher::SrcIp(value),
        "path-prefix" => Matcher::PathPrefix(value),
        "path-regex" => Matcher::PathRegex(Regex::new(&value).map_err(|e| {
            AclError::InvalidRegex {
                name: spec.name.clone(),
                reason: e.to_string(),
            }
        })?),
        "method" => Matcher::Method(value),
        "user-agent-contains" => Matcher::UserAgentContains(value),
        other => {
            return Err(AclError::UnknownCondition {
                name: spec.name.clone(),
                condition: other.to_string(),
            })
        }
    };

    let mut deny_status = StatusCode::FORBIDDEN;
    let mut deny_body = None;
    for option in &spec.options {
        if let Some(code) = option.strip_prefix("status=") {
            deny_status = code
                .parse::<u16>()
                .ok()
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::FORBIDDEN);
        } else if let Some(body) = option.strip_prefix("body=") {
            deny_body = Some(body.to_string());
        }
    }

    Ok(AclRule {
        name: spec.name.clone(),
        matcher,
        action: spec.action,
        deny_status,
        deny_body,
    })
}

/// Load and compile an ACL file. Any failure is fatal to the caller.
pub fn load(path: &Path) -> Result<AclConfig, AclError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AclError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: AclFile = serde_yaml::from_str(&raw).map_err(|e| AclError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rules = file
        .rules
        .iter()
        .map(compile_rule)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(count = rules.len(), path = %path.display(), "ACL rules loaded");
    Ok(AclConfig { rules })
}
