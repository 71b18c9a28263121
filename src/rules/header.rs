//! Response header rewrite engine.
//!
//! Rules are declared in YAML (`header_rules:` list), compiled once at
//! load, and applied in order to every proxied response. Later rules see
//! the effects of earlier ones. A rule that fails to compile is logged and
//! skipped; rule failures never surface in a response.

use std::path::Path;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use regex::Regex;
use serde::Deserialize;

/// Rewrite action, matching the YAML `action:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderAction {
    AddHeader,
    SetHeader,
    DelHeader,
    ReplaceHeader,
}

/// One rule as written in the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRuleSpec {
    pub action: HeaderAction,
    pub header: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub regex: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Deserialize)]
struct HeaderRulesFile {
    header_rules: Vec<HeaderRuleSpec>,
}

/// A compiled rule ready to apply.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    action: HeaderAction,
    name: HeaderName,
    value: Option<HeaderValue>,
    regex: Option<Regex>,
    replacement: String,
}

impl HeaderRule {
    /// Compile a spec. Returns `None` (after logging) when the header name,
    /// value, or regex does not compile; the caller drops the rule.
    pub fn compile(spec: &HeaderRuleSpec) -> Option<Self> {
        let name = match spec.header.parse::<HeaderName>() {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(header = %spec.header, error = %e, "skipping header rule with invalid name");
                return None;
            }
        };

        let value = if matches!(spec.action, HeaderAction::AddHeader | HeaderAction::SetHeader) {
            match HeaderValue::from_str(&spec.value) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(header = %spec.header, error = %e, "skipping header rule with invalid value");
                    return None;
                }
            }
        } else {
            None
        };

        // An empty regex makes replace-header a declared no-op.
        let regex = if spec.action == HeaderAction::ReplaceHeader && !spec.regex.is_empty() {
            match Regex::new(&spec.regex) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(header = %spec.header, error = %e, "skipping header rule with invalid regex");
                    return None;
                }
            }
        } else {
            None
        };

        Some(Self {
            action: spec.action,
            name,
            value,
            regex,
            replacement: spec.replacement.clone(),
        })
    }
}

/// Load and compile rules from a YAML file.
///
/// A missing or unparseable file degrades to the empty rule list; header
/// rewriting is an optional feature and must not block startup.
pub fn load(path: &Path) -> Vec<HeaderRule> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read header rules file");
            return Vec::new();
        }
    };

    let file: HeaderRulesFile = match serde_yaml::from_str(&raw) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse header rules file");
            return Vec::new();
        }
    };

    let rules: Vec<HeaderRule> = file
        .header_rules
        .iter()
        .filter_map(HeaderRule::compile)
        .collect();
    tracing::info!(count = rules.len(), path = %path.display(), "header rules loaded");
    rules
}

/// Apply all rules, in order, to a header map.
pub fn apply(rules: &[HeaderRule], headers: &mut HeaderMap) {
    for rule in rules {
        match rule.action {
            HeaderAction::AddHeader => {
                if let Some(value) = &rule.value {
                    headers.append(rule.name.clone(), value.clone());
                }
            }
            HeaderAction::SetHeader => {
                if let Some(value) = &rule.value {
                    headers.insert(rule.name.clone(), value.clone());
                }
            }
            HeaderAction::DelHeader => {
                headers.remove(&rule.name);
            }
            HeaderAction::ReplaceHeader => {
                let Some(re) = &rule.regex else { continue };
                let values: Vec<HeaderValue> = headers.get_all(&rule.name).iter().cloned().collect();
                if values.is_empty() {
                    continue;
                }
                headers.remove(&rule.name);
                for value in values {
                    let rewritten = value
                        .to_str()
                        .ok()
                        .map(|s| re.replace_all(s, rule.replacement.as_str()).into_owned())
                        .and_then(|s| HeaderValue::from_str(&s).ok())
                        .unwrap_or(value);
                    headers.append(rule.name.clone(), rewritten);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(action: HeaderAction, header: &str, value: &str, regex: &str, replacement: &str) -> HeaderRuleSpec {
        HeaderRuleSpec {
            action,
            header: header.to_string(),
            value: value.to_string(),
            regex: regex.to_string(),
            replacement: replacement.to_string(),
        }
    }

    fn compile(specs: &[HeaderRuleSpec]) -> Vec<HeaderRule> {
        specs.iter().filter_map(HeaderRule::compile).collect()
    }

    #[test]
    fn set_header_replaces_all_occurrences_with_one() {
        let rules = compile(&[spec(HeaderAction::SetHeader, "x-frame-options", "DENY", "", "")]);
        let mut headers = HeaderMap::new();
        headers.append("x-frame-options", "SAMEORIGIN".parse().unwrap());
        headers.append("x-frame-options", "ALLOWALL".parse().unwrap());

        apply(&rules, &mut headers);

        let values: Vec<_> = headers.get_all("x-frame-options").iter().collect();
        assert_eq!(values, vec!["DENY"]);
    }

    #[test]
    fn set_header_creates_missing_header() {
        let rules = compile(&[spec(HeaderAction::SetHeader, "x-frame-options", "DENY", "", "")]);
        let mut headers = HeaderMap::new();

        apply(&rules, &mut headers);

        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get_all("x-frame-options").iter().count(), 1);
    }

    #[test]
    fn add_header_appends_new_occurrence() {
        let rules = compile(&[spec(HeaderAction::AddHeader, "set-cookie", "b=2", "", "")]);
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());

        apply(&rules, &mut headers);

        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn del_header_removes_all_occurrences() {
        let rules = compile(&[spec(HeaderAction::DelHeader, "server", "", "", "")]);
        let mut headers = HeaderMap::new();
        headers.append("server", "nginx".parse().unwrap());
        headers.append("server", "apache".parse().unwrap());

        apply(&rules, &mut headers);

        assert!(headers.get("server").is_none());
    }

    #[test]
    fn replace_header_rewrites_every_occurrence() {
        let rules = compile(&[spec(
            HeaderAction::ReplaceHeader,
            "server",
            "",
            r"nginx/[\d.]+",
            "nginx",
        )]);
        let mut headers = HeaderMap::new();
        headers.append("server", "nginx/1.25.3".parse().unwrap());
        headers.append("server", "nginx/1.24.0 (ubuntu)".parse().unwrap());

        apply(&rules, &mut headers);

        let values: Vec<_> = headers
            .get_all("server")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["nginx", "nginx (ubuntu)"]);
    }

    #[test]
    fn replace_header_supports_capture_groups() {
        let rules = compile(&[spec(
            HeaderAction::ReplaceHeader,
            "via",
            "",
            r"^(\d+\.\d+) .*$",
            "$1 hidden",
        )]);
        let mut headers = HeaderMap::new();
        headers.insert("via", "1.1 backend.internal".parse().unwrap());

        apply(&rules, &mut headers);

        assert_eq!(headers.get("via").unwrap(), "1.1 hidden");
    }

    #[test]
    fn replace_header_with_empty_regex_is_noop() {
        let rules = compile(&[spec(HeaderAction::ReplaceHeader, "server", "", "", "gone")]);
        let mut headers = HeaderMap::new();
        headers.insert("server", "nginx".parse().unwrap());

        apply(&rules, &mut headers);

        assert_eq!(headers.get("server").unwrap(), "nginx");
    }

    #[test]
    fn later_rules_see_earlier_effects() {
        let rules = compile(&[
            spec(HeaderAction::SetHeader, "x-powered-by", "rotagate", "", ""),
            spec(HeaderAction::DelHeader, "x-powered-by", "", "", ""),
        ]);
        let mut headers = HeaderMap::new();
        headers.insert("x-powered-by", "php".parse().unwrap());

        apply(&rules, &mut headers);

        assert!(headers.get("x-powered-by").is_none());
    }

    #[test]
    fn empty_rule_list_is_noop() {
        let mut headers = HeaderMap::new();
        headers.insert("server", "nginx".parse().unwrap());
        let before = headers.clone();

        apply(&[], &mut headers);

        assert_eq!(headers, before);
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let compiled = compile(&[
            spec(HeaderAction::ReplaceHeader, "server", "", "(unclosed", "x"),
            spec(HeaderAction::SetHeader, "x-frame-options", "DENY", "", ""),
        ]);
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn yaml_file_parses_into_specs() {
        let raw = "header_rules:\n  - action: set-header\n    header: X-Frame-Options\n    value: DENY\n  - action: replace-header\n    header: Server\n    regex: 'nginx/[0-9.]+'\n    replacement: nginx\n";
        let file: HeaderRulesFile = serde_yaml::from_str(raw).unwrap();
        assert_eq!(file.header_rules.len(), 2);
        assert_eq!(file.header_rules[0].action, HeaderAction::SetHeader);
        assert_eq!(file.header_rules[1].action, HeaderAction::ReplaceHeader);
    }
}
