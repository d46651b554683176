//! Structural validation of report candidates.
//!
//! A candidate only becomes a canonical [`Report`] once every field has the
//! right shape. All problems are collected rather than stopping at the first.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::core::{Fact, Report};
use crate::errors::{SchemaError, SchemaIssue};
use crate::utils::parse_iso_timestamp;

/// Validates a report candidate and converts it into a [`Report`].
pub fn validate_report(candidate: &Value) -> Result<Report, SchemaError> {
    let Some(obj) = candidate.as_object() else {
        return Err(SchemaError::new(vec![SchemaIssue::new(
            "__root__",
            format!("expected an object, got {}", type_name(candidate)),
        )]));
    };

    let mut issues = Vec::new();

    let title = required_string(obj, "title", "title", &mut issues);
    let summary = required_string(obj, "summary", "summary", &mut issues);
    let key_findings = string_list(obj.get("key_findings"), "key_findings", &mut issues);
    let facts = fact_list(obj.get("facts"), &mut issues);
    let generated_at = timestamp(obj.get("generated_at"), "generated_at", &mut issues);

    match (title, summary, key_findings, facts, generated_at) {
        (Some(title), Some(summary), Some(key_findings), Some(facts), Some(generated_at)) if issues.is_empty() => {
            Ok(Report {
                title,
                summary,
                key_findings,
                facts,
                generated_at,
            })
        }
        _ => Err(SchemaError::new(issues)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_string(obj: &Map<String, Value>, key: &str, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<String> {
    match obj.get(key) {
        None => {
            issues.push(SchemaIssue::new(path, "field required"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(SchemaIssue::new(path, format!("expected a string, got {}", type_name(other))));
            None
        }
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(SchemaIssue::new(path, format!("expected a string, got {}", type_name(other))));
            None
        }
    }
}

fn string_list(value: Option<&Value>, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<Vec<String>> {
    let items = match value {
        None => {
            issues.push(SchemaIssue::new(path, "field required"));
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            issues.push(SchemaIssue::new(path, format!("expected an array, got {}", type_name(other))));
            return None;
        }
    };

    let before = issues.len();
    let strings: Vec<String> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::String(s) => Some(s.clone()),
            other => {
                issues.push(SchemaIssue::new(
                    format!("{path}.{i}"),
                    format!("expected a string, got {}", type_name(other)),
                ));
                None
            }
        })
        .collect();

    (issues.len() == before).then_some(strings)
}

fn fact_list(value: Option<&Value>, issues: &mut Vec<SchemaIssue>) -> Option<Vec<Fact>> {
    let items = match value {
        None => {
            issues.push(SchemaIssue::new("facts", "field required"));
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            issues.push(SchemaIssue::new("facts", format!("expected an array, got {}", type_name(other))));
            return None;
        }
    };

    let before = issues.len();
    let facts: Vec<Fact> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| fact(item, &format!("facts.{i}"), issues))
        .collect();

    (issues.len() == before).then_some(facts)
}

fn fact(value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<Fact> {
    let Some(obj) = value.as_object() else {
        issues.push(SchemaIssue::new(path, format!("expected an object, got {}", type_name(value))));
        return None;
    };

    let source = required_string(obj, "source", &format!("{path}.source"), issues);
    let url_path = format!("{path}.url");
    let url = optional_string(obj, "url", &url_path, issues)
        .filter(|u| !u.trim().is_empty())
        .and_then(|u| match check_url(&u) {
            Ok(()) => Some(u),
            Err(message) => {
                issues.push(SchemaIssue::new(&url_path, message));
                None
            }
        });
    let excerpt = optional_string(obj, "excerpt", &format!("{path}.excerpt"), issues);
    let content = required_string(obj, "content", &format!("{path}.content"), issues);

    Some(Fact {
        source: source?,
        url,
        excerpt,
        content: content?,
    })
}

fn check_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(()),
        "http" | "https" => Err("URL has no host".to_string()),
        other => Err(format!("URL scheme '{other}' is not http or https")),
    }
}

fn timestamp(value: Option<&Value>, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<DateTime<Utc>> {
    match value {
        None => {
            issues.push(SchemaIssue::new(path, "field required"));
            None
        }
        Some(Value::String(s)) => match parse_iso_timestamp(s) {
            Ok(ts) => Some(ts),
            Err(e) => {
                issues.push(SchemaIssue::new(path, format!("invalid datetime: {e}")));
                None
            }
        },
        Some(Value::Number(n)) => {
            let parsed = n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .or_else(|| n.as_f64().and_then(from_fractional_seconds));
            if parsed.is_none() {
                issues.push(SchemaIssue::new(path, "invalid datetime: out of range"));
            }
            parsed
        }
        Some(other) => {
            issues.push(SchemaIssue::new(
                path,
                format!("expected a datetime, got {}", type_name(other)),
            ));
            None
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_fractional_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round();
    if millis.abs() > 8.0e15 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "title": "EV Adoption 2024",
            "summary": "Adoption accelerated.",
            "key_findings": ["Sales up", "Prices down"],
            "facts": [
                {"source": "IEA", "url": "https://iea.org/ev", "excerpt": "Sales rose", "content": "Sales rose 35%"},
                {"source": "Blog", "url": null, "content": "Charging expanded"}
            ],
            "generated_at": "2024-06-01T10:00:00Z"
        })
    }

    #[test]
    fn test_valid_report() {
        let report = validate_report(&valid()).unwrap();
        assert_eq!(report.title, "EV Adoption 2024");
        assert_eq!(report.key_findings.len(), 2);
        assert_eq!(report.facts[0].url.as_deref(), Some("https://iea.org/ev"));
        assert_eq!(report.facts[1].url, None);
        assert_eq!(report.facts[1].excerpt, None);
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = validate_report(&json!({"title": "t"})).unwrap_err();
        assert!(err.mentions("summary"));
        assert!(err.mentions("key_findings"));
        assert!(err.mentions("facts"));
        assert!(err.mentions("generated_at"));
        assert_eq!(err.issues.len(), 4);
    }

    #[test]
    fn test_list_element_types() {
        let mut candidate = valid();
        candidate["key_findings"] = json!(["ok", 3]);
        let err = validate_report(&candidate).unwrap_err();
        assert_eq!(err.issues, vec![SchemaIssue::new("key_findings.1", "expected a string, got number")]);
    }

    #[test]
    fn test_fact_fields() {
        let mut candidate = valid();
        candidate["facts"] = json!([{"url": "ftp://files.example.com", "content": 1}]);
        let err = validate_report(&candidate).unwrap_err();
        assert!(err.mentions("facts.0.source"));
        assert!(err.mentions("facts.0.url"));
        assert!(err.mentions("facts.0.content"));
    }

    #[test]
    fn test_empty_url_is_absent() {
        let mut candidate = valid();
        candidate["facts"] = json!([{"source": "s", "url": "", "content": "c"}]);
        let report = validate_report(&candidate).unwrap();
        assert_eq!(report.facts[0].url, None);
    }

    #[test]
    fn test_timestamp_forms() {
        let mut candidate = valid();
        candidate["generated_at"] = json!("2024-06-01 10:00:00");
        assert!(validate_report(&candidate).is_ok());

        candidate["generated_at"] = json!(1_717_236_000);
        assert!(validate_report(&candidate).is_ok());

        candidate["generated_at"] = json!("last tuesday");
        let err = validate_report(&candidate).unwrap_err();
        assert!(err.mentions("generated_at"));
    }

    #[test]
    fn test_non_object_candidate() {
        let err = validate_report(&json!(["not", "a", "report"])).unwrap_err();
        assert!(err.mentions("__root__"));
        assert!(err.to_string().starts_with("1 validation error(s) for Report"));
    }
}
