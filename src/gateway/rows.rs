use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::errors::GatewayError;

/// A loosely-typed record from a remote query or a decoded payload object.
///
/// Keys are normalised (lowercase, no spaces or underscores) so that
/// `"Job Code"`, `"JobCode"` and `"jobcode"` all address the same field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

fn normalise(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Row {
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (normalise(k.as_ref()), v))
                .collect(),
        }
    }

    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self::from_pairs(object.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }

    /// Non-null value for a key
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(&normalise(key)).filter(|v| !v.is_null())
    }

    /// Trimmed, non-empty text; numbers are rendered
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.value(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.to_string(),
                None => n.to_string(),
            },
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Integer value; integral floats and numeric strings are accepted
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.value(key)? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.value(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Date from an ISO date or timestamp string
    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        let text = self.text(key)?;
        let prefix = text.get(..10)?;
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
    }

    /// First present text among several aliases
    pub fn text_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    pub fn require_text(&self, context: &str, key: &str) -> Result<String, GatewayError> {
        self.text(key).ok_or_else(|| GatewayError::missing(context, key))
    }

    pub fn require_int(&self, context: &str, key: &str) -> Result<i64, GatewayError> {
        self.int(key).ok_or_else(|| GatewayError::missing(context, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_matched_loosely() {
        let row = Row::from_pairs([("Job Code", json!(" P4J-1 ")), ("PONum", json!(5001))]);
        assert_eq!(row.text("JobCode").as_deref(), Some("P4J-1"));
        assert_eq!(row.text("job_code").as_deref(), Some("P4J-1"));
        assert_eq!(row.int("ponum"), Some(5001));
    }

    #[test]
    fn numeric_coercions() {
        let row = Row::from_pairs([
            ("a", json!("42")),
            ("b", json!(7.0)),
            ("c", json!(7.5)),
            ("d", json!("2026-02-01 00:00:00")),
            ("e", json!(null)),
            ("f", json!("")),
        ]);
        assert_eq!(row.int("a"), Some(42));
        assert_eq!(row.int("b"), Some(7));
        assert_eq!(row.int("c"), None);
        assert_eq!(row.float("c"), Some(7.5));
        assert_eq!(row.date("d"), NaiveDate::from_ymd_opt(2026, 2, 1));
        assert!(row.value("e").is_none());
        assert!(row.text("f").is_none());
        assert!(row.require_text("order", "f").is_err());
    }
}
