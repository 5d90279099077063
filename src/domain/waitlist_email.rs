use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("constant regex pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistEmail(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("Email is required.")]
    Missing,
    #[error("Please enter a valid email address.")]
    InvalidFormat,
}

impl WaitlistEmail {
    /// Absent and `null` values are missing; anything else is coerced to text.
    pub fn parse(raw: Option<&Value>) -> Result<Self, EmailError> {
        let raw = match raw {
            None | Some(Value::Null) => return Err(EmailError::Missing),
            Some(value) => coerce_to_string(value),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Missing);
        }
        if !EMAIL_PATTERN.is_match(trimmed) {
            return Err(EmailError::InvalidFormat);
        }

        Ok(Self(trimmed.to_lowercase()))
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(coerce_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

impl Display for WaitlistEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WaitlistEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
