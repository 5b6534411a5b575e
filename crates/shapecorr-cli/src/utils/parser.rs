use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    MissingSeparator(String),

    #[error("Invalid {kind} value for '{key}': '{value}'")]
    InvalidValue {
        key: String,
        kind: &'static str,
        value: String,
    },

    #[error("Component '{component}' cannot be empty in '{text}'.")]
    EmptyComponent {
        component: &'static str,
        text: String,
    },
}

/// Splits `key=value` at the first `=`.
pub fn split_assignment(text: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| ParseError::MissingSeparator(text.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            text: text.to_string(),
        });
    }
    Ok((key, value.trim()))
}

pub fn parse_value<T: FromStr>(
    key: &str,
    kind: &'static str,
    value: &str,
) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        kind,
        value: value.to_string(),
    })
}

/// Parses a comma separated list such as `100,200,400`.
pub fn parse_list<T: FromStr>(
    key: &str,
    kind: &'static str,
    value: &str,
) -> Result<Vec<T>, ParseError> {
    if value.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "value",
            text: format!("{key}={value}"),
        });
    }
    value
        .split(',')
        .map(|item| parse_value(key, kind, item.trim()))
        .collect()
}
