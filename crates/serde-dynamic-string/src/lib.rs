//! A `FromStr`-based wrapper that expands `{{ env.VAR }}` placeholders found
//! inside configuration strings before handing the result to the inner type's
//! own parser.
//!
//! Used by `config` to let TOML files reference environment variables for
//! secrets (API keys, tokens) without baking them into the file:
//!
//! ```toml
//! api_key = "{{ env.NVIDIA_NIM_API_KEY }}"
//! ```

use std::{fmt, str::FromStr};

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Matches `{{ env.NAME }}` (whitespace around `NAME` is tolerated).
fn placeholder_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"))
}

/// Error returned when a referenced environment variable is missing or not
/// valid UTF-8, or when the expanded string doesn't parse as `T`.
#[derive(Debug)]
pub struct DynamicStringError {
    message: String,
}

impl fmt::Display for DynamicStringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DynamicStringError {}

/// A value parsed from a string that may contain `{{ env.VAR }}`
/// placeholders, resolved eagerly at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicString<T>(T);

impl<T> DynamicString<T> {
    /// Consume the wrapper, returning the resolved inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl DynamicString<String> {
    /// Expand all `{{ env.VAR }}` placeholders in `input`, reading each
    /// variable from the process environment.
    fn expand(input: &str) -> Result<String, DynamicStringError> {
        let re = placeholder_regex();

        if !re.is_match(input) {
            return Ok(input.to_string());
        }

        let mut errors = Vec::new();
        let expanded = re.replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];

            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    errors.push(name.to_string());
                    String::new()
                }
            }
        });

        if !errors.is_empty() {
            return Err(DynamicStringError {
                message: format!("missing environment variable(s): {}", errors.iter().join(", ")),
            });
        }

        Ok(expanded.into_owned())
    }
}

impl<T> FromStr for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Err = DynamicStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = DynamicString::<String>::expand(s)?;

        let value = expanded.parse::<T>().map_err(|err| DynamicStringError {
            message: format!("failed to parse expanded value '{expanded}': {err}"),
        })?;

        Ok(DynamicString(value))
    }
}

impl<T> fmt::Display for DynamicString<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de, T> Deserialize<'de> for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DynamicString::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_without_placeholder() {
        let value = DynamicString::<String>::from_str("plain-value").unwrap();
        assert_eq!(value.into_inner(), "plain-value");
    }

    #[test]
    fn expands_env_var() {
        temp_env::with_var("DYNAMIC_STRING_TEST_VAR", Some("secret"), || {
            let value = DynamicString::<String>::from_str("{{ env.DYNAMIC_STRING_TEST_VAR }}").unwrap();
            assert_eq!(value.into_inner(), "secret");
        });
    }

    #[test]
    fn expands_inside_larger_string() {
        temp_env::with_var("DYNAMIC_STRING_TEST_HOST", Some("example.com"), || {
            let value = DynamicString::<String>::from_str("https://{{ env.DYNAMIC_STRING_TEST_HOST }}/v1").unwrap();
            assert_eq!(value.into_inner(), "https://example.com/v1");
        });
    }

    #[test]
    fn missing_env_var_errors() {
        temp_env::with_var_unset("DYNAMIC_STRING_TEST_MISSING", || {
            let result = DynamicString::<String>::from_str("{{ env.DYNAMIC_STRING_TEST_MISSING }}");
            assert!(result.is_err());
        });
    }

    #[test]
    fn parses_into_non_string_type() {
        temp_env::with_var("DYNAMIC_STRING_TEST_PORT", Some("8080"), || {
            let value = DynamicString::<u16>::from_str("{{ env.DYNAMIC_STRING_TEST_PORT }}").unwrap();
            assert_eq!(value.into_inner(), 8080);
        });
    }
}
