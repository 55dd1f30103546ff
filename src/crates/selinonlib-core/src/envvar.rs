//! Environment-variable expansion for queue names.
//!
//! Both `${VAR}` and bare `{VAR}` are recognised, mirroring Python's
//! `str.format(**os.environ)` call the original used for the same purpose.
//! A variable with no matching process environment entry is a build-time
//! `ConfigurationError`, never a silent empty substitution.

use crate::error::{Result, SelinonError};

/// Expands every `${VAR}` / `{VAR}` occurrence in `raw` against the process
/// environment. Plain text with no braces passes through unchanged.
pub fn expand(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        let mut closed = false;
        for (_, c2) in chars.by_ref() {
            if c2 == '}' {
                closed = true;
                break;
            }
            name.push(c2);
        }
        if !closed {
            return Err(SelinonError::Configuration(format!(
                "unterminated '{{' in queue name '{raw}'"
            )));
        }
        let name = name.strip_prefix('$').unwrap_or(&name);
        let value = std::env::var(name).map_err(|_| SelinonError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(expand("plain_queue").unwrap(), "plain_queue");
    }

    #[test]
    fn brace_and_dollar_brace_forms_both_expand() {
        std::env::set_var("SELINONLIB_TEST_QUEUE_ENV", "prod");
        assert_eq!(expand("queue_{SELINONLIB_TEST_QUEUE_ENV}").unwrap(), "queue_prod");
        assert_eq!(expand("queue_${SELINONLIB_TEST_QUEUE_ENV}").unwrap(), "queue_prod");
        std::env::remove_var("SELINONLIB_TEST_QUEUE_ENV");
    }

    #[test]
    fn missing_variable_is_a_configuration_error() {
        std::env::remove_var("SELINONLIB_TEST_QUEUE_ENV_MISSING");
        assert!(expand("queue_{SELINONLIB_TEST_QUEUE_ENV_MISSING}").is_err());
    }
}
