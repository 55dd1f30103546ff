//! Lexical rules for node, flow, and storage names.

use crate::error::{Result, SelinonError};

/// Returns `Ok(())` if `name` matches `[_A-Za-z][_A-Za-z0-9]*`, the identifier
/// grammar shared by every `name` field in `Task`, `Flow`, `Storage`, and
/// `TaskClass`.
pub fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| {
        SelinonError::Configuration("identifier must not be empty".to_string())
    })?;

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SelinonError::Configuration(format!(
            "'{name}' is not a valid identifier: must start with a letter or underscore"
        )));
    }

    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(SelinonError::Configuration(format!(
            "'{name}' is not a valid identifier: illegal character '{bad}'"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        for name in ["Task1", "_private", "a", "flow_2", "A_B_C9"] {
            assert!(check_identifier(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_identifiers() {
        for name in ["", "1task", "task-name", "task name", "tásk"] {
            assert!(check_identifier(name).is_err(), "{name} should be invalid");
        }
    }
}
