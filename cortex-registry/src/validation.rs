//! `served_name` validation (spec.md §4.1).

use cortex_common::error::CortexError;
use regex::Regex;
use std::sync::LazyLock;

static SERVED_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,128}$").unwrap());

pub fn validate_served_name(name: &str) -> Result<(), CortexError> {
    if SERVED_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(CortexError::validation(
            "served_name",
            "must match [A-Za-z0-9._-]{1,128}",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        assert!(validate_served_name("llama-3.1-8b_instruct").is_ok());
    }

    #[test]
    fn rejects_spaces_and_slashes() {
        assert!(validate_served_name("llama 3/8b").is_err());
    }

    #[test]
    fn rejects_empty_and_overlong_names() {
        assert!(validate_served_name("").is_err());
        assert!(validate_served_name(&"a".repeat(129)).is_err());
    }
}
