//! Identifier validation for names that end up inside engine commands.
//!
//! Schema identifiers are interpolated into `SET search_path`, so they are
//! held to a strict shape before any engine command runs.

use std::fmt;

/// Maximum length for schema identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Why an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter(char),
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::Empty => write!(f, "Identifier cannot be empty"),
            IdentifierError::TooLong(len) => {
                write!(
                    f,
                    "Identifier is too long ({} characters, max {})",
                    len, MAX_IDENTIFIER_LENGTH
                )
            }
            IdentifierError::InvalidStart(c) => {
                write!(f, "Identifier cannot start with '{}'", c)
            }
            IdentifierError::InvalidCharacter(c) => {
                write!(f, "Identifier contains invalid character '{}'", c)
            }
        }
    }
}

impl std::error::Error for IdentifierError {}

/// Validate a schema identifier: `^[A-Za-z_][A-Za-z0-9_]*$`, max 64 chars.
pub fn validate_schema_identifier(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong(name.len()));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(IdentifierError::InvalidStart(first));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(IdentifierError::InvalidCharacter(c));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["public", "app_v2", "_staging", "Schema1"] {
            assert!(validate_schema_identifier(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_rejects_injection_shapes() {
        assert!(validate_schema_identifier("public; DROP TABLE x").is_err());
        assert!(validate_schema_identifier("public--").is_err());
        assert!(validate_schema_identifier("a b").is_err());
        assert!(validate_schema_identifier("\"quoted\"").is_err());
    }

    #[test]
    fn test_rejects_empty_and_bad_start() {
        assert_eq!(validate_schema_identifier(""), Err(IdentifierError::Empty));
        assert_eq!(
            validate_schema_identifier("1abc"),
            Err(IdentifierError::InvalidStart('1'))
        );
    }

    #[test]
    fn test_rejects_too_long() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(matches!(
            validate_schema_identifier(&name),
            Err(IdentifierError::TooLong(_))
        ));
    }
}
