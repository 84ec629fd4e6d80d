//! SQL identifier checks for table and column names.

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Reasons an identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier '{name}' exceeds {MAX_IDENTIFIER_BYTES} bytes (got {len})")]
    TooLong { name: String, len: usize },
    #[error("identifier '{name}' must start with a letter or underscore")]
    BadStart { name: String },
    #[error("identifier '{name}' contains invalid character '{ch}'")]
    BadChar { name: String, ch: char },
}

/// Check that `name` can be used as an unqualified table or column name.
///
/// Letters, digits and underscores only, not starting with a digit. Dots
/// are rejected: schema qualification is a separate descriptor field.
///
/// # Errors
///
/// Returns the first rule the name breaks.
pub fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(IdentifierError::Empty);
    };

    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(IdentifierError::TooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(IdentifierError::BadStart {
            name: name.to_string(),
        });
    }

    if let Some(ch) = chars.find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
        return Err(IdentifierError::BadChar {
            name: name.to_string(),
            ch,
        });
    }

    Ok(())
}
