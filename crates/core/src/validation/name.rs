use crate::error::NameError;

/// Longest accepted tool name
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Check a tool name against `[A-Za-z0-9_-]{1,64}`.
///
/// Emptiness is checked first, then the charset, then the length.
pub fn validate_tool_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::EmptyName);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(NameError::InvalidCharacters);
    }

    // Charset is ASCII here, so bytes == chars
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(NameError::NameTooLong);
    }

    Ok(())
}
