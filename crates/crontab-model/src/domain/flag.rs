use crate::ModelError;

/// Parse a human-entered active flag.
pub fn parse_active(s: &str) -> Result<bool, ModelError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "on" => Ok(true),
        "no" | "n" | "false" | "0" | "off" => Ok(false),
        _ => Err(ModelError::InvalidActive(s.to_string())),
    }
}
