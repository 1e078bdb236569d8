use serde_json::Value;

use crate::error::Result;

/// Parses `az -o json` output. Blank output means "no result", not a parse error.
pub fn decode_json(text: &str) -> Result<Option<Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}
