use base64::Engine;

/// Decode a base64 request field, naming the field on failure.
pub(super) fn decode_base64_field(field: &str, value: &str) -> Result<Vec<u8>, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|_| format!("Invalid {field} encoding"))?;
    if bytes.is_empty() {
        return Err(format!("Empty {field}"));
    }
    Ok(bytes)
}

pub(super) fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
