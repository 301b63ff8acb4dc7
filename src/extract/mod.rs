use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonNotFound;

impl fmt::Display for JsonNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no JSON document found in output")
    }
}

impl std::error::Error for JsonNotFound {}

/// Recovers the JSON object that ends `text`.
///
/// The document is assumed to be the trailing block of the stream, starting
/// on the first line whose trimmed content begins with `{`. A brace at the
/// start of an earlier prose line defeats this; later candidates are not
/// tried.
pub fn extract_json(text: &str) -> Result<Value, JsonNotFound> {
    let (_, json_part) = split_preamble(text);
    let json_part = json_part.ok_or(JsonNotFound)?;
    serde_json::from_str(json_part.trim()).map_err(|_| JsonNotFound)
}

/// Splits `text` into the human-readable preamble and the candidate JSON
/// block, if any line starts one.
pub fn split_preamble(text: &str) -> (&str, Option<&str>) {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return ("", Some(trimmed));
    }

    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with('{') {
            return (&text[..offset], Some(&text[offset..]));
        }
        offset += line.len();
    }
    (text, None)
}
