//! Pulls the fenced structured block out of free-form model text.
//!
//! Vision extraction, GTO extraction and explanation responses all arrive as
//! prose wrapped around one fenced block; every consumer goes through
//! [`extract_block`] and [`parse_structured`] so they share the same
//! tolerance rules.

use serde_json::{Map, Value};

use crate::error::ParseError;

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block<'a> {
    tag: Option<&'a str>,
    body: &'a str,
}

fn blocks(text: &str) -> Vec<Block<'_>> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        let (tag, body) = split_info(&after_open[..close]);
        found.push(Block {
            tag,
            body: body.trim(),
        });
        rest = &after_open[close + FENCE.len()..];
    }
    found
}

/// Separates a leading info tag (`json`, `yaml`, ...) from the block body.
/// A tag only counts when whitespace follows it.
fn split_info(inner: &str) -> (Option<&str>, &str) {
    let tag_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')))
        .unwrap_or(inner.len());
    let (tag, body) = inner.split_at(tag_len);
    if !tag.is_empty() && body.starts_with(char::is_whitespace) {
        (Some(tag), body)
    } else {
        (None, inner)
    }
}

/// Returns the trimmed body of the first fence tagged `tag`, or of the first
/// fence at all when none carries that tag.
pub fn extract_block(text: &str, tag: Option<&str>) -> Result<String, ParseError> {
    let found = blocks(text);
    let tagged = tag.and_then(|wanted| {
        found
            .iter()
            .find(|block| block.tag.is_some_and(|t| t.eq_ignore_ascii_case(wanted)))
    });
    tagged
        .or_else(|| found.first())
        .map(|block| block.body.to_string())
        .ok_or(ParseError::NoFencedBlock)
}

/// Like [`extract_block`], but text without any fence is taken as already
/// unwrapped.
pub fn unfence(text: &str, tag: Option<&str>) -> String {
    extract_block(text, tag).unwrap_or_else(|_| text.trim().to_string())
}

/// Strictly decodes a block into a JSON object.
pub fn parse_structured(block: &str) -> Result<Map<String, Value>, ParseError> {
    let candidate = unfence(block, Some("json"));
    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(ParseError::Malformed {
            raw: block.to_string(),
            detail: format!("expected an object, found {}", kind(&other)),
        }),
        Err(err) => Err(ParseError::Malformed {
            raw: block.to_string(),
            detail: err.to_string(),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_needs_trailing_whitespace() {
        assert_eq!(split_info("json\n{}"), (Some("json"), "\n{}"));
        assert_eq!(split_info("{\"a\":1}"), (None, "{\"a\":1}"));
        assert_eq!(split_info("json"), (None, "json"));
    }

    #[test]
    fn unterminated_fence_is_ignored() {
        let text = "```json\n{\"a\":1}\n```\ntrailing ``` fence";
        assert_eq!(blocks(text).len(), 1);
    }
}
