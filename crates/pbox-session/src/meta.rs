use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Descriptive block an example may carry ahead of its code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExampleMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.instructions.is_none() && self.extra.is_empty()
    }
}

/// Example text split into its meta block and the code to evaluate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSource {
    pub meta: ExampleMeta,
    pub source: String,
}

/// Split a leading `+{...}` meta block off `text`.
///
/// The block may be followed by `;` and trailing spaces on the same line.
/// Blank lines after it are dropped. Text without a well formed leading
/// block is returned unchanged with empty meta.
#[must_use]
pub fn extract_meta(text: &str) -> ParsedSource {
    split_meta(text).unwrap_or_else(|| ParsedSource {
        meta: ExampleMeta::default(),
        source: text.to_string(),
    })
}

fn split_meta(text: &str) -> Option<ParsedSource> {
    let body = text.trim_start().strip_prefix('+')?;
    if !body.starts_with('{') {
        return None;
    }

    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<Value>();
    let value = match stream.next()? {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return None,
        Err(err) => {
            debug!(%err, "ignoring malformed example meta block");
            return None;
        }
    };
    let rest = &body[stream.byte_offset()..];

    let meta = match serde_json::from_value::<ExampleMeta>(value) {
        Ok(meta) => meta,
        Err(err) => {
            debug!(%err, "ignoring example meta block with unexpected fields");
            return None;
        }
    };

    let rest = rest.trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix(';').unwrap_or(rest);
    let line_end = rest.find('\n').unwrap_or(rest.len());
    if !rest[..line_end].trim().is_empty() {
        return None;
    }

    Some(ParsedSource {
        meta,
        source: skip_blank_lines(rest).to_string(),
    })
}

fn skip_blank_lines(mut text: &str) -> &str {
    while let Some(newline) = text.find('\n') {
        if !text[..newline].trim().is_empty() {
            break;
        }
        text = &text[newline + 1..];
    }
    text
}
