//! Structured-output extraction from model responses.
//!
//! Models are asked for raw JSON but frequently wrap it in markdown fences or
//! surround it with prose. Extraction tries the most specific embedding first
//! and degrades gracefully: a ```json fence, then a plain ``` fence, then the
//! first balanced `{...}` span anywhere in the text. A candidate that fails
//! to parse falls through to the next strategy instead of aborting.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::ExtractError;

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

static PLAIN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap());

/// Extract the first JSON object from a model response.
pub fn extract_json(response: &str) -> Result<Value, ExtractError> {
    if let Some(caps) = JSON_FENCE.captures(response)
        && let Ok(value) = serde_json::from_str(&caps[1])
    {
        return Ok(value);
    }

    if let Some(caps) = PLAIN_FENCE.captures(response)
        && let Ok(value) = serde_json::from_str(&caps[1])
    {
        return Ok(value);
    }

    if let Some(span) = find_json_object(response)
        && let Ok(value) = serde_json::from_str(span)
    {
        return Ok(value);
    }

    Err(ExtractError::NoJson)
}

/// Find the first balanced `{...}` span, tracking string literals so braces
/// inside them do not affect nesting depth.
fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Check that a value has the generated-project shape: string `name`, string
/// `description`, and a `files` array whose every element has a string `path`
/// and string `content`. Fails closed on anything else.
pub fn validate_generated_project(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if !obj.get("name").is_some_and(Value::is_string) {
        return false;
    }
    if !obj.get("description").is_some_and(Value::is_string) {
        return false;
    }
    let Some(files) = obj.get("files").and_then(Value::as_array) else {
        return false;
    };
    files.iter().all(|file| {
        file.get("path").is_some_and(Value::is_string)
            && file.get("content").is_some_and(Value::is_string)
    })
}

/// Infer a display language from a file path's extension.
pub fn language_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext.to_ascii_lowercase().as_str() {
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "py" => Some("python"),
        "rs" => Some("rust"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" => Some("c"),
        "cpp" | "cc" | "cxx" => Some("cpp"),
        "h" | "hpp" => Some("c"),
        "rb" => Some("ruby"),
        "php" => Some("php"),
        "swift" => Some("swift"),
        "kt" => Some("kotlin"),
        "html" | "htm" => Some("html"),
        "css" => Some("css"),
        "scss" | "sass" => Some("scss"),
        "json" => Some("json"),
        "md" => Some("markdown"),
        "sh" | "bash" => Some("bash"),
        "sql" => Some("sql"),
        "toml" => Some("toml"),
        "xml" => Some("xml"),
        "yml" | "yaml" => Some("yaml"),
        _ => None,
    }
}
