//! Text normalization helpers shared by the planner and the generator,
//! plus a few small pipeline utilities.

use std::any::Any;
use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";

static REPO_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").expect("static regex is valid"));

/// Return the body of the first markdown code fence in `raw`, or `raw`
/// unchanged when it contains no fence.
///
/// The info string after the opening fence (`json`, `html`, ...) is dropped.
/// An unterminated fence yields everything after the opening line.
pub fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = raw.find(FENCE) else {
        return raw;
    };
    let after_open = &raw[open + FENCE.len()..];
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        // Single-line fence: ```content```
        None => after_open,
    };
    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object; braces inside
/// string literals (including escaped quotes) are not counted.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Readable text of a caught panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Whether `name` is acceptable as a hosted repository name.
pub fn is_valid_repo_name(name: &str) -> bool {
    REPO_NAME.is_match(name) && name != "." && name != ".."
}

/// Upper-case the first letter of each `-`/`_`/space separated word.
pub fn title_case(text: &str) -> String {
    text.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
