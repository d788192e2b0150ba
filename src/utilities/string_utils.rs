//! String helpers shared by the tool layer and prompt assembly.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_\-]*)\}").expect("valid regex"));
static CAMEL_LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid regex"));
static NAME_FIELD_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_\-]+").expect("valid regex"));

const MAX_TOOL_NAME_LENGTH: usize = 64;

/// Sanitize a tool name for function-calling providers
/// (lowercase, `a-z0-9_` only, at most 64 characters).
pub fn sanitize_tool_name(name: &str) -> String {
    let ascii_name: String = name.chars().filter(|c| c.is_ascii()).collect();
    let split = CAMEL_LOWER_UPPER.replace_all(&ascii_name, "${1}_${2}");
    let lowered = split.to_lowercase();
    let replaced = DISALLOWED_CHARS.replace_all(&lowered, "_");
    let stripped = replaced.trim_matches('_');

    if stripped.len() > MAX_TOOL_NAME_LENGTH {
        stripped[..MAX_TOOL_NAME_LENGTH]
            .trim_end_matches('_')
            .to_string()
    } else {
        stripped.to_string()
    }
}

/// Make an agent name usable as the `name` field of a chat message.
pub fn sanitize_author_name(name: &str) -> String {
    let cleaned = NAME_FIELD_CHARS.replace_all(name.trim(), "_");
    let cleaned: String = cleaned.chars().take(MAX_TOOL_NAME_LENGTH).collect();
    if cleaned.is_empty() {
        "assistant".to_string()
    } else {
        cleaned
    }
}

/// Case-insensitive check for any of `markers` inside `text`.
pub fn contains_marker(text: &str, markers: &[String]) -> bool {
    let haystack = text.to_uppercase();
    markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .any(|m| haystack.contains(&m.to_uppercase()))
}

/// Replace `{name}` placeholders that have a value in `inputs`.
///
/// Unknown placeholders and JSON braces are left untouched, so an agent's
/// system prompt can embed examples without escaping.
pub fn interpolate_known(input: &str, inputs: &HashMap<&str, String>) -> String {
    if !input.contains('{') {
        return input.to_string();
    }
    VARIABLE_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match inputs.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
