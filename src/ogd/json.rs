//! JSON decoding with readable diagnostics for upstream payloads.

use anyhow::Result;

/// Deserialize `body`, turning failures into a message that names the JSON
/// path, the type mismatch, and a short excerpt around the offending column.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());

        let raw = inner.to_string();
        let location = format!(" at line {line} column {column}");
        let summary = describe_mismatch(raw.strip_suffix(&location).unwrap_or(&raw));

        let mut message = String::new();
        if !path.is_empty() && path != "." {
            message.push_str(&format!("at path '{path}': "));
        }
        message.push_str(&format!(
            "{summary} (line {line} col {column})\n{}",
            excerpt(body, line, column, 24)
        ));
        anyhow::anyhow!(message)
    })
}

/// Rewrite serde's `invalid type: X, expected Y` into `expected Y, got X`.
fn describe_mismatch(message: &str) -> String {
    if let Some(rest) = message.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {}, got {actual}", expected.trim());
    }
    message.to_string()
}

/// Up to `width` characters of line `line` centred on `column`, with a caret
/// under the error position.
fn excerpt(body: &str, line: usize, column: usize, width: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)).filter(|l| !l.is_empty()) else {
        return "(empty line)".to_string();
    };

    let chars: Vec<char> = text.chars().collect();
    let target = column.saturating_sub(1).min(chars.len());
    let start = target.saturating_sub(width / 2);
    let end = (target + width / 2).min(chars.len());
    let window: String = chars[start..end].iter().collect();

    format!("...{window}...\n   {}^", " ".repeat(target - start))
}
