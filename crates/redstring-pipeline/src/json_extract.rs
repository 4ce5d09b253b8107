//! Strategies for pulling a JSON object out of a model's raw text
//! response, tried in order until one succeeds.
//! Each strategy is a pure function so it is unit-testable without a
//! live model call.

use serde_json::Value;

/// Returns the extracted JSON value and, if any text preceded it, that
/// preamble.
pub struct Extracted {
    pub value: Value,
    pub preamble: Option<String>,
}

pub fn extract_plan_json(text: &str) -> Option<Extracted> {
    direct_parse(text)
        .or_else(|| fenced_code_block(text))
        .or_else(|| brace_scan_from_intent(text))
        .or_else(|| first_brace_greedy(text))
}

fn direct_parse(text: &str) -> Option<Extracted> {
    serde_json::from_str::<Value>(text.trim()).ok().map(|value| Extracted { value, preamble: None })
}

fn fenced_code_block(text: &str) -> Option<Extracted> {
    let start_marker = text.find("```")?;
    let after_open = &text[start_marker + 3..];
    let after_open = after_open.strip_prefix("json").unwrap_or(after_open);
    let end_offset = after_open.find("```")?;
    let body = &after_open[..end_offset];
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let preamble = preamble_text(&text[..start_marker]);
    Some(Extracted { value, preamble })
}

/// Scans for the first occurrence of `"intent"` and extracts the
/// smallest balanced-brace object containing it.
fn brace_scan_from_intent(text: &str) -> Option<Extracted> {
    let intent_pos = text.find("\"intent\"")?;
    let open = text[..intent_pos].rfind('{')?;
    let body = balanced_object_at(text, open)?;
    let value: Value = serde_json::from_str(body).ok()?;
    let preamble = preamble_text(&text[..open]);
    Some(Extracted { value, preamble })
}

fn first_brace_greedy(text: &str) -> Option<Extracted> {
    let open = text.find('{')?;
    let body = balanced_object_at(text, open)?;
    let value: Value = serde_json::from_str(body).ok()?;
    let preamble = preamble_text(&text[..open]);
    Some(Extracted { value, preamble })
}

fn balanced_object_at(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..open + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preamble_text(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_parse_succeeds_on_clean_json() {
        let extracted = extract_plan_json(r#"{"intent":"qa","response":"hi"}"#).unwrap();
        assert_eq!(extracted.value["intent"], "qa");
        assert!(extracted.preamble.is_none());
    }

    #[test]
    fn fenced_block_extracts_json_and_preamble() {
        let text = "Sure thing!\n```json\n{\"intent\":\"qa\",\"response\":\"hi\"}\n```";
        let extracted = extract_plan_json(text).unwrap();
        assert_eq!(extracted.value["intent"], "qa");
        assert_eq!(extracted.preamble.as_deref(), Some("Sure thing!"));
    }

    #[test]
    fn brace_scan_finds_object_around_intent_field() {
        let text = "noise before {\"intent\":\"create_graph\",\"graph\":{\"name\":\"x\"}} trailing";
        let extracted = extract_plan_json(text).unwrap();
        assert_eq!(extracted.value["intent"], "create_graph");
    }

    #[test]
    fn greedy_first_brace_handles_nested_objects() {
        let text = "{\"intent\":\"qa\",\"nested\":{\"a\":1}}";
        let extracted = extract_plan_json(text).unwrap();
        assert_eq!(extracted.value["nested"]["a"], 1);
    }

    #[test]
    fn returns_none_when_no_strategy_matches() {
        assert!(extract_plan_json("not json at all").is_none());
    }
}
