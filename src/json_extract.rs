//! Extracting a JSON object from free-form model output.
//!
//! Candidates are produced in order:
//! 1. the whole reply, trimmed
//! 2. the span from the first `{` to the last `}`
//! 3. each balanced `{...}` span, left to right, skipping braces inside string literals
//!
//! Callers take the first candidate with the shape they need, so a stray `{}` or an
//! unrelated object in the surrounding prose does not hide the real payload.

use serde_json::{Map, Value};

/// Every object that decodes, in the order above
pub fn json_objects(text: &str) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    if let Some(object) = decode_object(text.trim()) {
        objects.push(object);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            objects.extend(decode_object(&text[start..=end]));
        }
    }

    objects.extend(balanced_spans(text).into_iter().filter_map(decode_object));
    objects
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Top-level `{...}` spans with balanced braces. String literals are honoured only
/// inside a span, so apostrophes and quotes in surrounding prose do not matter.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if depth == 0 {
            if ch == '{' {
                depth = 1;
                start = idx;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_reply() {
        let object = json_objects(r#"{"query": [{"SQL": "SELECT 1"}]}"#).remove(0);
        assert_eq!(object["query"][0]["SQL"], "SELECT 1");
    }

    #[test]
    fn test_reply_wrapped_in_prose_and_fences() {
        let reply = "Here you go:\n```json\n{\"query\": [{\"SQL\": \"SELECT * FROM departments\"}]}\n```\nHope it helps!";
        let object = json_objects(reply).remove(0);
        assert_eq!(object["query"][0]["SQL"], "SELECT * FROM departments");
    }

    #[test]
    fn test_balanced_scan_skips_non_json_braces() {
        let reply = r#"Using {placeholders} first, then: {"query": [{"SQL": "SELECT '}' AS brace"}]} done"#;
        let object = json_objects(reply).remove(0);
        assert_eq!(object["query"][0]["SQL"], "SELECT '}' AS brace");
    }

    #[test]
    fn test_non_object_json_is_not_accepted() {
        assert!(json_objects(r#""SELECT 1""#).is_empty());
        assert!(json_objects("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_no_json_at_all() {
        assert!(json_objects("I cannot answer that.").is_empty());
        assert!(json_objects("} backwards {").is_empty());
    }

    #[test]
    fn test_every_balanced_object_is_a_candidate() {
        let reply = r#"{"note": "ok"} and the answer {"query": [{"SQL": "SELECT 1"}]}"#;
        let objects = json_objects(reply);
        assert_eq!(objects.len(), 2);
        assert!(objects[0].contains_key("note"));
        assert_eq!(objects[1]["query"][0]["SQL"], "SELECT 1");
    }
}
