//! Parsing and normalization of model output into an [`AgentAction`].
//!
//! Models are prompted to answer with a single JSON object, but in practice
//! wrap it in code fences or prose. We strip fences, locate the first
//! balanced JSON object, and deserialize it. Anything that still fails is
//! normalized to a short `wait` by the caller so a bad completion never
//! kills a task.

use droidflow_types::AgentAction;

/// Parse model text into an action.
pub fn parse_action(text: &str) -> Result<AgentAction, String> {
    let candidate = extract_json_object(text)
        .ok_or_else(|| format!("no JSON object in model output: {}", preview(text)))?;
    serde_json::from_str(candidate).map_err(|e| format!("{e} in {}", preview(candidate)))
}

/// The normalization target for malformed output: a short pause so the next
/// capture gets a fresh look at the screen.
pub fn fallback_action() -> AgentAction {
    AgentAction::Wait { seconds: 2 }
}

/// Find the first balanced `{ ... }` object in the text, skipping fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= 120 {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(120).collect();
        format!("{head}...")
    }
}
