//! Prompt construction for the decision loop.

/// System prompt teaching the model the action vocabulary and the JSON
/// answer contract.
pub const SYSTEM_PROMPT: &str = "\
You control an Android device to accomplish a user goal. On each turn you \
see a screenshot of the current screen, the foreground app, and the most \
recent step history. Respond with EXACTLY ONE JSON object choosing the next \
action, and nothing else.

Available actions:
  {\"action\": \"tap\", \"x\": <int>, \"y\": <int>}
  {\"action\": \"swipe\", \"x1\": <int>, \"y1\": <int>, \"x2\": <int>, \"y2\": <int>, \"duration_ms\": <int>}
  {\"action\": \"type_text\", \"text\": \"...\"}
  {\"action\": \"key_event\", \"key\": \"KEYCODE_...\"}
  {\"action\": \"launch_app\", \"package\": \"com.example.app\"}
  {\"action\": \"shell\", \"command\": \"...\"}
  {\"action\": \"run_script\", \"name\": \"...\"}
  {\"action\": \"wait\", \"seconds\": <int>}
  {\"action\": \"request_human_auth\", \"capability\": \"camera|qr|microphone|voice|nfc|sms|two_factor|location|biometric|notification|contacts|calendar|files|oauth|payment|permission\", \"instruction\": \"what the human should do\", \"timeout_secs\": <int, optional>}
  {\"action\": \"finish\", \"success\": true|false, \"message\": \"final result\"}

Use request_human_auth whenever the screen demands something only the \
operator can provide: a 2FA code, a camera capture, a biometric prompt, a \
payment confirmation. A rejected or timed-out request is information, not \
failure: pick another strategy or finish with an honest message. If a step \
failed, the history line shows the error; adjust rather than repeat.";

/// Build the user-turn text accompanying the screenshot.
pub fn build_user_text(goal: &str, foreground_app: Option<&str>, history: &[String]) -> String {
    let mut sections = Vec::with_capacity(3);
    sections.push(format!("Goal: {goal}"));

    if let Some(app) = foreground_app {
        sections.push(format!("Foreground app: {app}"));
    }

    if history.is_empty() {
        sections.push("History: (first step)".to_string());
    } else {
        let mut block = String::from("History (oldest first):");
        for line in history {
            block.push_str("\n- ");
            block.push_str(line);
        }
        sections.push(block);
    }

    sections.push("The screenshot shows the current screen. Reply with one JSON action.".into());
    sections.join("\n\n")
}
