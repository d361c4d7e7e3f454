//! Server-rendered approval page.
//!
//! One self-contained HTML document per request: shows the instruction and
//! context, offers approve/reject, and collects an optional delegation
//! payload (text, coordinates, or an image file encoded to base64 in the
//! browser). Submits to the resolve endpoint with the open token it was
//! rendered with.

use droidflow_types::{AuthRequestRecord, AuthStatus};

/// Escape text for safe interpolation into HTML.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render the approval page for a request.
///
/// Terminal requests render a read-only summary; pending requests render
/// the decision form.
pub fn render(record: &AuthRequestRecord, open_token: &str) -> String {
    let instruction = escape_html(&record.instruction);
    let capability = escape_html(&record.capability.to_string());
    let current_app = record
        .current_app
        .as_deref()
        .map(escape_html)
        .unwrap_or_else(|| "unknown".into());
    let expires_at = record.expires_at.to_rfc3339();
    let request_id = record.id.to_string();
    let token = escape_html(open_token);

    let body = if record.status == AuthStatus::Pending {
        format!(
            r#"<p class="meta">capability <b>{capability}</b> &middot; app <b>{current_app}</b> &middot; expires {expires_at}</p>
  <p class="instruction">{instruction}</p>
  <form id="decision">
    <label>Text (codes, answers):<br><input type="text" id="text-value" autocomplete="one-time-code"></label>
    <label>Location:<br>
      <input type="text" id="geo-lat" placeholder="latitude" size="10">
      <input type="text" id="geo-lon" placeholder="longitude" size="10">
    </label>
    <label>Image:<br><input type="file" id="image-file" accept="image/*"></label>
    <div class="buttons">
      <button type="button" class="approve" onclick="submitDecision('approve')">Approve</button>
      <button type="button" class="reject" onclick="submitDecision('reject')">Reject</button>
    </div>
  </form>
  <p id="result"></p>
  <script>
  async function readArtifact() {{
    const file = document.getElementById('image-file').files[0];
    if (file) {{
      const buf = await file.arrayBuffer();
      let binary = '';
      new Uint8Array(buf).forEach(b => binary += String.fromCharCode(b));
      const ext = (file.name.split('.').pop() || 'png').toLowerCase();
      return {{ kind: 'image', data: btoa(binary), extension: ext }};
    }}
    const lat = document.getElementById('geo-lat').value.trim();
    const lon = document.getElementById('geo-lon').value.trim();
    if (lat && lon) {{
      return {{ kind: 'geo', lat: parseFloat(lat), lon: parseFloat(lon) }};
    }}
    const text = document.getElementById('text-value').value;
    if (text) {{
      return {{ kind: 'text', value: text }};
    }}
    return null;
  }}
  async function submitDecision(decision) {{
    const result = document.getElementById('result');
    result.textContent = 'Submitting...';
    const body = {{ decision: decision }};
    if (decision === 'approve') {{
      const artifact = await readArtifact();
      if (artifact) body.artifact = artifact;
    }}
    const resp = await fetch('/v1/requests/{request_id}/resolve?token={token}', {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json' }},
      body: JSON.stringify(body),
    }});
    if (resp.ok) {{
      result.textContent = 'Decision recorded: ' + decision + '. You can close this page.';
      document.getElementById('decision').style.display = 'none';
    }} else {{
      const err = await resp.json().catch(() => ({{}}));
      result.textContent = 'Failed: ' + (err.error || resp.status);
    }}
  }}
  </script>"#
        )
    } else {
        let status = record.status.to_string();
        let message = record
            .decision_message
            .as_deref()
            .map(escape_html)
            .unwrap_or_default();
        format!(
            r#"<p class="instruction">{instruction}</p>
  <p class="meta">This request is already <b>{status}</b>. {message}</p>"#
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Authorization request</title>
<style>
  body {{ font-family: -apple-system, system-ui, sans-serif; max-width: 28rem; margin: 2rem auto; padding: 0 1rem; color: #222; }}
  .meta {{ color: #666; font-size: 0.85rem; }}
  .instruction {{ font-size: 1.1rem; }}
  label {{ display: block; margin: 0.75rem 0; }}
  input[type=text] {{ padding: 0.4rem; }}
  .buttons {{ margin-top: 1rem; }}
  button {{ padding: 0.6rem 1.4rem; font-size: 1rem; border: 0; border-radius: 6px; cursor: pointer; }}
  .approve {{ background: #2e7d32; color: #fff; margin-right: 0.5rem; }}
  .reject {{ background: #c62828; color: #fff; }}
</style>
</head>
<body>
  <h2>Authorization request</h2>
  {body}
</body>
</html>"#
    )
}
