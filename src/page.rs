//! Panel page shell.
//!
//! The page only loads same-origin styles and the one script tagged with a
//! per-render nonce.

use uuid::Uuid;

use crate::surface::{RenderedSurface, escape_html};

/// 32 alphanumeric characters, fresh for every page render.
#[must_use]
pub fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `Content-Security-Policy` value for a page rendered with `nonce`.
#[must_use]
pub fn content_security_policy(nonce: &str) -> String {
    format!(
        "default-src 'none'; style-src 'self'; img-src 'self' https:; connect-src 'self'; script-src 'nonce-{nonce}';"
    )
}

/// Generate the HTML page for the chat panel.
#[must_use]
pub fn panel_page(title: &str, nonce: &str, frame: &RenderedSurface) -> String {
    let title = escape_html(title);
    let transcript = &frame.html;
    let disabled = if frame.busy { " disabled" } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta http-equiv="Content-Security-Policy" content="{csp}">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link href="/static/panel.css" rel="stylesheet">
    <title>{title}</title>
</head>
<body>
    <h1>{title}</h1>
    <div id="chat-container" aria-live="polite">{transcript}</div>
    <div id="chat-input">
        <input type="text" id="user-input" placeholder="Type your message..."{disabled}>
        <button id="send-button" type="button"{disabled}>Send</button>
    </div>
    <script nonce="{nonce}" src="/static/panel.js"></script>
</body>
</html>"#,
        csp = content_security_policy(nonce),
    )
}
