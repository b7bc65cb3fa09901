//! HTML rendering of the transcript.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;

/// One frame pushed to the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSurface {
    /// Inner HTML of the transcript container.
    pub html: String,
    /// Whether input must stay disabled.
    pub busy: bool,
}

/// Render every entry as `<div class="..."><span icon/><span text/></div>`.
#[must_use]
pub fn render_transcript(transcript: &Transcript) -> String {
    let mut html = String::new();
    for entry in transcript.iter() {
        let _ = write!(
            html,
            r#"<div class="{}"><span class="message-icon">{}</span><span class="message-text">{}</span></div>"#,
            entry.role.css_class(),
            entry.role.icon(),
            escape_html(&entry.content),
        );
    }
    html
}

/// Escape text for use inside HTML elements and quoted attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptEntry;

    #[test]
    fn test_render_uses_role_classes_in_order() {
        let transcript = Transcript::from_entries(vec![
            TranscriptEntry::user("q"),
            TranscriptEntry::tool("t"),
            TranscriptEntry::assistant("a"),
            TranscriptEntry::error("e"),
        ]);
        let html = render_transcript(&transcript);

        let user = html.find("user-message").unwrap();
        let tool = html.find("tool-message").unwrap();
        let bot = html.find("bot-message").unwrap();
        let error = html.find("error-message").unwrap();
        assert!(user < tool && tool < bot && bot < error);
        assert!(html.contains("Error: e"));
    }

    #[test]
    fn test_render_escapes_content() {
        let transcript = Transcript::from_entries(vec![TranscriptEntry::user(
            "<script>alert('x')</script> & more",
        )]);
        let html = render_transcript(&transcript);

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
    }

    #[test]
    fn test_empty_transcript_renders_nothing() {
        assert!(render_transcript(&Transcript::new()).is_empty());
    }
}
