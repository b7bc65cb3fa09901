//! Conversation transcript.
//!
//! A [`Transcript`] is an ordered, append-only list of [`TranscriptEntry`]
//! values. Entries are never edited in place: the only mutations are
//! [`Transcript::push`] and a wholesale [`Transcript::replace`] when the
//! backend returns an authoritative history.

use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Answer from the chat backend.
    Assistant,
    /// Tool output reported by the backend.
    Tool,
    /// Visible error line. Local to the panel, never sent to the backend.
    Error,
}

impl Role {
    /// CSS class used when rendering an entry with this role.
    #[must_use]
    pub fn css_class(self) -> &'static str {
        match self {
            Self::User => "user-message",
            Self::Assistant => "bot-message",
            Self::Tool => "tool-message",
            Self::Error => "error-message",
        }
    }

    /// Icon shown next to the entry.
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::User => "🧑",
            Self::Assistant => "🤖",
            Self::Tool => "🛠️",
            Self::Error => "⚠️",
        }
    }

    /// Whether entries with this role stay in the panel.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, Self::Error)
    }
}

/// A single line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who wrote the entry.
    pub role: Role,
    /// Plain-text content.
    pub content: String,
}

impl TranscriptEntry {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Error entry, prefixed the way the panel displays failures.
    #[must_use]
    pub fn error(text: &str) -> Self {
        Self::new(Role::Error, format!("Error: {text}"))
    }
}

/// Ordered conversation history shown in the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transcript from existing entries, keeping their order.
    #[must_use]
    pub fn from_entries(entries: Vec<TranscriptEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry at the end.
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Swap the whole sequence for an authoritative history.
    pub fn replace(&mut self, entries: Vec<TranscriptEntry>) {
        self.entries = entries;
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    /// History as sent to the backend: everything except panel-local entries.
    #[must_use]
    pub fn outbound_history(&self) -> Vec<TranscriptEntry> {
        self.entries
            .iter()
            .filter(|e| !e.role.is_local())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_given_order() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::user("first"));

        transcript.replace(vec![
            TranscriptEntry::user("a"),
            TranscriptEntry::tool("b"),
            TranscriptEntry::assistant("c"),
        ]);

        let contents: Vec<&str> = transcript.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[test]
    fn test_outbound_history_skips_errors() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::user("hello"));
        transcript.push(TranscriptEntry::error("boom"));
        transcript.push(TranscriptEntry::user("again"));

        let history = transcript.outbound_history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.role == Role::User));
    }

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::to_string(&TranscriptEntry::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);

        let entry: TranscriptEntry =
            serde_json::from_str(r#"{"role":"tool","content":"ls"}"#).unwrap();
        assert_eq!(entry.role, Role::Tool);
    }

    #[test]
    fn test_error_entry_prefix() {
        let entry = TranscriptEntry::error("timeout");
        assert_eq!(entry.content, "Error: timeout");
        assert!(entry.role.is_local());
    }
}
