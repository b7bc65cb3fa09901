//! HTTP client for the chat backend.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::{BridgeError, Result};
use crate::protocol::{ChatRequestEnvelope, ChatResponseBody, HostPayload, parse_history};

/// Outcome of a chat round trip that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// `{ response, history? }`.
    Answer(HostPayload),
    /// `{ error }`: the backend refused or failed the request.
    Rejected(String),
}

/// Something that can answer a chat request.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Send one request and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an unreadable reply.
    async fn chat(&self, request: ChatRequestEnvelope) -> Result<ChatReply>;
}

/// Request body shape sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RequestFormat {
    /// `{ request, history }`.
    #[default]
    Envelope,
    /// `{ message }`.
    Legacy,
}

impl RequestFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::Legacy => "legacy",
        }
    }
}

/// [`ChatBackend`] over `POST <base>/chat`.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    http: reqwest::Client,
    endpoint: Url,
    format: RequestFormat,
    timeout: Option<Duration>,
}

impl HttpChatBackend {
    /// Create a client for `path` under `base_url`.
    ///
    /// Any path prefix on the base is kept: `http://host/api` with `/chat`
    /// posts to `http://host/api/chat`.
    pub fn new(base_url: &str, path: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }
        let endpoint = base.join(path.trim_start_matches('/'))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            format: RequestFormat::Envelope,
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_format(mut self, format: RequestFormat) -> Self {
        self.format = format;
        self
    }

    /// Per-request timeout. Unset by default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn body(&self, request: &ChatRequestEnvelope) -> Result<serde_json::Value> {
        Ok(match self.format {
            RequestFormat::Envelope => serde_json::to_value(request)?,
            RequestFormat::Legacy => json!({ "message": request.request }),
        })
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpChatBackend {
    async fn chat(&self, request: ChatRequestEnvelope) -> Result<ChatReply> {
        let body = self.body(&request)?;
        let mut builder = self.http.post(self.endpoint.clone()).json(&body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = %status, body_length = text.len(), "Chat backend replied");

        match serde_json::from_str::<ChatResponseBody>(&text) {
            Ok(ChatResponseBody::Error { error }) => Ok(ChatReply::Rejected(error)),
            Ok(ChatResponseBody::Reply { response, history }) if status.is_success() => {
                Ok(ChatReply::Answer(HostPayload {
                    content: response,
                    history: history.and_then(parse_history),
                }))
            }
            Err(e) if status.is_success() => Err(BridgeError::Json(e)),
            _ => Err(BridgeError::Backend {
                status: status.as_u16(),
                message: text,
            }),
        }
    }
}
