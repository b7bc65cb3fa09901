use crate::bridge::RequestFormat;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Config file looked up in the working directory when none is given.
const DEFAULT_CONFIG_NAME: &str = "air-chat";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind the panel server to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the chat backend
    #[arg(long, env = "CHAT_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Request body shape sent to the backend
    #[arg(long, value_enum)]
    pub backend_format: Option<RequestFormat>,

    /// Backend request timeout in seconds (no timeout when unset)
    #[arg(long)]
    pub backend_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub panel: PanelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub path: String,
    pub format: RequestFormat,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub title: String,
    pub notification_capacity: usize,
    pub static_dir: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layering, lowest first: defaults, config file, `AIR_CHAT_*` env, CLI.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("backend.url", "http://127.0.0.1:21666")?
            .set_default("backend.path", "/chat")?
            .set_default("backend.format", RequestFormat::Envelope.as_str())?
            .set_default("panel.title", "Air Chat")?
            .set_default("panel.notification_capacity", 50)?
            .set_default("panel.static_dir", "static")?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        // E.g. AIR_CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("AIR_CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.backend_url {
            builder = builder.set_override("backend.url", url)?;
        }
        if let Some(format) = cli.backend_format {
            builder = builder.set_override("backend.format", format.as_str())?;
        }
        if let Some(secs) = cli.backend_timeout_secs {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX);
            builder = builder.set_override("backend.timeout_secs", secs)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Socket address string for the panel server.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
