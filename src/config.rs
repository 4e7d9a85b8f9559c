//! # Configuration Management
//!
//! Configuration is layered, lowest priority first:
//! 1. Default values (the `Default` impl below)
//! 2. Configuration file (`config.toml`, optional)
//! 3. Environment variables with the `APP__` prefix, `__` between levels
//!    (e.g. `APP__BRIDGE__FLUSH_THRESHOLD=25`)
//! 4. Deployment variables that predate the prefixed scheme
//!    (`VAPI_API_KEY`, `SERVER_DOMAIN`, `PORT`, ...)
//!
//! A `.env` file is read into the process environment by `main` before loading.

use crate::bridge::session::BridgeSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Unprefixed environment variables and the keys they override.
///
/// Later entries win when several are set (`SERVER_PORT` beats `PORT`).
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("VAPI_API_KEY", "assistant.api_key"),
    ("VAPI_ASSISTANT_ID", "assistant.assistant_id"),
    ("VAPI_SAMPLE_RATE", "assistant.sample_rate"),
    ("VAPI_SAMPLE_RATE", "bridge.source_sample_rate"),
    ("VAPI_MESSAGE_BUFFER_SIZE", "bridge.flush_threshold"),
    ("SERVER_DOMAIN", "public_url.server_domain"),
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub assistant: AssistantConfig,
    pub telephony: TelephonyConfig,
    pub public_url: PublicUrlConfig,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio relay tuning.
///
/// ## Fields:
/// - `flush_threshold`: assistant audio messages combined into one outbound chunk
/// - `source_sample_rate`: rate of the audio the assistant sends
/// - `target_sample_rate`: rate the telephony platform plays back
/// - `send_timeout_ms`: how long one outbound send may take before the session ends
/// - `close_timeout_ms`: how long closing each side may take
/// - `inbound_queue`: telephony frames buffered before reads pause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub flush_threshold: usize,
    pub source_sample_rate: u32,
    pub target_sample_rate: u32,
    pub send_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub inbound_queue: usize,
}

/// Voice assistant API credentials and call format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub api_key: String,
    pub assistant_id: String,
    pub base_url: String,
    /// Sample rate requested when creating the call
    pub sample_rate: u32,
}

/// Settings announced to, or enforced on, the telephony platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// `chunk_size` field of the stream flow document
    pub chunk_size: u32,
    /// `record` field of the stream flow document
    pub record: bool,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

/// How the public hostname of this server is discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUrlConfig {
    /// Base URL of the local ngrok agent API
    pub ngrok_api_url: String,
    /// Used when no ngrok tunnel is available; may be empty
    pub server_domain: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            bridge: BridgeConfig {
                flush_threshold: 50,
                source_sample_rate: 16000,
                target_sample_rate: 8000,
                send_timeout_ms: 5000,
                close_timeout_ms: 2000,
                inbound_queue: 256,
            },
            assistant: AssistantConfig {
                api_key: String::new(),
                assistant_id: String::new(),
                base_url: "https://api.vapi.ai".to_string(),
                sample_rate: 16000,
            },
            telephony: TelephonyConfig {
                chunk_size: 500,
                record: true,
                heartbeat_interval_secs: 10,
                client_timeout_secs: 60,
            },
            public_url: PublicUrlConfig {
                ngrok_api_url: "http://ngrok:4040".to_string(),
                server_domain: String::new(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`: override the server port
    /// - `APP__TELEPHONY__RECORD=false`: don't ask the platform to record
    /// - `VAPI_MESSAGE_BUFFER_SIZE=25`: same as `bridge.flush_threshold`
    /// - `PORT=3000`: special case for deployment platforms
    pub fn load() -> Result<Self> {
        let builder = Self::defaults()?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__"),
            );

        let builder = apply_env_overrides(builder, |name| env::var(name).ok())?;
        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Builder seeded with the built-in defaults.
    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?))
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Flush threshold is at least 1
    /// - Sample rates are non-zero
    /// - The assistant call rate is the rate assistant audio is resampled from
    /// - The assistant rate is an integer multiple of the telephony rate, since
    ///   the resampler only decimates
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.bridge.flush_threshold == 0 {
            return Err(anyhow::anyhow!("Flush threshold must be greater than 0"));
        }

        if self.bridge.inbound_queue == 0 {
            return Err(anyhow::anyhow!("Inbound queue must hold at least one frame"));
        }

        let (source, target) = (self.bridge.source_sample_rate, self.bridge.target_sample_rate);
        if source == 0 || target == 0 || self.assistant.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be greater than 0"));
        }

        if self.assistant.sample_rate != source {
            return Err(anyhow::anyhow!(
                "Assistant sample rate {} does not match bridge source rate {}",
                self.assistant.sample_rate,
                source
            ));
        }

        if source < target || source % target != 0 {
            return Err(anyhow::anyhow!(
                "Source sample rate {} is not an integer multiple of target rate {}",
                source,
                target
            ));
        }

        if self.telephony.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        Ok(())
    }

    /// The subset of settings a bridge session runs with.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            flush_threshold: self.bridge.flush_threshold,
            source_sample_rate: self.bridge.source_sample_rate,
            target_sample_rate: self.bridge.target_sample_rate,
            send_timeout: Duration::from_millis(self.bridge.send_timeout_ms),
            close_timeout: Duration::from_millis(self.bridge.close_timeout_ms),
        }
    }

    /// Copy suitable for showing to operators, with credentials masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.assistant.api_key = redact(&copy.assistant.api_key);
        copy
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

fn apply_env_overrides<F>(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    lookup: F,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    for (name, key) in ENV_OVERRIDES {
        if let Some(value) = lookup(name) {
            builder = builder.set_override(*key, value)?;
        }
    }
    Ok(builder)
}
