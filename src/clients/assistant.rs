//! # Voice Assistant API Client
//!
//! Creates one assistant call per telephony stream. The call is requested with
//! the WebSocket transport and raw little-endian 16-bit PCM, and the API answers
//! with the URL the bridge connects to.

use crate::config::AssistantConfig;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const CREATE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallRequest<'a> {
    assistant_id: &'a str,
    transport: TransportRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransportRequest {
    provider: &'static str,
    audio_format: AudioFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioFormat {
    format: &'static str,
    container: &'static str,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    #[serde(default)]
    transport: Option<TransportResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportResponse {
    #[serde(default)]
    websocket_call_url: Option<String>,
}

/// Client for the voice assistant's call API.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(http: reqwest::Client, config: AssistantConfig) -> Self {
        Self { http, config }
    }

    fn request_body(&self) -> CreateCallRequest<'_> {
        CreateCallRequest {
            assistant_id: &self.config.assistant_id,
            transport: TransportRequest {
                provider: "vapi.websocket",
                audio_format: AudioFormat {
                    format: "pcm_s16le",
                    container: "raw",
                    sample_rate: self.config.sample_rate,
                },
            },
        }
    }

    /// Create a call and return its WebSocket URL.
    ///
    /// ## Errors:
    /// - **Upstream**: transport failure, non-success status, or a response
    ///   without `transport.websocketCallUrl`
    pub async fn create_call(&self) -> AppResult<String> {
        let url = format!("{}/call", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(CREATE_CALL_TIMEOUT)
            .json(&self.request_body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Assistant call creation rejected");
            return Err(AppError::Upstream(format!(
                "assistant call returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: CreateCallResponse = response.json().await?;
        let ws_url = websocket_url(body)?;
        info!(url = %ws_url, "Assistant call created");
        Ok(ws_url)
    }
}

fn websocket_url(response: CreateCallResponse) -> AppResult<String> {
    response
        .transport
        .and_then(|transport| transport.websocket_call_url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::Upstream("no WebSocket URL returned by the assistant API".to_string()))
}
