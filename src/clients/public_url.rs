//! # Public URL Discovery
//!
//! The telephony platform must reach this server over `wss://`. In development
//! that hostname comes from an ngrok tunnel; otherwise it is configured.

use crate::config::PublicUrlConfig;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const NGROK_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves the hostname the telephony platform should connect to.
#[derive(Debug, Clone)]
pub struct PublicUrlResolver {
    http: reqwest::Client,
    config: PublicUrlConfig,
}

impl PublicUrlResolver {
    pub fn new(http: reqwest::Client, config: PublicUrlConfig) -> Self {
        Self { http, config }
    }

    /// Configured fallback domain, possibly empty.
    pub fn fallback_domain(&self) -> &str {
        &self.config.server_domain
    }

    /// Domain of the first https ngrok tunnel, if the agent is reachable.
    pub async fn current_tunnel_domain(&self) -> Option<String> {
        let url = format!("{}/api/tunnels", self.config.ngrok_api_url.trim_end_matches('/'));

        let response = match self.http.get(&url).timeout(NGROK_TIMEOUT).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Could not connect to ngrok API");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "Failed to fetch ngrok tunnels");
            return None;
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let domain = pick_https_domain(&body);
                if let Some(domain) = &domain {
                    info!(domain = %domain, "Detected ngrok tunnel");
                }
                domain
            }
            Err(err) => {
                warn!(error = %err, "Unreadable ngrok tunnel list");
                None
            }
        }
    }

    /// Tunnel domain, else the configured domain, else empty.
    pub async fn server_domain(&self) -> String {
        if let Some(domain) = self.current_tunnel_domain().await {
            return domain;
        }

        if !self.config.server_domain.is_empty() {
            info!(domain = %self.config.server_domain, "Using configured server domain");
            return self.config.server_domain.clone();
        }

        warn!("No server domain available, is ngrok running?");
        String::new()
    }
}

/// First `https` tunnel's public URL, without the scheme.
fn pick_https_domain(body: &Value) -> Option<String> {
    body.get("tunnels")?
        .as_array()?
        .iter()
        .filter(|tunnel| tunnel.get("proto").and_then(Value::as_str) == Some("https"))
        .find_map(|tunnel| tunnel.get("public_url").and_then(Value::as_str))
        .map(|url| url.trim_start_matches("https://").to_string())
}
