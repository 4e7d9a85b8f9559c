//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## Sharing Pattern:
//! - **Arc<RwLock<T>>** for the data that changes (config, session counters)
//! - **Clients** are cheap to clone and share one connection pool
//! - **start_time** never changes, so it is stored directly
//!
//! Running bridge sessions do not hold a reference to the state; the handler
//! that spawned a session reports its summary back when it ends.

use crate::bridge::session::SessionSummary;
use crate::clients::{AssistantClient, PublicUrlResolver};
use crate::config::AppConfig;
use anyhow::Result;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration the server was started with
    pub config: Arc<RwLock<AppConfig>>,

    /// Session counters, updated as calls start and end
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub assistant: AssistantClient,

    pub public_url: PublicUrlResolver,

    pub start_time: Instant,
}

/// Counters across all bridge sessions since server start.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Sessions currently bridging
    pub active_sessions: u32,

    /// Sessions that reached the bridging stage
    pub total_sessions: u64,

    /// Media streams that never got an assistant connection
    pub failed_setups: u64,

    /// Sessions that ended because a connection failed
    pub failed_sessions: u64,

    /// Telephony audio frames forwarded to the assistant
    pub call_frames_relayed: u64,

    /// Aggregated chunks sent back to the telephony side
    pub chunks_relayed: u64,
}

impl AppState {
    /// Create the state and the HTTP clients it owns.
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            assistant: AssistantClient::new(http.clone(), config.assistant.clone()),
            public_url: PublicUrlResolver::new(http, config.public_url.clone()),
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    /// Get a copy of the current configuration.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A media stream got its assistant connection and is now bridging.
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_sessions += 1;
        metrics.total_sessions += 1;
    }

    /// A bridging session ended.
    pub fn session_finished(&self, summary: &SessionSummary) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
        metrics.call_frames_relayed += summary.call_frames_relayed;
        metrics.chunks_relayed += summary.chunks_relayed;
        if summary.failed() {
            metrics.failed_sessions += 1;
        }
    }

    /// A media stream was closed before any session could start.
    pub fn setup_failed(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.failed_setups += 1;
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::session::PumpExit;
    use crate::error::BridgeError;
    use std::time::Duration;

    fn summary(local_exit: PumpExit) -> SessionSummary {
        SessionSummary {
            session_id: "s".into(),
            call_frames_relayed: 10,
            assistant_frames_received: 100,
            chunks_relayed: 2,
            discarded_bytes: 0,
            local_exit,
            remote_exit: PumpExit::Cancelled,
            duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_session_counters() {
        let state = AppState::new(AppConfig::default()).unwrap();
        state.session_started();
        state.session_started();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 2);

        state.session_finished(&summary(PumpExit::PeerClosed));
        state.session_finished(&summary(PumpExit::Failed(BridgeError::Closed)));
        state.setup_failed();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_sessions, 0);
        assert_eq!(metrics.total_sessions, 2);
        assert_eq!(metrics.failed_sessions, 1);
        assert_eq!(metrics.failed_setups, 1);
        assert_eq!(metrics.call_frames_relayed, 20);
        assert_eq!(metrics.chunks_relayed, 4);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let state = AppState::new(AppConfig::default()).unwrap();
        state.session_finished(&summary(PumpExit::PeerClosed));
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }
}
