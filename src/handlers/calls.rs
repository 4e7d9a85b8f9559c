//! # Call Handlers
//!
//! - `POST /api/v1/calls/flow`: tells the telephony platform where to stream
//! - `GET /api/v1/calls/media-stream`: the stream itself, bridged to the assistant
//!
//! A media stream is accepted first and the assistant call is created in the
//! background. Until the assistant is connected, telephony frames queue up in
//! the actor's inbound channel.

use crate::bridge::frame::Frame;
use crate::bridge::session::BridgeSession;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::websocket::{CloseConnection, HeartbeatSettings, TelephonyConnection, TelephonyWebSocket};

use actix::Addr;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};
use uuid::Uuid;

const MEDIA_STREAM_PATH: &str = "/api/v1/calls/media-stream";

/// Call details the telephony platform posts when it asks for a flow.
#[derive(Debug, Deserialize)]
pub struct CallFlowRequest {
    pub call_id: String,
    pub account_id: String,
    pub from_number: String,
    pub to_number: String,
}

/// Instruction to stream call audio to a WebSocket.
#[derive(Debug, Serialize)]
pub struct StreamFlow {
    pub action: &'static str,
    pub ws_url: String,
    pub chunk_size: u32,
    pub record: bool,
}

impl StreamFlow {
    pub fn new(domain: &str, chunk_size: u32, record: bool) -> Self {
        Self {
            action: "stream",
            ws_url: format!("wss://{}{}", domain, MEDIA_STREAM_PATH),
            chunk_size,
            record,
        }
    }
}

pub async fn stream_flow(
    state: web::Data<AppState>,
    payload: web::Json<CallFlowRequest>,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let domain = state.public_url.server_domain().await;
    if domain.is_empty() {
        return Err(AppError::ConfigError(
            "no public domain available for the media stream".to_string(),
        ));
    }

    let flow = StreamFlow::new(&domain, config.telephony.chunk_size, config.telephony.record);
    info!(
        call_id = %payload.call_id,
        account_id = %payload.account_id,
        from = %payload.from_number,
        to = %payload.to_number,
        ws_url = %flow.ws_url,
        "Returning stream flow"
    );

    Ok(HttpResponse::Ok().json(flow))
}

/// Accept the telephony WebSocket and bridge it to a new assistant call.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let config = state.get_config();
    let session_id = Uuid::new_v4().to_string();
    info!(
        session_id = %session_id,
        peer = ?req.connection_info().peer_addr(),
        "Media stream connection request"
    );

    let (tx, rx) = mpsc::channel(config.bridge.inbound_queue);
    let heartbeat = HeartbeatSettings {
        interval: Duration::from_secs(config.telephony.heartbeat_interval_secs),
        client_timeout: Duration::from_secs(config.telephony.client_timeout_secs),
    };
    let actor = TelephonyWebSocket::new(session_id.clone(), tx, heartbeat);
    let (addr, response) = ws::WsResponseBuilder::new(actor, &req, stream).start_with_addr()?;

    actix_web::rt::spawn(run_bridge(state, session_id, addr, rx));

    Ok(response)
}

async fn run_bridge(
    state: web::Data<AppState>,
    session_id: String,
    addr: Addr<TelephonyWebSocket>,
    inbound: mpsc::Receiver<Frame>,
) {
    let remote = match connect_assistant(&state).await {
        Ok(remote) => remote,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "Error in media stream");
            state.setup_failed();
            addr.do_send(CloseConnection);
            return;
        }
    };

    let settings = state.get_config().bridge_settings();
    let local = TelephonyConnection::new(addr, inbound);

    state.session_started();
    let summary = BridgeSession::new(session_id, local, remote, settings).run().await;
    state.session_finished(&summary);
}

async fn connect_assistant(state: &AppState) -> AppResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let url = state.assistant.create_call().await?;

    let (socket, response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|err| AppError::Upstream(format!("assistant WebSocket connect failed: {}", err)))?;

    debug!(status = response.status().as_u16(), "Assistant WebSocket connected");
    Ok(socket)
}
