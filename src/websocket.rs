//! # Telephony WebSocket Actor
//!
//! The telephony platform connects to `/api/v1/calls/media-stream` and streams
//! call audio as JSON text frames. Each connection is one `TelephonyWebSocket`
//! actor; the bridge session talks to it only through a channel and actor
//! messages, so it never touches the actix context directly.
//!
//! ## Data flow:
//! - **Socket → bridge**: text/binary frames are pushed into a bounded channel
//!   that the session reads as a `ChannelSource`
//! - **Bridge → socket**: `OutboundFrame` messages are written to the client
//! - **Close**: `CloseConnection` sends a normal close frame and stops the actor
//!
//! When the actor stops, its end of the channel is dropped and the session sees
//! the telephony side as closed. If the session drops its end first, the actor
//! sends a normal close frame and stops, even while it is waiting on a full
//! queue.
//!
//! ## Outbound backpressure:
//! A delivered `OutboundFrame` is written into the context's buffer, which is
//! flushed as fast as the socket accepts it. The session's send timeout
//! therefore bounds the mailbox hand-off only; a client that reads slower than
//! real time grows that buffer rather than stalling the assistant pump.

use crate::bridge::connection::{ChannelSource, Connection, FrameSink};
use crate::bridge::frame::Frame;
use crate::error::BridgeError;

use actix::prelude::*;
use actix_web_actors::ws;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Liveness settings for one telephony connection.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    /// How often liveness is checked and a ping is sent
    pub interval: Duration,
    /// How long the client may stay silent before the connection is dropped
    pub client_timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            client_timeout: Duration::from_secs(60),
        }
    }
}

/// WebSocket actor for one telephony media stream.
pub struct TelephonyWebSocket {
    session_id: String,

    /// Producer side of the session's inbound channel; `None` once the bridge
    /// has stopped listening
    inbound: Option<mpsc::Sender<Frame>>,

    heartbeat: HeartbeatSettings,

    /// Last time anything arrived from the client
    last_heartbeat: Instant,

    /// Set once a close frame has been queued
    closing: bool,
}

impl TelephonyWebSocket {
    pub fn new(session_id: String, inbound: mpsc::Sender<Frame>, heartbeat: HeartbeatSettings) -> Self {
        Self {
            session_id,
            inbound: Some(inbound),
            heartbeat,
            last_heartbeat: Instant::now(),
            closing: false,
        }
    }

    /// Hand a frame to the bridge.
    ///
    /// Processing of further socket frames is paused while the channel is full.
    fn forward(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(tx) = self.inbound.as_ref() else {
            return;
        };

        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                debug!(session_id = %self.session_id, kind = frame.kind(), "Inbound queue full, pausing reads");
                let tx = tx.clone();
                ctx.wait(
                    async move { tx.send(frame).await.is_ok() }
                        .into_actor(self)
                        .map(|delivered, act, ctx| {
                            if !delivered {
                                act.bridge_gone(ctx);
                            }
                        }),
                );
            }
            Err(TrySendError::Closed(_)) => self.bridge_gone(ctx),
        }
    }

    fn bridge_gone(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        debug!(session_id = %self.session_id, "Bridge no longer reading, closing");
        self.inbound = None;
        self.close(Some(ws::CloseCode::Normal.into()), ctx);
    }

    /// Queue at most one close frame, then stop.
    fn close(&mut self, reason: Option<ws::CloseReason>, ctx: &mut ws::WebsocketContext<Self>) {
        if !self.closing {
            self.closing = true;
            ctx.close(reason);
        }
        ctx.stop();
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat.interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.heartbeat.client_timeout {
                warn!(session_id = %act.session_id, "Telephony heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for TelephonyWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "Telephony connection started");
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Dropping the sender ends the session's telephony source
        self.inbound = None;
        info!(session_id = %self.session_id, "Telephony connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TelephonyWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => self.forward(Frame::Text(text.to_string()), ctx),
            Ok(ws::Message::Binary(data)) => self.forward(Frame::Binary(data.to_vec()), ctx),
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, ?reason, "Telephony closed the stream");
                self.close(reason, ctx);
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session_id, "Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, error = %err, "Telephony protocol error");
                ctx.stop();
            }
        }
    }
}

/// Write a frame to the telephony client.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub Frame);

/// Close the telephony connection normally.
#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseConnection;

impl Handler<OutboundFrame> for TelephonyWebSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match msg.0 {
            Frame::Text(text) => ctx.text(text),
            Frame::Binary(data) => ctx.binary(data),
        }
    }
}

impl Handler<CloseConnection> for TelephonyWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseConnection, ctx: &mut Self::Context) {
        debug!(session_id = %self.session_id, "Closing telephony connection");
        self.close(Some(ws::CloseCode::Normal.into()), ctx);
    }
}

/// Sending half of a telephony connection, backed by the actor's mailbox.
pub struct ActorSink {
    addr: Addr<TelephonyWebSocket>,
}

impl ActorSink {
    pub fn new(addr: Addr<TelephonyWebSocket>) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl FrameSink for ActorSink {
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError> {
        self.addr
            .send(OutboundFrame(frame))
            .await
            .map_err(|_| BridgeError::Closed)
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        // A mailbox error means the actor has already stopped
        if self.addr.send(CloseConnection).await.is_err() {
            debug!("Telephony actor already stopped");
        }
        Ok(())
    }
}

/// The telephony side of a bridge session.
pub struct TelephonyConnection {
    addr: Addr<TelephonyWebSocket>,
    inbound: mpsc::Receiver<Frame>,
}

impl TelephonyConnection {
    pub fn new(addr: Addr<TelephonyWebSocket>, inbound: mpsc::Receiver<Frame>) -> Self {
        Self { addr, inbound }
    }
}

impl Connection for TelephonyConnection {
    type Sink = ActorSink;
    type Source = ChannelSource;

    fn split(self) -> (Self::Sink, Self::Source) {
        (ActorSink::new(self.addr), ChannelSource::new(self.inbound))
    }
}
