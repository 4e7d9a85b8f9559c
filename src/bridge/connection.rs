//! # Connection Handles
//!
//! A bridge session only needs three things from a socket: receive the next
//! frame, send a frame, and close. `FrameSource` and `FrameSink` capture those,
//! and `Connection::split` hands the two halves to different pumps so each
//! direction can run without waiting on the other.
//!
//! ## Implementations:
//! - **WebSocketStream** (tokio-tungstenite): the assistant-side client socket
//! - **ChannelSource**: frames pushed in from an actix actor (telephony side)
//! - **GuardedSink**: wraps any sink so closing twice is a no-op

use crate::bridge::frame::Frame;
use crate::error::BridgeError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Receiving half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// `None` means the peer has gone away cleanly.
    async fn recv(&mut self) -> Option<Result<Frame, BridgeError>>;
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError>;

    /// Close the underlying socket.
    async fn close(&mut self) -> Result<(), BridgeError>;
}

/// A bidirectional connection that can be split into independent halves.
pub trait Connection {
    type Sink: FrameSink;
    type Source: FrameSource;

    fn split(self) -> (Self::Sink, Self::Source);
}

impl<S> Connection for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Sink = SplitSink<WebSocketStream<S>, Message>;
    type Source = SplitStream<WebSocketStream<S>>;

    fn split(self) -> (Self::Sink, Self::Source) {
        StreamExt::split(self)
    }
}

#[async_trait]
impl<S> FrameSink for SplitSink<WebSocketStream<S>, Message>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        };
        SinkExt::send(self, message).await.map_err(BridgeError::from)
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        match SinkExt::close(self).await.map_err(BridgeError::from) {
            Ok(()) | Err(BridgeError::Closed) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<S> FrameSource for SplitStream<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Option<Result<Frame, BridgeError>> {
        loop {
            match StreamExt::next(self).await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(data))),
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "Remote sent close frame");
                    return None;
                }
                // Control frames are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(err) => {
                    return match BridgeError::from(err) {
                        BridgeError::Closed => None,
                        other => Some(Err(other)),
                    };
                }
            }
        }
    }
}

/// Frames delivered over an in-process channel.
///
/// The sender side is dropped when the producer (e.g. a WebSocket actor) stops,
/// which ends the stream.
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Frame>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<Frame, BridgeError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Sink wrapper that closes its inner sink at most once.
pub struct GuardedSink<S> {
    inner: S,
    closed: bool,
}

impl<S: FrameSink> GuardedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl<S: FrameSink> FrameSink for GuardedSink<S> {
    async fn send(&mut self, frame: Frame) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::Closed);
        }
        self.inner.send(frame).await
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        if self.closed {
            return Ok(());
        }
        // Marked first: a close that times out is never retried
        self.closed = true;
        self.inner.close().await
    }
}
