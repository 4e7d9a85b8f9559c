//! # Bridge Session
//!
//! Owns one telephony connection and one assistant connection for the lifetime
//! of a single call and relays audio between them.
//!
//! ## Lifecycle:
//! 1. **Open**: both handles have been accepted/established
//! 2. **Bridging**: both directional pumps are running
//! 3. **Closing**: one side ended, errored, or the owner cancelled
//! 4. **Closed**: both handles have been told to close
//!
//! The state only ever moves forward; a session never returns to `Bridging`.
//!
//! ## Pumps:
//! - **telephony → assistant**: classify each frame, forward decoded PCM as binary
//! - **assistant → telephony**: aggregate binary audio, resample each flush,
//!   send it as a JSON envelope
//!
//! Each pump handles its frames strictly in arrival order and is the only owner
//! of what it touches. The aggregation buffer belongs to the assistant pump alone.
//! Receives race the session's cancellation token; sends do not, so an in-flight
//! forward either completes or hits `send_timeout`.

use crate::audio::aggregator::AudioAggregator;
use crate::audio::resampler::resample;
use crate::bridge::classifier::{classify_assistant_frame, classify_call_frame};
use crate::bridge::connection::{Connection, FrameSink, FrameSource, GuardedSink};
use crate::bridge::frame::{Frame, OutboundAudio, StreamOp};
use crate::error::BridgeError;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Settings the bridge needs from configuration.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Assistant messages per outbound chunk
    pub flush_threshold: usize,
    /// Sample rate of assistant audio
    pub source_sample_rate: u32,
    /// Sample rate the telephony side plays
    pub target_sample_rate: u32,
    /// Upper bound on a single outbound send
    pub send_timeout: Duration,
    /// Upper bound on closing each connection
    pub close_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            flush_threshold: 50,
            source_sample_rate: 16000,
            target_sample_rate: 8000,
            send_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Open,
    Bridging,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Bridging => "bridging",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Forward-only state holder, observable through a watch channel.
struct Lifecycle {
    tx: watch::Sender<SessionState>,
}

impl Lifecycle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Open);
        Self { tx }
    }

    /// Move to `next` if it is later than the current state.
    fn advance(&self, next: SessionState) -> bool {
        self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// Its inbound connection closed
    PeerClosed,
    /// The session was cancelled (usually by the other pump)
    Cancelled,
    /// A connection error ended the session
    Failed(BridgeError),
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpExit::PeerClosed => write!(f, "peer closed"),
            PumpExit::Cancelled => write!(f, "cancelled"),
            PumpExit::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// What happened over the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    /// Telephony audio frames forwarded to the assistant
    pub call_frames_relayed: u64,
    /// Binary audio frames received from the assistant
    pub assistant_frames_received: u64,
    /// Aggregated chunks sent to the telephony side
    pub chunks_relayed: u64,
    /// Assistant audio still buffered at close (not relayed)
    pub discarded_bytes: usize,
    pub local_exit: PumpExit,
    pub remote_exit: PumpExit,
    pub duration: Duration,
}

impl SessionSummary {
    /// Whether either side ended with a connection failure.
    pub fn failed(&self) -> bool {
        matches!(self.local_exit, PumpExit::Failed(_)) || matches!(self.remote_exit, PumpExit::Failed(_))
    }
}

struct CallPumpReport {
    exit: PumpExit,
    relayed: u64,
}

struct AssistantPumpReport {
    exit: PumpExit,
    received: u64,
    chunks: u64,
}

/// One call's worth of bridging between a telephony (`local`) and an
/// assistant (`remote`) connection.
pub struct BridgeSession<L, R> {
    session_id: String,
    local: L,
    remote: R,
    settings: BridgeSettings,
    lifecycle: Lifecycle,
    cancel: CancellationToken,
}

impl<L, R> BridgeSession<L, R>
where
    L: Connection,
    R: Connection,
{
    /// Create a session in the `Open` state.
    pub fn new(session_id: impl Into<String>, local: L, remote: R, settings: BridgeSettings) -> Self {
        Self {
            session_id: session_id.into(),
            local,
            remote,
            settings,
            lifecycle: Lifecycle::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.current()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.subscribe()
    }

    /// Token the owner can cancel to end the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bridge both connections until either side ends, then close both.
    pub async fn run(self) -> SessionSummary {
        let span = info_span!("bridge_session", session_id = %self.session_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> SessionSummary {
        let started = Instant::now();
        let Self {
            session_id,
            local,
            remote,
            settings,
            lifecycle,
            cancel,
        } = self;

        let (local_sink, local_source) = local.split();
        let (remote_sink, remote_source) = remote.split();
        let mut local_sink = GuardedSink::new(local_sink);
        let mut remote_sink = GuardedSink::new(remote_sink);
        let mut aggregator = AudioAggregator::new(settings.flush_threshold);

        lifecycle.advance(SessionState::Bridging);
        info!(
            flush_threshold = settings.flush_threshold,
            source_rate = settings.source_sample_rate,
            target_rate = settings.target_sample_rate,
            "Bridge started"
        );

        let (call_report, assistant_report) = tokio::join!(
            // Sources are moved in and dropped when their pump ends, before
            // the closes below.
            async {
                let mut local_source = local_source;
                let report = pump_call_audio(&mut local_source, &mut remote_sink, &settings, &cancel).await;
                begin_closing(&lifecycle, &cancel, "telephony", &report.exit);
                report
            },
            async {
                let mut remote_source = remote_source;
                let report = pump_assistant_audio(
                    &mut remote_source,
                    &mut local_sink,
                    &mut aggregator,
                    &settings,
                    &cancel,
                )
                .await;
                begin_closing(&lifecycle, &cancel, "assistant", &report.exit);
                report
            }
        );

        let discarded_bytes = aggregator.drain_remaining();
        if discarded_bytes > 0 {
            debug!(bytes = discarded_bytes, "Discarding partially buffered assistant audio");
        }

        tokio::join!(
            close_sink("telephony", &mut local_sink, settings.close_timeout),
            close_sink("assistant", &mut remote_sink, settings.close_timeout),
        );
        lifecycle.advance(SessionState::Closed);

        let summary = SessionSummary {
            session_id,
            call_frames_relayed: call_report.relayed,
            assistant_frames_received: assistant_report.received,
            chunks_relayed: assistant_report.chunks,
            discarded_bytes,
            local_exit: call_report.exit,
            remote_exit: assistant_report.exit,
            duration: started.elapsed(),
        };

        info!(
            session_id = %summary.session_id,
            call_frames = summary.call_frames_relayed,
            assistant_frames = summary.assistant_frames_received,
            chunks = summary.chunks_relayed,
            telephony_exit = %summary.local_exit,
            assistant_exit = %summary.remote_exit,
            duration_ms = summary.duration.as_millis() as u64,
            "Bridge closed"
        );

        summary
    }
}

/// Record the end of one pump and stop the other.
fn begin_closing(lifecycle: &Lifecycle, cancel: &CancellationToken, side: &'static str, exit: &PumpExit) {
    if lifecycle.advance(SessionState::Closing) {
        match exit {
            PumpExit::Failed(err) => warn!(side, error = %err, "Connection failed, closing session"),
            other => info!(side, reason = %other, "Closing session"),
        }
    }
    cancel.cancel();
}

/// Receive the next frame unless the session is being torn down.
async fn next_frame<S: FrameSource>(source: &mut S, cancel: &CancellationToken) -> Result<Frame, PumpExit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PumpExit::Cancelled),
        next = source.recv() => match next {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => Err(PumpExit::Failed(err)),
            None => Err(PumpExit::PeerClosed),
        },
    }
}

async fn send_with_timeout<S: FrameSink>(sink: &mut S, frame: Frame, timeout: Duration) -> Result<(), BridgeError> {
    match tokio::time::timeout(timeout, sink.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::SendTimeout(timeout)),
    }
}

async fn close_sink<S: FrameSink>(side: &'static str, sink: &mut GuardedSink<S>, timeout: Duration) {
    match tokio::time::timeout(timeout, sink.close()).await {
        Ok(Ok(())) => debug!(side, "Connection closed"),
        Ok(Err(err)) => warn!(side, error = %err, "Error while closing connection"),
        Err(_) => warn!(side, timeout_ms = timeout.as_millis() as u64, "Timed out closing connection"),
    }
}

/// telephony → assistant. Audio is forwarded unchanged. The assistant call is
/// created at `assistant.sample_rate`, which `AppConfig::validate` requires to
/// be the rate the outbound resampler decimates from.
async fn pump_call_audio<Src, Snk>(
    source: &mut Src,
    sink: &mut Snk,
    settings: &BridgeSettings,
    cancel: &CancellationToken,
) -> CallPumpReport
where
    Src: FrameSource,
    Snk: FrameSink,
{
    let mut relayed = 0;

    let exit = loop {
        let frame = match next_frame(source, cancel).await {
            Ok(frame) => frame,
            Err(exit) => break exit,
        };

        if let StreamOp::Relay(pcm) = classify_call_frame(&frame) {
            if let Err(err) = send_with_timeout(sink, Frame::Binary(pcm), settings.send_timeout).await {
                break PumpExit::Failed(err);
            }
            relayed += 1;
        }
    };

    CallPumpReport { exit, relayed }
}

/// assistant → telephony: aggregate, resample, wrap, send.
async fn pump_assistant_audio<Src, Snk>(
    source: &mut Src,
    sink: &mut Snk,
    aggregator: &mut AudioAggregator,
    settings: &BridgeSettings,
    cancel: &CancellationToken,
) -> AssistantPumpReport
where
    Src: FrameSource,
    Snk: FrameSink,
{
    let mut received = 0;
    let mut chunks = 0;

    let exit = loop {
        let frame = match next_frame(source, cancel).await {
            Ok(frame) => frame,
            Err(exit) => break exit,
        };

        let StreamOp::Relay(audio) = classify_assistant_frame(frame) else {
            continue;
        };
        received += 1;

        let chunk = match aggregator.push(audio) {
            StreamOp::Relay(chunk) => chunk,
            StreamOp::Pass => {
                debug!(
                    buffered = aggregator.len(),
                    threshold = aggregator.flush_threshold(),
                    "Buffered assistant audio"
                );
                continue;
            }
        };

        debug!(
            chunk_id = chunk.sequence_id,
            bytes = chunk.audio.len(),
            "Buffer full, relaying combined audio"
        );

        let resampled = resample(&chunk.audio, settings.source_sample_rate, settings.target_sample_rate);
        let frame = match OutboundAudio::new(&resampled, chunk.sequence_id).into_frame() {
            Ok(frame) => frame,
            Err(err) => break PumpExit::Failed(BridgeError::Encode(err.to_string())),
        };

        if let Err(err) = send_with_timeout(sink, frame, settings.send_timeout).await {
            break PumpExit::Failed(err);
        }
        chunks += 1;
    };

    AssistantPumpReport { exit, received, chunks }
}
