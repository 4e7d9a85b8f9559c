//! # Audio Processing Module
//!
//! Sample-level handling of assistant audio on its way to the telephony side.
//!
//! ## Audio Format:
//! - **Encoding**: signed 16-bit little-endian PCM
//! - **Channels**: mono
//! - **Rates**: assistant audio at the source rate, telephony at the target rate
//!
//! ## Key Components:
//! - **Aggregator**: combines assistant messages into fewer, larger chunks
//! - **Resampler**: anti-aliased integer-factor decimation

pub mod aggregator;
pub mod resampler;
