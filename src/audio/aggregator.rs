//! # Outbound Audio Aggregation
//!
//! The assistant streams many small binary frames. Relaying each one to the
//! telephony side individually produces choppy playback, so frames are collected
//! here and released as one contiguous chunk once a message-count threshold is
//! reached.
//!
//! ## Key Features:
//! - **Count-based flushing**: flushes after `flush_threshold` messages, regardless of size
//! - **Receipt order**: chunks are concatenated exactly in the order they arrived
//! - **Sequence ids**: every flush is tagged with an id starting at 1
//! - **Single owner**: owned by one pump, so no locking
//!
//! A fixed message count only approximates a fixed delay when upstream frames
//! are uniformly sized.

use crate::bridge::frame::StreamOp;

/// Flush threshold used when none is configured.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// One combined chunk released by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedChunk {
    /// Id of this flush (1 for the first)
    pub sequence_id: u64,
    /// Concatenated PCM bytes
    pub audio: Vec<u8>,
}

/// Buffer of assistant audio awaiting relay.
#[derive(Debug)]
pub struct AudioAggregator {
    /// Buffered chunks in receipt order
    chunks: Vec<Vec<u8>>,

    /// Number of chunks that triggers a flush
    flush_threshold: usize,

    /// Id the next flush will carry
    next_sequence_id: u64,
}

impl Default for AudioAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl AudioAggregator {
    /// Create an empty aggregator. A threshold of 0 behaves like 1.
    pub fn new(flush_threshold: usize) -> Self {
        let flush_threshold = flush_threshold.max(1);
        Self {
            chunks: Vec::with_capacity(flush_threshold),
            flush_threshold,
            next_sequence_id: 1,
        }
    }

    /// Append one binary frame and flush if the threshold has been reached.
    ///
    /// ## Returns:
    /// - **Relay(chunk)**: the threshold was reached and the buffer was drained
    /// - **Pass**: the frame was buffered, nothing to send yet
    pub fn push(&mut self, chunk: Vec<u8>) -> StreamOp<AggregatedChunk> {
        self.append(chunk);

        if self.chunks.len() >= self.flush_threshold {
            match self.flush() {
                Some(combined) => StreamOp::Relay(combined),
                None => StreamOp::Pass,
            }
        } else {
            StreamOp::Pass
        }
    }

    /// Append one chunk without checking the threshold.
    pub fn append(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    /// Concatenate and clear everything buffered.
    ///
    /// Returns `None` (and leaves the sequence id untouched) when empty.
    pub fn flush(&mut self) -> Option<AggregatedChunk> {
        if self.chunks.is_empty() {
            return None;
        }

        let audio = self.chunks.concat();
        self.chunks.clear();

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;

        Some(AggregatedChunk { sequence_id, audio })
    }

    /// Discard a partially filled buffer, returning how many bytes were dropped.
    pub fn drain_remaining(&mut self) -> usize {
        let dropped = self.buffered_bytes();
        self.chunks.clear();
        dropped
    }

    /// Number of chunks currently buffered.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Id the next flush will carry.
    pub fn sequence_id(&self) -> u64 {
        self.next_sequence_id
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_never_flushes() {
        let mut aggregator = AudioAggregator::new(5);
        for i in 0..4u8 {
            assert_eq!(aggregator.push(vec![i, i]), StreamOp::Pass);
        }
        assert_eq!(aggregator.len(), 4);
        assert_eq!(aggregator.buffered_bytes(), 8);
        assert_eq!(aggregator.sequence_id(), 1);
    }

    #[test]
    fn test_flush_concatenates_in_receipt_order() {
        let mut aggregator = AudioAggregator::new(3);
        aggregator.push(vec![1, 2]);
        aggregator.push(vec![3, 4, 5, 6]);

        match aggregator.push(vec![7, 8]) {
            StreamOp::Relay(chunk) => {
                assert_eq!(chunk.sequence_id, 1);
                assert_eq!(chunk.audio, vec![1, 2, 3, 4, 5, 6, 7, 8]);
            }
            StreamOp::Pass => panic!("expected a flush at the threshold"),
        }

        assert!(aggregator.is_empty());
        assert_eq!(aggregator.sequence_id(), 2);
    }

    #[test]
    fn test_sequence_id_increments_once_per_flush() {
        let mut aggregator = AudioAggregator::new(2);
        let mut ids = Vec::new();

        for i in 0..10u8 {
            if let StreamOp::Relay(chunk) = aggregator.push(vec![i, 0]) {
                ids.push(chunk.sequence_id);
            }
        }

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_default_threshold() {
        let mut aggregator = AudioAggregator::default();
        assert_eq!(aggregator.flush_threshold(), 50);

        for _ in 0..49 {
            assert_eq!(aggregator.push(vec![0, 0]), StreamOp::Pass);
        }
        assert!(matches!(aggregator.push(vec![0, 0]), StreamOp::Relay(_)));
    }

    #[test]
    fn test_zero_threshold_flushes_every_frame() {
        let mut aggregator = AudioAggregator::new(0);
        assert!(matches!(aggregator.push(vec![9, 9]), StreamOp::Relay(_)));
    }

    #[test]
    fn test_empty_flush_keeps_sequence() {
        let mut aggregator = AudioAggregator::new(4);
        assert_eq!(aggregator.flush(), None);
        assert_eq!(aggregator.sequence_id(), 1);
    }

    #[test]
    fn test_drain_remaining_discards_partial_buffer() {
        let mut aggregator = AudioAggregator::new(4);
        aggregator.push(vec![1, 2, 3, 4]);
        aggregator.push(vec![5, 6]);

        assert_eq!(aggregator.drain_remaining(), 6);
        assert!(aggregator.is_empty());
        assert_eq!(aggregator.sequence_id(), 1);
    }
}
