//! Bounded, sequence-numbered store of terminal output chunks.
//!
//! Every appended chunk gets the next sequence number. Once `capacity` is
//! exceeded the oldest chunks are dropped; readers asking for data older than
//! what is retained are clamped forward to the oldest chunk still held. The
//! loss is silent: a bounded buffer is the point.

use std::collections::VecDeque;

/// Default number of chunks retained per session.
pub const DEFAULT_MAX_OUTPUT_CHUNKS: usize = 10_000;

#[derive(Debug)]
pub struct OutputBuffer {
    chunks: VecDeque<String>,
    next_seq: u64,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::with_capacity(capacity.min(1024)),
            next_seq: 0,
            capacity,
        }
    }

    /// Append a chunk, evicting the oldest one if full. Returns the sequence
    /// number assigned to the chunk.
    pub fn push(&mut self, chunk: String) -> u64 {
        if self.chunks.len() == self.capacity {
            self.chunks.pop_front();
        }
        self.chunks.push_back(chunk);
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Number of chunks ever appended. This is the cursor a reader holds after
    /// consuming everything.
    pub fn seq(&self) -> u64 {
        self.next_seq
    }

    /// Sequence number of the oldest chunk still retained.
    pub fn earliest_seq(&self) -> u64 {
        self.next_seq - self.chunks.len() as u64
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Concatenate every retained chunk at or after `cursor` and return it
    /// together with the current sequence number.
    pub fn read_since(&self, cursor: u64) -> (String, u64) {
        let start = cursor.max(self.earliest_seq());
        if start >= self.next_seq {
            return (String::new(), self.next_seq);
        }

        let skip = (start - self.earliest_seq()) as usize;
        let text: String = self.chunks.iter().skip(skip).map(String::as_str).collect();
        (text, self.next_seq)
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_CHUNKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, chunks: &[&str]) -> OutputBuffer {
        let mut buffer = OutputBuffer::new(capacity);
        for chunk in chunks {
            buffer.push(chunk.to_string());
        }
        buffer
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = OutputBuffer::new(4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.seq(), 0);
        assert_eq!(buffer.read_since(0), (String::new(), 0));
    }

    #[test]
    fn test_push_assigns_consecutive_sequence_numbers() {
        let mut buffer = OutputBuffer::new(4);
        assert_eq!(buffer.push("a".into()), 0);
        assert_eq!(buffer.push("b".into()), 1);
        assert_eq!(buffer.push("c".into()), 2);
        assert_eq!(buffer.seq(), 3);
    }

    #[test]
    fn test_read_since_returns_everything_after_cursor() {
        let buffer = filled(8, &["one ", "two ", "three"]);
        assert_eq!(buffer.read_since(0), ("one two three".to_string(), 3));
        assert_eq!(buffer.read_since(1), ("two three".to_string(), 3));
        assert_eq!(buffer.read_since(2), ("three".to_string(), 3));
        assert_eq!(buffer.read_since(3), (String::new(), 3));
    }

    #[test]
    fn test_read_since_is_idempotent() {
        let buffer = filled(8, &["x", "y"]);
        assert_eq!(buffer.read_since(1), buffer.read_since(1));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let buffer = filled(3, &["a", "b", "c", "d", "e"]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.seq(), 5);
        assert_eq!(buffer.earliest_seq(), 2);
    }

    #[test]
    fn test_stale_cursor_is_clamped() {
        let buffer = filled(3, &["a", "b", "c", "d", "e"]);
        // Chunks 0 and 1 were evicted; reading from 0 starts at chunk 2.
        assert_eq!(buffer.read_since(0), ("cde".to_string(), 5));
        assert_eq!(buffer.read_since(1), ("cde".to_string(), 5));
        assert_eq!(buffer.read_since(3), ("de".to_string(), 5));
    }

    #[test]
    fn test_cursor_beyond_end_returns_current_seq() {
        let buffer = filled(3, &["a"]);
        assert_eq!(buffer.read_since(42), (String::new(), 1));
    }

    #[test]
    fn test_zero_capacity_keeps_latest_chunk() {
        let buffer = filled(0, &["a", "b"]);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.read_since(0), ("b".to_string(), 2));
    }
}
