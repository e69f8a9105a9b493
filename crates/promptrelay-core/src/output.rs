//! Output accumulation for a single session.
//!
//! Every chunk read from the terminal lands in two places: the full
//! transcript, which only ever grows, and the pending buffer, which holds
//! what the child printed since the last answered prompt. Bytes are stored
//! raw and decoded on read so that escape sequences or UTF-8 characters
//! split across reads come out intact.

use crate::ansi::strip_ansi;

/// Transcript plus "pending since last prompt" buffer.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    transcript: Vec<u8>,
    pending: Vec<u8>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk to both buffers.
    pub fn append(&mut self, chunk: &[u8]) {
        self.transcript.extend_from_slice(chunk);
        self.pending.extend_from_slice(chunk);
    }

    /// Whether anything arrived since the last answered prompt.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Pending output with control sequences removed.
    pub fn normalized_pending(&self) -> String {
        strip_ansi(&self.pending)
    }

    /// Drop the pending buffer once its prompt has been answered.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// The whole session's output with control sequences removed.
    pub fn transcript(&self) -> String {
        strip_ansi(&self.transcript)
    }

    /// Raw bytes received so far.
    pub fn bytes_received(&self) -> usize {
        self.transcript.len()
    }
}
