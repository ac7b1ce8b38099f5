//! Line reassembly from arbitrarily chunked reads
//!
//! Serial and socket reads hand back whatever bytes happen to be available,
//! so a telemetry line may be split anywhere: mid-field, mid-terminator, or in
//! the middle of a multi-byte sequence. [`LineAssembler`] keeps the trailing
//! partial line between calls and only ever emits complete lines.

use crate::config::defaults::MAX_FRAGMENT_BYTES;

const LINE_TERMINATOR: u8 = b'\n';

/// Turns a sequence of byte chunks into complete text lines.
#[derive(Debug)]
pub struct LineAssembler {
    /// Bytes received since the last terminator. Never contains `\n`.
    pending: Vec<u8>,
    max_fragment_bytes: usize,
    /// Bytes dropped because a fragment outgrew `max_fragment_bytes`
    discarded_bytes: u64,
    /// Dropping the rest of an oversized line until its terminator
    discarding: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::with_max_fragment(MAX_FRAGMENT_BYTES)
    }

    /// Create an assembler that drops any partial line longer than `max_bytes`.
    pub fn with_max_fragment(max_bytes: usize) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            max_fragment_bytes: max_bytes.max(1),
            discarded_bytes: 0,
            discarding: false,
        }
    }

    /// Append `chunk` and return every line it completes.
    ///
    /// The returned iterator owns the completed bytes, so the assembler can be
    /// fed again before it is exhausted. Lines are decoded lazily; invalid
    /// UTF-8 is dropped and NUL bytes are stripped.
    pub fn feed(&mut self, mut chunk: &[u8]) -> CompleteLines {
        if chunk.is_empty() {
            return CompleteLines::empty();
        }

        if self.discarding {
            let Some(end) = chunk.iter().position(|&b| b == LINE_TERMINATOR) else {
                self.discarded_bytes += chunk.len() as u64;
                return CompleteLines::empty();
            };
            self.discarded_bytes += (end + 1) as u64;
            self.discarding = false;
            chunk = &chunk[end + 1..];
        }

        self.pending.extend_from_slice(chunk);

        let Some(last_terminator) = self.pending.iter().rposition(|&b| b == LINE_TERMINATOR) else {
            self.enforce_fragment_limit();
            return CompleteLines::empty();
        };

        // Swap in the new fragment in one step so `pending` is never observed
        // half-updated.
        let fragment = self.pending.split_off(last_terminator + 1);
        let complete = std::mem::replace(&mut self.pending, fragment);
        self.enforce_fragment_limit();

        CompleteLines { bytes: complete, pos: 0 }
    }

    /// Number of bytes held back waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The partial line currently held back.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Total bytes discarded from lines that grew past the limit, including
    /// the remainder of each such line up to its terminator.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Forget any partial line (used when a new recording session starts).
    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }

    fn enforce_fragment_limit(&mut self) {
        if self.pending.len() > self.max_fragment_bytes {
            tracing::warn!(
                fragment_bytes = self.pending.len(),
                limit = self.max_fragment_bytes,
                "Partial line exceeded limit without a terminator, discarding"
            );
            self.discarded_bytes += self.pending.len() as u64;
            self.pending.clear();
            self.discarding = true;
        }
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CompleteLines
// ============================================================================

/// Lazy iterator over the lines completed by one [`LineAssembler::feed`] call.
///
/// Each yielded line has its terminator removed. A preceding `\r` is kept
/// and left to the parser's whitespace trim.
#[derive(Debug)]
pub struct CompleteLines {
    bytes: Vec<u8>,
    pos: usize,
}

impl CompleteLines {
    fn empty() -> Self {
        Self { bytes: Vec::new(), pos: 0 }
    }
}

impl Iterator for CompleteLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
            .unwrap_or(rest.len());
        let line = decode_line(&rest[..end]);
        self.pos += end + 1;
        Some(line)
    }
}

/// Decode one raw line, skipping undecodable bytes and NULs.
fn decode_line(mut raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    loop {
        match std::str::from_utf8(raw) {
            Ok(valid) => {
                push_without_nul(&mut out, valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = raw.split_at(e.valid_up_to());
                // `valid_up_to` guarantees this prefix is valid UTF-8
                if let Ok(valid) = std::str::from_utf8(valid) {
                    push_without_nul(&mut out, valid);
                }
                // A truncated sequence at the very end has no error_len
                let skip = e.error_len().unwrap_or(rest.len());
                raw = &rest[skip..];
            }
        }
    }
}

fn push_without_nul(out: &mut String, s: &str) {
    out.extend(s.chars().filter(|&c| c != '\0'));
}
