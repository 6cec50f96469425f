//! Reassembly of fragmented response bodies
//!
//! The proxy hands response bodies over in arbitrary fragments. The
//! reassemblers keep the unconsumed tail and only yield units (lines, SSE
//! frames, whole documents) once their terminator has been seen.

use std::mem;

const DATA_PREFIX: &[u8] = b"data:";
const EVENT_PREFIX: &[u8] = b"event:";

/// One server-sent event frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: Vec<u8>,
}

/// Line oriented reassembler for `text/event-stream` bodies.
#[derive(Debug, Default)]
pub struct SseReassembler {
    buffer: Vec<u8>,
    /// Start of the unconsumed tail
    start: usize,
    /// Everything before this offset is known to contain no newline
    scanned: usize,
    pending: Option<SseEvent>,
}

impl SseReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment
    pub fn push(&mut self, fragment: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buffer.extend_from_slice(fragment);
    }

    /// Next complete line, without its `\n` or trailing `\r`
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let offset = self.buffer[self.scanned..].iter().position(|&b| b == b'\n');
        let Some(offset) = offset else {
            self.scanned = self.buffer.len();
            return None;
        };

        let end = self.scanned + offset;
        let mut line = &self.buffer[self.start..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = line.to_vec();

        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Payload of the next complete `data:` line. Other lines are consumed
    /// and skipped.
    pub fn next_data_line(&mut self) -> Option<Vec<u8>> {
        while let Some(line) = self.next_line() {
            if let Some(payload) = field_value(&line, DATA_PREFIX) {
                return Some(payload.to_vec());
            }
        }
        None
    }

    /// Next complete frame. A frame ends at a blank line; frames without
    /// any field are skipped.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        while let Some(line) = self.next_line() {
            if line.is_empty() {
                if let Some(event) = self.pending.take() {
                    return Some(event);
                }
                continue;
            }

            if let Some(value) = field_value(&line, DATA_PREFIX) {
                let pending = self.pending.get_or_insert_with(SseEvent::default);
                if !pending.data.is_empty() {
                    pending.data.push(b'\n');
                }
                pending.data.extend_from_slice(value);
            } else if let Some(value) = field_value(&line, EVENT_PREFIX) {
                let pending = self.pending.get_or_insert_with(SseEvent::default);
                pending.event = Some(String::from_utf8_lossy(value).into_owned());
            }
            // comments (":") and id/retry fields carry nothing we translate
        }
        None
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.start = 0;
        self.scanned = 0;
        self.pending = None;
    }

    /// Whether no unconsumed bytes remain
    pub fn is_empty(&self) -> bool {
        self.start == self.buffer.len() && self.pending.is_none()
    }

    /// Number of unconsumed bytes
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.start
    }
}

fn field_value<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    let value = line.strip_prefix(prefix)?;
    Some(value.strip_prefix(b" ").unwrap_or(value))
}

/// Accumulates a buffered (non-streamed) body until end of stream
#[derive(Debug, Default)]
pub struct BodyReassembler {
    buffer: Vec<u8>,
}

impl BodyReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// Take the accumulated document, leaving the reassembler empty
    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
