//! Incremental server-sent-events decoder.
//!
//! Chunks from the response body are appended to a byte buffer; complete
//! event blocks (terminated by a blank line) are drained and parsed into
//! [`SseFrame`]s. A trailing partial block stays buffered for the next
//! chunk, and is dropped if the connection closes before it completes.

/// Largest partial block kept before the stream is considered broken.
pub const DEFAULT_MAX_BUFFERED: usize = 1 << 20;

/// One dispatched SSE message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    max_buffered: usize,
    // last byte pushed was a `\r`; a following `\n` belongs to it
    after_cr: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFERED)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffered,
            after_cr: false,
        }
    }

    /// Append a body chunk. `\r\n` and a lone `\r` are both normalized to
    /// `\n`, including when the pair is split across chunks.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.reserve(chunk.len());
        for &b in chunk {
            match b {
                b'\r' => {
                    self.buffer.push(b'\n');
                    self.after_cr = true;
                }
                b'\n' if self.after_cr => self.after_cr = false,
                _ => {
                    self.buffer.push(b);
                    self.after_cr = false;
                }
            }
        }
    }

    /// Drain every complete event block currently buffered.
    pub fn drain(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        while let Some(pos) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..2); // remove the \n\n delimiter

            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block)) {
                frames.push(frame);
            }
        }

        frames
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The undrained partial block has grown past the limit, i.e. the
    /// server is not sending event boundaries.
    pub fn overflowed(&self) -> bool {
        self.buffer.len() > self.max_buffered
    }
}

fn find_block_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Parse one event block. Blocks made only of comments yield nothing.
fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut seen_field = false;

    for line in block.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => frame.event = Some(value.to_owned()),
            "id" => frame.id = Some(value.to_owned()),
            "retry" => match value.trim().parse::<u64>() {
                Ok(ms) => frame.retry = Some(ms),
                Err(_) => continue,
            },
            _ => continue,
        }
        seen_field = true;
    }

    if !seen_field {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
