//! Byte chunks to logical lines.

use bytes::{Bytes, BytesMut};

/// One logical line of the upstream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Line content without its terminator.
    pub text: String,
    /// Exact input bytes this frame accounts for, including adjacent blank
    /// lines that were folded into it.
    pub raw: Bytes,
}

impl Frame {
    fn new(text: String, raw: BytesMut) -> Self {
        Self {
            text,
            raw: raw.freeze(),
        }
    }
}

/// Leftovers at end of stream.
#[derive(Debug, Default)]
pub struct Flush {
    /// Unterminated final line, if it was not blank.
    pub frame: Option<Frame>,
    /// Raw bytes that no frame claimed (trailing blank lines).
    pub trailing: Bytes,
}

/// Rebuilds `\n`-terminated lines from arbitrarily split chunks.
///
/// Partial lines are held as raw bytes, so a UTF-8 sequence split across
/// chunks decodes correctly once its line completes. Concatenating the
/// `raw` of every emitted frame plus [`Flush::trailing`] reproduces the
/// input exactly.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: BytesMut,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
    /// Blank-line bytes waiting for the next frame.
    orphan: BytesMut,
}

impl FrameReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.pending.len() + self.orphan.len()
    }

    /// Feed one chunk and return every line it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames: Vec<(String, BytesMut)> = Vec::new();
        while let Some(pos) = self.next_newline() {
            let line = self.pending.split_to(pos + 1);
            let text = decode_line(&line[..pos]);

            if text.trim().is_empty() {
                match frames.last_mut() {
                    Some((_, raw)) => raw.extend_from_slice(&line),
                    None => self.orphan.extend_from_slice(&line),
                }
                continue;
            }

            let mut raw = self.orphan.split();
            raw.extend_from_slice(&line);
            frames.push((text, raw));
        }

        frames
            .into_iter()
            .map(|(text, raw)| Frame::new(text, raw))
            .collect()
    }

    fn next_newline(&mut self) -> Option<usize> {
        match self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let pos = self.scanned + offset;
                self.scanned = 0;
                Some(pos)
            },
            None => {
                self.scanned = self.pending.len();
                None
            },
        }
    }

    /// Flush the unterminated remainder.
    pub fn finish(&mut self) -> Flush {
        self.scanned = 0;
        let rest = self.pending.split();
        let text = decode_line(&rest);

        if text.trim().is_empty() {
            let mut trailing = self.orphan.split();
            trailing.extend_from_slice(&rest);
            return Flush {
                frame: None,
                trailing: trailing.freeze(),
            };
        }

        let mut raw = self.orphan.split();
        raw.extend_from_slice(&rest);
        Flush {
            frame: Some(Frame::new(text, raw)),
            trailing: Bytes::new(),
        }
    }
}

/// Decode a line without its `\n`, dropping one trailing `\r`.
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
