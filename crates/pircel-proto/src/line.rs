//! Newline-delimited framing for tokio.
//!
//! Frames are handed up as raw bytes: decoding happens per line in the
//! engine so that one badly encoded line can be dropped without tearing the
//! stream down.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::{self, ProtocolError};

/// Maximum accepted frame length (8191 bytes as per modern IRC conventions).
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, line ending stripped.
    Line(BytesMut),
    /// A line over the length limit; its bytes were discarded.
    TooLong {
        /// Length of the discarded line including its terminator.
        actual: usize,
        /// Limit in force.
        limit: usize,
    },
}

/// Line codec yielding raw frames and writing newline-terminated text.
///
/// An over-long line is skipped up to its terminator and reported as
/// [`Frame::TooLong`], so the stream stays usable afterwards.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
    /// Bytes dropped so far from an over-long line still being read.
    discarding: Option<usize>,
}

impl LineCodec {
    /// Create a codec with the default length limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_IRC_LINE_LEN)
    }

    /// Create a codec with a custom length limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: None,
        }
    }

    /// Prepare an outgoing line for the wire.
    ///
    /// Cuts the line at the first embedded line ending (a single frame must
    /// never carry two commands) and appends exactly one `\n`.
    pub fn terminate(mut line: String) -> String {
        if let Some(pos) = line.find(&['\r', '\n'][..]) {
            if !line[pos..].trim_start_matches(['\r', '\n']).is_empty() {
                warn!(line = %line, "Outgoing line has an embedded line break, cutting it");
            }
            line.truncate(pos);
        }
        line.push('\n');
        line
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Frame>> {
        if let Some(skipped) = self.discarding {
            return match src.iter().position(|b| *b == b'\n') {
                Some(offset) => {
                    src.advance(offset + 1);
                    self.discarding = None;
                    Ok(Some(Frame::TooLong {
                        actual: skipped + offset + 1,
                        limit: self.max_len,
                    }))
                }
                None => {
                    self.discarding = Some(skipped + src.len());
                    src.clear();
                    Ok(None)
                }
            };
        }

        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let mut line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Ok(Some(Frame::TooLong {
                    actual: line.len(),
                    limit: self.max_len,
                }));
            }

            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.truncate(line.len() - 1);
            }
            Ok(Some(Frame::Line(line)))
        } else if src.len() > self.max_len {
            // No terminator yet: drop what we have and skip the rest later.
            self.discarding = Some(src.len());
            self.next_index = 0;
            src.clear();
            Ok(None)
        } else {
            self.next_index = src.len();
            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        let line = Self::terminate(line);
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}
