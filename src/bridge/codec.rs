//! Newline framing for tool helper streams.
//!
//! The helper's stdout arrives in arbitrary chunks: one read may carry half
//! a JSON value, or three of them. [`LineCodec`] keeps the incomplete tail
//! buffered and yields only complete `\n`-terminated lines, so every JSON
//! parse happens on a whole line exactly once.
//!
//! Lines the bridge can never use are dropped inside the codec instead of
//! surfacing as stream errors: anything over [`MAX_LINE_BYTES`], and
//! anything that is not valid UTF-8. The decoder never returns an error.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted from a helper: 1 MiB.
///
/// Longer lines are discarded up to their terminating newline.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line codec for helper stdio.
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use chat_relay::bridge::codec::LineCodec;
///
/// let lines = FramedRead::new(child_stdout, LineCodec::new());
/// ```
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
    skipped: u64,
}

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            skipped: 0,
        }
    }

    /// Number of lines dropped so far as over-long or undecodable.
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    /// Pull the next usable line out of `src`.
    ///
    /// `LinesCodec` has already consumed the offending bytes (or switched to
    /// discarding them) when it reports an error, so retrying always makes
    /// progress.
    fn next_line(&mut self, src: &mut BytesMut, eof: bool) -> Option<String> {
        loop {
            let decoded = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            match decoded {
                Ok(line) => return line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    self.skipped += 1;
                    warn!(
                        limit = MAX_LINE_BYTES,
                        "tool bridge: discarding over-long line"
                    );
                }
                Err(LinesCodecError::Io(err)) => {
                    self.skipped += 1;
                    warn!(%err, "tool bridge: discarding undecodable line");
                }
            }
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    /// Returns `Ok(None)` while `src` holds no complete usable line yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.next_line(src, false))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.next_line(src, true))
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.lines
            .encode(item, dst)
            .map_err(|err| AppError::Io(format!("failed to frame outbound line: {err}")))
    }
}
