use crate::error::Error;
use crate::protocol::codec::{self, HEADER_LEN};
use crate::wire_trace;
use bytes::{Buf, BytesMut};
use plist::Dictionary;

/// Incremental decoder of length-prefixed plist frames.
///
/// Raw bytes are accumulated across calls. A frame is decoded as soon as its header and whole
/// body are buffered. Errors are local to one frame, after an error decoder resumes at:
/// - the byte that follows an oversized length header (header bytes are dropped)
/// - the boundary of the next frame if frame body is not a valid plist dictionary
#[derive(Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Body length of a frame which header is already parsed.
    body_length: Option<usize>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of buffered but not yet consumed bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append raw bytes to the decoder buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        wire_trace!("recv", chunk);
        self.buffer.extend_from_slice(chunk);
    }

    /// Decode next complete frame from buffered bytes.
    /// Return `Ok(None)` if there is not enough data for a frame yet.
    pub fn next_message(&mut self) -> Result<Option<Dictionary>, Error> {
        let body_length = match self.body_length {
            Some(length) => length,
            None => {
                if self.buffer.len() < HEADER_LEN {
                    return Ok(None);
                }
                let header = [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]];
                match codec::parse_length(header) {
                    Ok(length) => {
                        let length = length as usize;
                        self.body_length = Some(length);
                        length
                    }
                    Err(e) => {
                        self.buffer.advance(HEADER_LEN);
                        return Err(e);
                    }
                }
            }
        };

        if self.buffer.len() < HEADER_LEN + body_length {
            return Ok(None);
        }

        let frame = self.buffer.split_to(HEADER_LEN + body_length);
        self.body_length = None;
        codec::decode(&frame[HEADER_LEN..]).map(Some)
    }

    /// Feed a chunk of raw bytes and call `on_message` for every frame completed by it.
    ///
    /// Stops at the first broken frame and returns its error, frames that follow it stay
    /// buffered until the next call (feeding an empty chunk is enough to continue).
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_message: F) -> Result<(), Error>
    where
        F: FnMut(Dictionary),
    {
        self.extend(chunk);
        while let Some(message) = self.next_message()? {
            on_message(message);
        }
        Ok(())
    }
}
