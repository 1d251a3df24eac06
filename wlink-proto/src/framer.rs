//! Output framing: split a result into notification-sized chunks
//!
//! The wire form of a [`CommandResult`] (status line + output) is cut into
//! consecutive chunks of at most `max_payload` bytes. A cut never lands
//! inside a multi-byte UTF-8 sequence, so every chunk is valid UTF-8 on its
//! own and a client that prints chunks as they arrive never shows mojibake.
//! The one oversize chunk is a single codepoint wider than the limit.
//!
//! ```text
//! "0\nconnected to Home Net", max_payload = 8
//!   #0 "0\nconnec"  #1 "ted to H"  #2 "ome Net"
//! ```

use crate::status::CommandResult;

/// One notification worth of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub sequence_index: usize,
    pub bytes: Vec<u8>,
}

/// Lazy, ordered sequence of chunks for one result.
///
/// Owns the serialized result; once consumed it cannot be restarted.
#[derive(Debug)]
pub struct Frames {
    data: Vec<u8>,
    pos: usize,
    max_payload: usize,
    next_index: usize,
}

/// Frame a result for a link whose notifications carry `max_payload` bytes.
///
/// Chunks never exceed `max_payload`, except a chunk holding one codepoint
/// that is itself wider than the limit. A limit of 0 is treated as 1.
pub fn frame(result: &CommandResult, max_payload: usize) -> Frames {
    Frames {
        data: result.to_wire(),
        pos: 0,
        max_payload: max_payload.max(1),
        next_index: 0,
    }
}

impl Frames {
    fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos
    }

    fn next_cut(&self) -> usize {
        let len = self.data.len();
        let mut end = (self.pos + self.max_payload).min(len);
        // back off continuation bytes (0b10xx_xxxx) so a codepoint stays whole
        while end < len && end > self.pos && is_continuation(self.data[end]) {
            end -= 1;
        }
        if end == self.pos {
            // the next codepoint alone is wider than max_payload: send it whole
            end += 1;
            while end < len && is_continuation(self.data[end]) {
                end += 1;
            }
        }
        end
    }
}

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

impl Iterator for Frames {
    type Item = OutputChunk;

    fn next(&mut self) -> Option<OutputChunk> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = self.next_cut();
        let chunk = OutputChunk {
            sequence_index: self.next_index,
            bytes: self.data[self.pos..end].to_vec(),
        };
        self.pos = end;
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining_bytes();
        // a chunk holds at least one byte and at most max_payload bytes or
        // one 4-byte codepoint
        let lower = remaining.div_ceil(self.max_payload.max(4));
        (lower, Some(remaining))
    }
}

impl std::iter::FusedIterator for Frames {}
