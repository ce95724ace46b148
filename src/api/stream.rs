use super::logging::emit_frame_decode_error;
use crate::error::SessionError;
use crate::types::StreamFrame;

const FRAME_DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";

/// Frames decoded from one chunk, plus the decode error that cut it short.
#[derive(Debug)]
pub struct DecodedChunk {
    pub frames: Vec<StreamFrame>,
    pub error: Option<SessionError>,
}

impl DecodedChunk {
    /// Fails the whole chunk on error, discarding frames decoded before it.
    pub fn into_result(self) -> Result<Vec<StreamFrame>, SessionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.frames),
        }
    }
}

/// Incremental decoder for the run stream.
///
/// Bytes are buffered until a blank line closes a frame, so frames (and
/// multi-byte characters) may be split across any number of chunks.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    scan_from: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every frame the chunk completes. A malformed frame stops
    /// decoding; frames completed ahead of it are still returned and the
    /// rest of the buffer is discarded.
    pub fn process(&mut self, chunk: &[u8]) -> DecodedChunk {
        // Raw carriage returns can only be line-ending noise; JSON escapes them inside strings.
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = find_delimiter(&self.buffer[self.scan_from..]) {
            let segment_end = self.scan_from + offset;
            match decode_segment(&self.buffer[start..segment_end]) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(error) => {
                    self.buffer.clear();
                    self.scan_from = 0;
                    return DecodedChunk {
                        frames,
                        error: Some(error),
                    };
                }
            }
            start = segment_end + FRAME_DELIMITER.len();
            self.scan_from = start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        self.scan_from = self
            .buffer
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);

        DecodedChunk {
            frames,
            error: None,
        }
    }

    /// Decodes whatever the transport left unterminated at end of stream.
    pub fn finish(&mut self) -> Result<Option<StreamFrame>, SessionError> {
        let remaining = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        decode_segment(&remaining)
    }

    pub fn has_pending_bytes(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn find_delimiter(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

fn decode_segment(segment: &[u8]) -> Result<Option<StreamFrame>, SessionError> {
    let text = String::from_utf8_lossy(segment);
    let mut payload: Option<String> = None;

    for line in text.lines() {
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        match payload.as_mut() {
            Some(joined) => {
                joined.push('\n');
                joined.push_str(rest);
            }
            None => payload = Some(rest.to_string()),
        }
    }

    let Some(payload) = payload else {
        return Ok(None);
    };

    serde_json::from_str::<StreamFrame>(&payload)
        .map(Some)
        .map_err(|source| {
            emit_frame_decode_error(&payload, &source);
            SessionError::Decode { payload, source }
        })
}
