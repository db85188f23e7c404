//! Splitting a byte stream into complete JSON values.

use serde_json::Deserializer;
use serde_json::Value;

/// Maximum bytes a single frame (and therefore the read buffer) may occupy.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Extract every complete JSON value from the front of `buf`, leaving any
/// trailing partial value in place for the next read.
///
/// Returns a fatal error when the buffered bytes cannot be the start of a
/// valid JSON value; the connection should be dropped.
pub fn split_frames(buf: &mut Vec<u8>) -> Result<Vec<Value>, serde_json::Error> {
    let mut frames = Vec::new();
    let mut stream = Deserializer::from_slice(buf).into_iter::<Value>();
    let consumed = loop {
        match stream.next() {
            Some(Ok(value)) => frames.push(value),
            Some(Err(err)) if err.is_eof() => break stream.byte_offset(),
            Some(Err(err)) => return Err(err),
            None => break stream.byte_offset(),
        }
    };
    buf.drain(..consumed);
    Ok(frames)
}
