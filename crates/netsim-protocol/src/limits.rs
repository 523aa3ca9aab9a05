//! Size limits shared by the relay and its clients.
//!
//! Media travels base64-encoded inside a JSON text frame, so the frame limit
//! is derived from the raw media limit rather than set independently.

/// Longest text payload, in characters
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Largest media file, before encoding
pub const MAX_MEDIA_BYTES: u64 = 50 * 1024 * 1024;

/// Room in a frame for everything besides the encoded media: event name,
/// file name, MIME type, ids and timestamps
pub const ENVELOPE_BYTES: usize = 64 * 1024;

/// Largest event frame either side has to accept
pub const MAX_MESSAGE_BYTES: usize = frame_limit(MAX_MEDIA_BYTES);

/// Length of the padded base64 encoding of `raw` bytes
pub const fn base64_len(raw: u64) -> u64 {
    raw.div_ceil(3) * 4
}

/// Frame limit that fits any media file of up to `max_media_bytes`
pub const fn frame_limit(max_media_bytes: u64) -> usize {
    base64_len(max_media_bytes) as usize + ENVELOPE_BYTES
}
