//! Binary frame delimitation for the source channel (spec §4.1).
//!
//! Wire layout: `typeLen : u32 (big-endian) | typeBytes : UTF-8 | payload : remaining bytes`.

use thiserror::Error;

/// A frame whose `typeLen` prefix would claim more than this many bytes is
/// always malformed, regardless of the frame's actual length.
const MAX_TYPE_LEN: usize = 10 * 1024 * 1024;

/// Legacy zip local-file-header magic, accepted without a type prefix.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub const LEGACY_FLAGS_ZIP_TYPE: &str = "flags_zip";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short")]
    TooShort,
    #[error("malformed type prefix")]
    MalformedType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub type_name: &'a str,
    pub payload: &'a [u8],
}

/// Parses a raw binary frame buffer per the `[u32][type][payload]` layout,
/// with the legacy bare-zip compatibility sniff.
pub fn decode_binary_frame(buf: &[u8]) -> Result<BinaryFrame<'_>, FrameError> {
    if buf.len() < 4 {
        return Err(FrameError::TooShort);
    }

    if buf.starts_with(&ZIP_MAGIC) && !looks_like_type_prefixed(buf) {
        return Ok(BinaryFrame {
            type_name: LEGACY_FLAGS_ZIP_TYPE,
            payload: buf,
        });
    }

    let type_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if type_len > MAX_TYPE_LEN || type_len > buf.len().saturating_sub(4) {
        return Err(FrameError::MalformedType);
    }

    let type_bytes = &buf[4..4 + type_len];
    let type_name = std::str::from_utf8(type_bytes).map_err(|_| FrameError::MalformedType)?;
    let payload = &buf[4 + type_len..];
    Ok(BinaryFrame { type_name, payload })
}

/// Encodes a binary frame. The inverse of [`decode_binary_frame`] for the
/// type-prefixed (non-legacy) path.
pub fn encode_binary_frame(type_name: &str, payload: &[u8]) -> Vec<u8> {
    let type_bytes = type_name.as_bytes();
    let mut out = Vec::with_capacity(4 + type_bytes.len() + payload.len());
    out.extend_from_slice(&(type_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(type_bytes);
    out.extend_from_slice(payload);
    out
}

/// A first-four-bytes-as-u32 value that, interpreted as a type length,
/// would plausibly select a short printable ASCII type name out of the
/// remaining buffer. Used only to decide whether a zip-magic-prefixed
/// buffer should still be treated as type-prefixed instead of legacy.
fn looks_like_type_prefixed(buf: &[u8]) -> bool {
    if buf.len() < 4 {
        return false;
    }
    let type_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if type_len == 0 || type_len > 64 || type_len > buf.len().saturating_sub(4) {
        return false;
    }
    buf[4..4 + type_len]
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_type_and_payload() {
        let encoded = encode_binary_frame("database_zip", b"hello");
        let decoded = decode_binary_frame(&encoded).unwrap();
        assert_eq!(decoded.type_name, "database_zip");
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn empty_payload_round_trips() {
        let encoded = encode_binary_frame("styles", &[]);
        let decoded = decode_binary_frame(&encoded).unwrap();
        assert_eq!(decoded.type_name, "styles");
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn rejects_frame_shorter_than_four_bytes() {
        assert_eq!(decode_binary_frame(&[1, 2, 3]), Err(FrameError::TooShort));
        assert_eq!(decode_binary_frame(&[]), Err(FrameError::TooShort));
    }

    #[test]
    fn zero_length_type_is_not_malformed() {
        // typeLen == 0 is within bounds; caller treats the empty type name
        // as unknown (warning only), not as a framing error.
        let encoded = encode_binary_frame("", b"payload");
        let decoded = decode_binary_frame(&encoded).unwrap();
        assert_eq!(decoded.type_name, "");
        assert_eq!(decoded.payload, b"payload");
    }

    #[test]
    fn rejects_type_len_exceeding_max() {
        let mut buf = ((MAX_TYPE_LEN as u32) + 1).to_be_bytes().to_vec();
        buf.extend_from_slice(b"filler");
        assert_eq!(decode_binary_frame(&buf), Err(FrameError::MalformedType));
    }

    #[test]
    fn rejects_type_len_exceeding_remaining_buffer() {
        let mut buf = 100u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");
        assert_eq!(decode_binary_frame(&buf), Err(FrameError::MalformedType));
    }

    #[test]
    fn accepts_legacy_bare_zip_as_flags_zip() {
        let mut buf = ZIP_MAGIC.to_vec();
        buf.extend_from_slice(b"rest-of-zip-bytes");
        let decoded = decode_binary_frame(&buf).unwrap();
        assert_eq!(decoded.type_name, LEGACY_FLAGS_ZIP_TYPE);
        assert_eq!(decoded.payload, buf.as_slice());
    }

    #[test]
    fn type_prefixed_frame_beginning_with_zip_magic_type_name_is_not_treated_as_legacy() {
        // A type name that happens to start with the zip magic bytes as its
        // own ASCII text is vanishingly unlikely; this test instead checks
        // that a well-formed type-prefixed frame is never misdetected when
        // its type bytes are plausible ASCII, even if payload starts with
        // zip bytes.
        let encoded = encode_binary_frame("flags_zip", &ZIP_MAGIC);
        let decoded = decode_binary_frame(&encoded).unwrap();
        assert_eq!(decoded.type_name, "flags_zip");
        assert_eq!(decoded.payload, ZIP_MAGIC);
    }
}
