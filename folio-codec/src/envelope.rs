//! Versioned, checksummed envelopes.
//!
//! # Wire Format
//!
//! - 4 bytes: length of everything after this field (u32 little-endian)
//! - 4 bytes: codec version (u32 little-endian)
//! - 4 bytes: CRC32 of the payload (u32 little-endian)
//! - N bytes: version-specific payload

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult};

/// Maximum encoded envelope size, header included.
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024 * 1024;

/// Size of the length, version and checksum fields.
pub const ENVELOPE_HEADER_BYTES: usize = 12;

/// A payload tagged with the codec version that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Codec version of the payload.
    pub version: u32,
    /// Encoded payload.
    pub payload: Bytes,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(version: u32, payload: Bytes) -> Self {
        Self { version, payload }
    }

    /// Returns the payload checksum.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.payload)
    }

    /// Frames the envelope.
    ///
    /// # Errors
    /// Returns an error if the framed envelope exceeds
    /// [`MAX_ENVELOPE_BYTES`].
    pub fn encode(&self) -> CodecResult<Bytes> {
        let size = ENVELOPE_HEADER_BYTES + self.payload.len();
        if size > MAX_ENVELOPE_BYTES {
            return Err(CodecError::MessageTooLarge {
                size,
                max: MAX_ENVELOPE_BYTES,
            });
        }

        // Safe cast: bounded by MAX_ENVELOPE_BYTES, which fits in u32.
        #[allow(clippy::cast_possible_truncation)]
        let len = (size - 4) as u32;

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u32_le(len);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.checksum());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Reads one framed envelope from the front of `data`.
    ///
    /// Returns the envelope and the number of bytes consumed, so several
    /// envelopes can be read from one stream buffer.
    ///
    /// # Errors
    /// Returns an error if the frame is incomplete, oversized or its
    /// checksum does not match.
    pub fn decode(data: &[u8]) -> CodecResult<(Self, usize)> {
        if data.len() < ENVELOPE_HEADER_BYTES {
            return Err(CodecError::InsufficientData {
                need: ENVELOPE_HEADER_BYTES,
                have: data.len(),
            });
        }

        let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let total = 4 + len;
        if total > MAX_ENVELOPE_BYTES {
            return Err(CodecError::MessageTooLarge {
                size: total,
                max: MAX_ENVELOPE_BYTES,
            });
        }
        if total < ENVELOPE_HEADER_BYTES {
            return Err(CodecError::InsufficientData {
                need: ENVELOPE_HEADER_BYTES,
                have: total,
            });
        }
        if data.len() < total {
            return Err(CodecError::InsufficientData {
                need: total,
                have: data.len(),
            });
        }

        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let expected = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let payload = Bytes::copy_from_slice(&data[ENVELOPE_HEADER_BYTES..total]);

        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        Ok((Self { version, payload }, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let envelope = Envelope::new(2, Bytes::from_static(b"abc"));
        let framed = envelope.encode().unwrap();

        assert_eq!(framed.len(), ENVELOPE_HEADER_BYTES + 3);
        assert_eq!(&framed[0..4], &11u32.to_le_bytes());
        assert_eq!(&framed[4..8], &2u32.to_le_bytes());
        assert_eq!(&framed[12..], b"abc");

        let (decoded, consumed) = Envelope::decode(&framed).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(consumed, framed.len());
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let framed = Envelope::new(1, Bytes::from_static(b"payload"))
            .encode()
            .unwrap();
        let mut corrupt = framed.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;

        let err = Envelope::decode(&corrupt).unwrap_err();
        assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_truncated_frame() {
        let framed = Envelope::new(1, Bytes::from_static(b"payload"))
            .encode()
            .unwrap();

        let err = Envelope::decode(&framed[..5]).unwrap_err();
        assert_eq!(err, CodecError::InsufficientData { need: 12, have: 5 });

        let err = Envelope::decode(&framed[..framed.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::InsufficientData { .. }));
    }

    #[test]
    fn test_consecutive_frames() {
        let mut stream = Envelope::new(1, Bytes::from_static(b"one"))
            .encode()
            .unwrap()
            .to_vec();
        stream.extend_from_slice(&Envelope::new(2, Bytes::from_static(b"two")).encode().unwrap());

        let (first, used) = Envelope::decode(&stream).unwrap();
        let (second, _) = Envelope::decode(&stream[used..]).unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"one"));
        assert_eq!(second.version, 2);
    }
}
