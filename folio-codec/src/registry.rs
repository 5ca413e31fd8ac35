//! Decoder registry keyed by codec version.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use folio_partition::{Command, CommandResult};

use crate::envelope::Envelope;
use crate::error::{CodecError, CodecResult};
use crate::payload::{Payload, StandardCodec};

/// Codec version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Oldest codec version this build still reads.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

/// Encoder and decoder for one payload version.
pub trait VersionCodec: Send + Sync + fmt::Debug {
    /// Returns the version handled.
    fn version(&self) -> u32;

    /// Appends the encoded payload to `buf`.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be expressed in this version.
    fn encode(&self, payload: &Payload, buf: &mut BytesMut) -> CodecResult<()>;

    /// Decodes a complete payload.
    ///
    /// # Errors
    /// Returns an error if the payload is malformed.
    fn decode(&self, payload: &[u8]) -> CodecResult<Payload>;
}

impl VersionCodec for StandardCodec {
    fn version(&self) -> u32 {
        Self::version(self)
    }

    fn encode(&self, payload: &Payload, buf: &mut BytesMut) -> CodecResult<()> {
        Self::encode(self, payload, buf)
    }

    fn decode(&self, payload: &[u8]) -> CodecResult<Payload> {
        Self::decode(self, payload)
    }
}

/// Versioned codecs, looked up by an envelope's version.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    codecs: BTreeMap<u32, Arc<dyn VersionCodec>>,
}

impl DecoderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every version this build supports.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StandardCodec::v1()));
        registry.register(Arc::new(StandardCodec::v2()));
        registry
    }

    /// Registers a codec, replacing any codec for the same version.
    pub fn register(&mut self, codec: Arc<dyn VersionCodec>) -> Option<Arc<dyn VersionCodec>> {
        self.codecs.insert(codec.version(), codec)
    }

    /// Returns registered versions in ascending order.
    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        self.codecs.keys().copied().collect()
    }

    /// Returns the codec for a version.
    ///
    /// # Errors
    /// Returns `UnsupportedVersion` if none is registered.
    pub fn codec(&self, version: u32) -> CodecResult<&dyn VersionCodec> {
        self.codecs
            .get(&version)
            .map(|codec| &**codec)
            .ok_or(CodecError::UnsupportedVersion { version })
    }

    /// Encodes a payload into an envelope of the given version.
    ///
    /// # Errors
    /// Returns an error if the version is unknown or cannot express the
    /// payload.
    pub fn seal(&self, payload: &Payload, version: u32) -> CodecResult<Envelope> {
        let codec = self.codec(version)?;
        let mut buf = BytesMut::with_capacity(64);
        codec.encode(payload, &mut buf)?;
        Ok(Envelope::new(version, buf.freeze()))
    }

    /// Decodes an envelope's payload with the codec for its version.
    ///
    /// # Errors
    /// Returns an error if the version is unknown or the payload malformed.
    pub fn open(&self, envelope: &Envelope) -> CodecResult<Payload> {
        self.codec(envelope.version)?.decode(&envelope.payload)
    }

    /// Encodes and frames a payload.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be encoded or is too large.
    pub fn encode(&self, payload: &Payload, version: u32) -> CodecResult<Bytes> {
        self.seal(payload, version)?.encode()
    }

    /// Reads one framed envelope and decodes its payload.
    ///
    /// Returns the payload, its version and the bytes consumed.
    ///
    /// # Errors
    /// Returns an error if the frame or payload is malformed or the version
    /// is unknown.
    pub fn decode(&self, data: &[u8]) -> CodecResult<(Payload, u32, usize)> {
        let (envelope, consumed) = Envelope::decode(data)?;
        let payload = self.open(&envelope)?;
        Ok((payload, envelope.version, consumed))
    }
}

fn standard() -> &'static DecoderRegistry {
    static REGISTRY: OnceLock<DecoderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(DecoderRegistry::standard)
}

/// Encodes a command at [`CURRENT_VERSION`].
///
/// # Errors
/// Returns an error if the framed command is too large.
pub fn encode_command(command: &Command) -> CodecResult<Bytes> {
    encode_command_for(command, CURRENT_VERSION)
}

/// Encodes a command for a peer that speaks `version`.
///
/// Fields the version lacks are dropped.
///
/// # Errors
/// Returns `UnsupportedForVersion` for commands the version lacks and
/// `UnsupportedVersion` for versions this build does not know.
pub fn encode_command_for(command: &Command, version: u32) -> CodecResult<Bytes> {
    standard().encode(&Payload::Command(command.clone()), version)
}

/// Decodes a framed command of any supported version.
///
/// # Errors
/// Returns an error if the data is malformed, of an unknown version, or
/// holds a result.
pub fn decode_command(data: &[u8]) -> CodecResult<Command> {
    match standard().decode(data)?.0 {
        Payload::Command(command) => Ok(command),
        Payload::Result(_) => Err(CodecError::UnexpectedPayload {
            expected: "command",
        }),
    }
}

/// Encodes a result at [`CURRENT_VERSION`].
///
/// # Errors
/// Returns an error if the framed result is too large.
pub fn encode_result(result: &CommandResult) -> CodecResult<Bytes> {
    encode_result_for(result, CURRENT_VERSION)
}

/// Encodes a result for a peer that speaks `version`.
///
/// # Errors
/// Returns an error if the version cannot express the result.
pub fn encode_result_for(result: &CommandResult, version: u32) -> CodecResult<Bytes> {
    standard().encode(&Payload::Result(result.clone()), version)
}

/// Decodes a framed result of any supported version.
///
/// # Errors
/// Returns an error if the data is malformed, of an unknown version, or
/// holds a command.
pub fn decode_result(data: &[u8]) -> CodecResult<CommandResult> {
    match standard().decode(data)?.0 {
        Payload::Result(result) => Ok(result),
        Payload::Command(_) => Err(CodecError::UnexpectedPayload { expected: "result" }),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use folio_core::{PageId, SubscriberGroupId};
    use folio_partition::{OfferRequest, SubscribeRequest, SubscriberStart, TailAdvanceRequest};

    use super::*;

    #[test]
    fn test_standard_versions() {
        let registry = DecoderRegistry::standard();
        assert_eq!(registry.versions(), vec![MIN_SUPPORTED_VERSION, CURRENT_VERSION]);
    }

    #[test]
    fn test_command_through_envelope() {
        let command = Command::Offer(
            OfferRequest::new(vec![Bytes::from_static(b"hello")]).with_seal(true),
        );
        let framed = encode_command(&command).unwrap();
        assert_eq!(&framed[4..8], &CURRENT_VERSION.to_le_bytes());
        assert_eq!(decode_command(&framed).unwrap(), command);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let framed = Envelope::new(99, Bytes::from_static(&[0x01]))
            .encode()
            .unwrap();
        assert_eq!(
            decode_command(&framed).unwrap_err(),
            CodecError::UnsupportedVersion { version: 99 }
        );

        let err = encode_command_for(&Command::Initialise, 0).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedVersion { version: 0 });
    }

    #[test]
    fn test_older_peer_encoding() {
        let tail = Command::TailAdvance(TailAdvanceRequest::new(PageId::new(8)));
        let framed = encode_command_for(&tail, 1).unwrap();
        assert_eq!(&framed[4..8], &1u32.to_le_bytes());
        assert_eq!(decode_command(&framed).unwrap(), tail);

        let subscribe = Command::Subscribe(SubscribeRequest {
            group: SubscriberGroupId::new(1),
            start: SubscriberStart::Latest,
        });
        assert_eq!(
            encode_command_for(&subscribe, 1).unwrap_err(),
            CodecError::UnsupportedForVersion {
                kind: "subscribe",
                version: 1
            }
        );
    }

    #[test]
    fn test_payload_kind_checked() {
        let framed = encode_command(&Command::Initialise).unwrap();
        assert_eq!(
            decode_result(&framed).unwrap_err(),
            CodecError::UnexpectedPayload { expected: "result" }
        );
    }

    #[test]
    fn test_custom_codec_registration() {
        let mut registry = DecoderRegistry::new();
        assert!(registry.register(Arc::new(StandardCodec::v2())).is_none());
        assert!(registry.register(Arc::new(StandardCodec::v2())).is_some());

        let envelope = registry.seal(&Payload::Command(Command::Compact), 2).unwrap();
        assert_eq!(registry.open(&envelope).unwrap(), Payload::Command(Command::Compact));
        assert!(registry.codec(1).is_err());
    }
}
