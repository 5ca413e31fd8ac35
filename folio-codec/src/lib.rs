//! Folio Codec - versioned wire format for partition commands and results.
//!
//! Every [`Command`](folio_partition::Command) and
//! [`CommandResult`](folio_partition::CommandResult) travels inside an
//! [`Envelope`] that names the codec version of its payload and carries a
//! CRC32 of it. A [`DecoderRegistry`] picks the payload codec by version, so
//! members running different builds can keep talking during a rolling
//! upgrade:
//!
//! - newer members read every version down to [`MIN_SUPPORTED_VERSION`]
//! - [`encode_command_for`] writes for an older peer, dropping fields it
//!   cannot express and refusing commands it lacks
//! - unknown versions are rejected with an error
//!
//! # Example
//!
//! ```
//! use folio_codec::{decode_command, encode_command};
//! use folio_partition::Command;
//!
//! let framed = encode_command(&Command::Initialise).unwrap();
//! assert_eq!(decode_command(&framed).unwrap(), Command::Initialise);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod envelope;
mod error;
mod payload;
mod registry;
mod wire;

pub use envelope::{Envelope, ENVELOPE_HEADER_BYTES, MAX_ENVELOPE_BYTES};
pub use error::{CodecError, CodecResult};
pub use payload::{Features, Payload, StandardCodec};
pub use registry::{
    decode_command, decode_result, encode_command, encode_command_for, encode_result,
    encode_result_for, DecoderRegistry, VersionCodec, CURRENT_VERSION, MIN_SUPPORTED_VERSION,
};
