//! Command and result payloads, per codec version.
//!
//! A payload is a one-byte tag followed by the variant's fields. Command
//! tags occupy `0x01..=0x07`; each result uses its command's tag with the
//! high bit set.
//!
//! Version 1 predates the offer seal flag, the poll `expected` position,
//! poll statuses, subscriptions and compaction. Version 2 carries all of
//! them.

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};
use folio_partition::{
    Command, CommandResult, CompactResult, InitialiseResult, OfferError, OfferRequest,
    OfferResult, OfferStatus, PollRequest, PollResult, PollStatus, SubscribeRequest,
    SubscribeResult, SubscriberStart, TailAdvanceRequest, TailAdvanceResult, UnsubscribeRequest,
    UnsubscribeResult,
};
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::wire::{
    get_bool, get_bytes, get_element, get_group, get_optional, get_page, get_position, get_u32,
    get_u64, get_u8, put_bool, put_bytes, put_count, put_element, put_group, put_optional,
    put_page, put_position,
};

const TAG_INITIALISE: u8 = 0x01;
const TAG_TAIL_ADVANCE: u8 = 0x02;
const TAG_OFFER: u8 = 0x03;
const TAG_POLL: u8 = 0x04;
const TAG_SUBSCRIBE: u8 = 0x05;
const TAG_UNSUBSCRIBE: u8 = 0x06;
const TAG_COMPACT: u8 = 0x07;
const RESULT_BIT: u8 = 0x80;

/// A decoded payload: a processor argument or a processor result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A command to execute.
    Command(Command),
    /// The result of a command.
    Result(CommandResult),
}

/// Optional fields and variants a codec version can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// `OfferRequest::seal`.
    pub offer_seal: bool,
    /// `PollRequest::expected` and `PollResult::status`.
    pub poll_expected: bool,
    /// Subscribe and unsubscribe commands.
    pub subscriptions: bool,
    /// The compact command.
    pub compaction: bool,
}

impl Features {
    /// Fields of version 1.
    pub const V1: Self = Self {
        offer_seal: false,
        poll_expected: false,
        subscriptions: false,
        compaction: false,
    };

    /// Fields of version 2.
    pub const V2: Self = Self {
        offer_seal: true,
        poll_expected: true,
        subscriptions: true,
        compaction: true,
    };
}

/// Tag-based payload codec parameterised by the features of its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCodec {
    version: u32,
    features: Features,
}

impl StandardCodec {
    /// Creates a codec for an arbitrary version.
    #[must_use]
    pub const fn new(version: u32, features: Features) -> Self {
        Self { version, features }
    }

    /// The version 1 codec.
    #[must_use]
    pub const fn v1() -> Self {
        Self::new(1, Features::V1)
    }

    /// The version 2 codec.
    #[must_use]
    pub const fn v2() -> Self {
        Self::new(2, Features::V2)
    }

    /// Returns the version this codec implements.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the features of this version.
    #[must_use]
    pub const fn features(&self) -> Features {
        self.features
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Appends an encoded payload to `buf`.
    ///
    /// Fields this version cannot express are dropped. Variants it lacks
    /// altogether are rejected.
    ///
    /// # Errors
    /// Returns `UnsupportedForVersion` if the variant does not exist in this
    /// version.
    pub fn encode(&self, payload: &Payload, buf: &mut BytesMut) -> CodecResult<()> {
        match payload {
            Payload::Command(command) => self.encode_command(command, buf),
            Payload::Result(result) => self.encode_result(result, buf),
        }
    }

    fn encode_command(&self, command: &Command, buf: &mut BytesMut) -> CodecResult<()> {
        self.check_supported(command_tag(command), command.name())?;
        buf.put_u8(command_tag(command));

        match command {
            Command::Initialise | Command::Compact => {}
            Command::TailAdvance(request) => put_page(buf, request.new_tail),
            Command::Offer(request) => {
                put_count(buf, request.elements.len());
                for element in &request.elements {
                    put_bytes(buf, element);
                }
                if self.features.offer_seal {
                    put_bool(buf, request.seal);
                } else if request.seal {
                    debug!(version = self.version, "dropping offer seal flag");
                }
            }
            Command::Poll(request) => {
                put_group(buf, request.group);
                buf.put_u32_le(request.max_elements);
                if self.features.poll_expected {
                    put_optional(buf, request.expected, put_position);
                } else if request.expected.is_some() {
                    debug!(version = self.version, "dropping poll expected position");
                }
            }
            Command::Subscribe(request) => {
                put_group(buf, request.group);
                buf.put_u8(match request.start {
                    SubscriberStart::Earliest => 0,
                    SubscriberStart::Latest => 1,
                });
            }
            Command::Unsubscribe(request) => put_group(buf, request.group),
        }
        Ok(())
    }

    fn encode_result(&self, result: &CommandResult, buf: &mut BytesMut) -> CodecResult<()> {
        let tag = result_tag(result);
        self.check_supported(tag & !RESULT_BIT, result_name(result))?;
        buf.put_u8(tag);

        match result {
            CommandResult::Initialised(r) => {
                put_position(buf, r.publication_tail);
                put_bool(buf, r.created);
            }
            CommandResult::TailAdvanced(r) => put_page(buf, r.new_tail),
            CommandResult::Offered(r) => encode_offer_result(buf, r),
            CommandResult::Polled(r) => {
                if self.features.poll_expected {
                    encode_poll_status(buf, r.status);
                }
                put_count(buf, r.elements.len());
                for element in &r.elements {
                    put_element(buf, element);
                }
                buf.put_u64_le(r.remaining_element_count);
                put_position(buf, r.next_index);
            }
            CommandResult::Subscribed(r) => {
                put_position(buf, r.head);
                put_bool(buf, r.created);
            }
            CommandResult::Unsubscribed(r) => put_optional(buf, r.removed, put_position),
            CommandResult::Compacted(r) => {
                put_count(buf, r.removed_pages.len());
                for page in &r.removed_pages {
                    put_page(buf, *page);
                }
                put_optional(buf, r.partition_head, put_page);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Decoding
    // -------------------------------------------------------------------------

    /// Decodes a whole payload.
    ///
    /// # Errors
    /// Returns an error if the payload is truncated, has an unknown tag, or
    /// carries trailing bytes.
    pub fn decode(&self, mut buf: &[u8]) -> CodecResult<Payload> {
        let tag = get_u8(&mut buf)?;
        let base = tag & !RESULT_BIT;
        if !(TAG_INITIALISE..=TAG_COMPACT).contains(&base) || !self.supports(base) {
            return Err(CodecError::UnknownTag { tag });
        }

        let payload = if tag & RESULT_BIT == 0 {
            Payload::Command(self.decode_command(tag, &mut buf)?)
        } else {
            Payload::Result(self.decode_result(base, &mut buf)?)
        };

        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes { count: buf.len() });
        }
        Ok(payload)
    }

    fn decode_command(&self, tag: u8, buf: &mut &[u8]) -> CodecResult<Command> {
        let command = match tag {
            TAG_INITIALISE => Command::Initialise,
            TAG_TAIL_ADVANCE => Command::TailAdvance(TailAdvanceRequest::new(get_page(buf)?)),
            TAG_OFFER => {
                let count = get_u32(buf)?;
                let mut elements = Vec::new();
                for _ in 0..count {
                    elements.push(get_bytes(buf)?);
                }
                let seal = self.features.offer_seal && get_bool(buf, "seal")?;
                Command::Offer(OfferRequest::new(elements).with_seal(seal))
            }
            TAG_POLL => {
                let group = get_group(buf)?;
                let max_elements = get_u32(buf)?;
                let expected = if self.features.poll_expected {
                    get_optional(buf, "expected", get_position)?
                } else {
                    None
                };
                Command::Poll(PollRequest {
                    group,
                    expected,
                    max_elements,
                })
            }
            TAG_SUBSCRIBE => {
                let group = get_group(buf)?;
                let start = match get_u8(buf)? {
                    0 => SubscriberStart::Earliest,
                    1 => SubscriberStart::Latest,
                    value => return Err(CodecError::InvalidValue { field: "start", value }),
                };
                Command::Subscribe(SubscribeRequest { group, start })
            }
            TAG_UNSUBSCRIBE => Command::Unsubscribe(UnsubscribeRequest {
                group: get_group(buf)?,
            }),
            TAG_COMPACT => Command::Compact,
            _ => return Err(CodecError::UnknownTag { tag }),
        };
        Ok(command)
    }

    fn decode_result(&self, base: u8, buf: &mut &[u8]) -> CodecResult<CommandResult> {
        let result = match base {
            TAG_INITIALISE => CommandResult::Initialised(InitialiseResult {
                publication_tail: get_position(buf)?,
                created: get_bool(buf, "created")?,
            }),
            TAG_TAIL_ADVANCE => CommandResult::TailAdvanced(TailAdvanceResult {
                new_tail: get_page(buf)?,
            }),
            TAG_OFFER => CommandResult::Offered(decode_offer_result(buf)?),
            TAG_POLL => {
                let status = if self.features.poll_expected {
                    decode_poll_status(buf)?
                } else {
                    PollStatus::Delivered
                };
                let count = get_u32(buf)?;
                let mut elements = Vec::new();
                for _ in 0..count {
                    elements.push(get_element(buf)?);
                }
                CommandResult::Polled(PollResult {
                    status,
                    elements,
                    remaining_element_count: get_u64(buf)?,
                    next_index: get_position(buf)?,
                })
            }
            TAG_SUBSCRIBE => CommandResult::Subscribed(SubscribeResult {
                head: get_position(buf)?,
                created: get_bool(buf, "created")?,
            }),
            TAG_UNSUBSCRIBE => CommandResult::Unsubscribed(UnsubscribeResult {
                removed: get_optional(buf, "removed", get_position)?,
            }),
            TAG_COMPACT => {
                let count = get_u32(buf)?;
                let mut removed_pages = Vec::new();
                for _ in 0..count {
                    removed_pages.push(get_page(buf)?);
                }
                CommandResult::Compacted(CompactResult {
                    removed_pages,
                    partition_head: get_optional(buf, "partition_head", get_page)?,
                })
            }
            _ => {
                return Err(CodecError::UnknownTag {
                    tag: base | RESULT_BIT,
                })
            }
        };
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    const fn supports(&self, base_tag: u8) -> bool {
        match base_tag {
            TAG_SUBSCRIBE | TAG_UNSUBSCRIBE => self.features.subscriptions,
            TAG_COMPACT => self.features.compaction,
            _ => true,
        }
    }

    const fn check_supported(&self, base_tag: u8, kind: &'static str) -> CodecResult<()> {
        if self.supports(base_tag) {
            Ok(())
        } else {
            Err(CodecError::UnsupportedForVersion {
                kind,
                version: self.version,
            })
        }
    }
}

const fn command_tag(command: &Command) -> u8 {
    match command {
        Command::Initialise => TAG_INITIALISE,
        Command::TailAdvance(_) => TAG_TAIL_ADVANCE,
        Command::Offer(_) => TAG_OFFER,
        Command::Poll(_) => TAG_POLL,
        Command::Subscribe(_) => TAG_SUBSCRIBE,
        Command::Unsubscribe(_) => TAG_UNSUBSCRIBE,
        Command::Compact => TAG_COMPACT,
    }
}

const fn result_tag(result: &CommandResult) -> u8 {
    RESULT_BIT
        | match result {
            CommandResult::Initialised(_) => TAG_INITIALISE,
            CommandResult::TailAdvanced(_) => TAG_TAIL_ADVANCE,
            CommandResult::Offered(_) => TAG_OFFER,
            CommandResult::Polled(_) => TAG_POLL,
            CommandResult::Subscribed(_) => TAG_SUBSCRIBE,
            CommandResult::Unsubscribed(_) => TAG_UNSUBSCRIBE,
            CommandResult::Compacted(_) => TAG_COMPACT,
        }
}

const fn result_name(result: &CommandResult) -> &'static str {
    match result {
        CommandResult::Initialised(_) => "initialised",
        CommandResult::TailAdvanced(_) => "tail_advanced",
        CommandResult::Offered(_) => "offered",
        CommandResult::Polled(_) => "polled",
        CommandResult::Subscribed(_) => "subscribed",
        CommandResult::Unsubscribed(_) => "unsubscribed",
        CommandResult::Compacted(_) => "compacted",
    }
}

fn encode_offer_result(buf: &mut BytesMut, result: &OfferResult) {
    buf.put_u8(match result.status {
        OfferStatus::Success => 0,
        OfferStatus::PageSealed => 1,
        OfferStatus::TopicFull => 2,
    });
    buf.put_u32_le(result.accepted_count);
    buf.put_u64_le(result.page_capacity_remaining);

    put_count(buf, result.errors.len());
    for (index, error) in &result.errors {
        buf.put_u32_le(*index);
        match error {
            OfferError::Empty => buf.put_u8(0),
            OfferError::TooLarge { size, max } => {
                buf.put_u8(1);
                buf.put_u64_le(*size as u64);
                buf.put_u32_le(*max);
            }
            OfferError::TopicFull => buf.put_u8(2),
        }
    }
    put_optional(buf, result.offset, put_position);
}

fn decode_offer_result(buf: &mut &[u8]) -> CodecResult<OfferResult> {
    let status = match get_u8(buf)? {
        0 => OfferStatus::Success,
        1 => OfferStatus::PageSealed,
        2 => OfferStatus::TopicFull,
        value => return Err(CodecError::InvalidValue { field: "status", value }),
    };
    let accepted_count = get_u32(buf)?;
    let page_capacity_remaining = get_u64(buf)?;

    let count = get_u32(buf)?;
    let mut errors = BTreeMap::new();
    for _ in 0..count {
        let index = get_u32(buf)?;
        let error = match get_u8(buf)? {
            0 => OfferError::Empty,
            1 => {
                // Sizes were usize on the encoding side.
                #[allow(clippy::cast_possible_truncation)]
                let size = get_u64(buf)? as usize;
                OfferError::TooLarge {
                    size,
                    max: get_u32(buf)?,
                }
            }
            2 => OfferError::TopicFull,
            value => return Err(CodecError::InvalidValue { field: "error", value }),
        };
        errors.insert(index, error);
    }

    Ok(OfferResult {
        status,
        accepted_count,
        page_capacity_remaining,
        errors,
        offset: get_optional(buf, "offset", get_position)?,
    })
}

fn encode_poll_status(buf: &mut BytesMut, status: PollStatus) {
    match status {
        PollStatus::Delivered => buf.put_u8(0),
        PollStatus::AlreadyApplied => buf.put_u8(1),
        PollStatus::PositionSkew { resumed_at } => {
            buf.put_u8(2);
            put_position(buf, resumed_at);
        }
    }
}

fn decode_poll_status(buf: &mut &[u8]) -> CodecResult<PollStatus> {
    match get_u8(buf)? {
        0 => Ok(PollStatus::Delivered),
        1 => Ok(PollStatus::AlreadyApplied),
        2 => Ok(PollStatus::PositionSkew {
            resumed_at: get_position(buf)?,
        }),
        value => Err(CodecError::InvalidValue { field: "poll_status", value }),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use folio_core::{PageId, Position, SubscriberGroupId};
    use folio_partition::Element;

    use super::*;

    fn encode(codec: StandardCodec, payload: &Payload) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_v2_offer_keeps_seal() {
        let command = Command::Offer(
            OfferRequest::new(vec![Bytes::from_static(b"x"), Bytes::from_static(b"yz")])
                .with_seal(true),
        );
        let codec = StandardCodec::v2();
        let buf = encode(codec, &Payload::Command(command.clone()));
        assert_eq!(codec.decode(&buf).unwrap(), Payload::Command(command));
    }

    #[test]
    fn test_v1_drops_seal_and_expected() {
        let codec = StandardCodec::v1();
        let sealed = Command::Offer(OfferRequest::new(vec![Bytes::from_static(b"x")]).with_seal(true));
        let buf = encode(codec, &Payload::Command(sealed));
        assert_eq!(
            codec.decode(&buf).unwrap(),
            Payload::Command(Command::Offer(OfferRequest::new(vec![Bytes::from_static(b"x")])))
        );

        let group = SubscriberGroupId::new(4);
        let poll = Command::Poll(
            PollRequest::new(group, 10).with_expected(Position::new(PageId::new(2), 3)),
        );
        let buf = encode(codec, &Payload::Command(poll));
        assert_eq!(
            codec.decode(&buf).unwrap(),
            Payload::Command(Command::Poll(PollRequest::new(group, 10)))
        );
    }

    #[test]
    fn test_v1_rejects_newer_commands() {
        let codec = StandardCodec::v1();
        let mut buf = BytesMut::new();
        let err = codec
            .encode(&Payload::Command(Command::Compact), &mut buf)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedForVersion {
                kind: "compact",
                version: 1
            }
        );
        assert!(buf.is_empty());

        let v2 = encode(StandardCodec::v2(), &Payload::Command(Command::Compact));
        assert_eq!(
            codec.decode(&v2).unwrap_err(),
            CodecError::UnknownTag { tag: TAG_COMPACT }
        );
    }

    #[test]
    fn test_poll_result_status_by_version() {
        let result = CommandResult::Polled(PollResult {
            status: PollStatus::PositionSkew {
                resumed_at: Position::new(PageId::new(5), 0),
            },
            elements: vec![Element::new(
                Position::new(PageId::new(5), 0),
                Bytes::from_static(b"v"),
            )],
            remaining_element_count: 7,
            next_index: Position::new(PageId::new(5), 1),
        });

        let v2 = StandardCodec::v2();
        let buf = encode(v2, &Payload::Result(result.clone()));
        assert_eq!(v2.decode(&buf).unwrap(), Payload::Result(result.clone()));

        let v1 = StandardCodec::v1();
        let buf = encode(v1, &Payload::Result(result));
        let Payload::Result(CommandResult::Polled(decoded)) = v1.decode(&buf).unwrap() else {
            panic!("expected a poll result");
        };
        assert_eq!(decoded.status, PollStatus::Delivered);
        assert_eq!(decoded.remaining_element_count, 7);
    }

    #[test]
    fn test_offer_result_errors_preserved() {
        let mut errors = BTreeMap::new();
        errors.insert(0, OfferError::Empty);
        errors.insert(2, OfferError::TooLarge { size: 9000, max: 4096 });
        errors.insert(3, OfferError::TopicFull);
        let result = CommandResult::Offered(OfferResult {
            status: OfferStatus::TopicFull,
            accepted_count: 1,
            page_capacity_remaining: 12,
            errors,
            offset: Some(Position::new(PageId::new(1), 4)),
        });

        let codec = StandardCodec::v2();
        let buf = encode(codec, &Payload::Result(result.clone()));
        assert_eq!(codec.decode(&buf).unwrap(), Payload::Result(result));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = StandardCodec::v2();
        let mut buf = encode(codec, &Payload::Command(Command::Initialise));
        buf.put_u8(0);
        assert_eq!(
            codec.decode(&buf).unwrap_err(),
            CodecError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn test_unknown_tag() {
        let codec = StandardCodec::v2();
        assert_eq!(
            codec.decode(&[0x42]).unwrap_err(),
            CodecError::UnknownTag { tag: 0x42 }
        );
    }
}
