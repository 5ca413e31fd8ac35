//! Commands and results crossing the wire between members of different
//! builds.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use folio_codec::{
    decode_command, decode_result, encode_command, encode_command_for, encode_result,
    encode_result_for, CodecError, DecoderRegistry, Envelope, Payload, StandardCodec,
    CURRENT_VERSION, ENVELOPE_HEADER_BYTES,
};
use folio_core::{PageId, PartitionId, Position, SubscriberGroupId};
use folio_grid::{InterceptorRegistry, Member};
use folio_partition::{
    Command, CommandResult, OfferRequest, PollRequest, PollStatus, SubscribeRequest,
    SubscriberStart, TailAdvanceRequest,
};

use crate::scenarios::{member, topics};

const P: PartitionId = PartitionId::new(0);
const GROUP: SubscriberGroupId = SubscriberGroupId::new(4);

fn serving_member() -> Member {
    let member = member(1, topics::element_pages(2), InterceptorRegistry::new());
    member.assign(P).unwrap();
    member.activate(P).unwrap();
    member
}

/// Sends a command to `member` the way a peer speaking `version` would, and
/// returns what the peer reads back.
fn remote_invoke(member: &Member, command: &Command, version: u32) -> CommandResult {
    let request = encode_command_for(command, version).unwrap();
    let received = decode_command(&request).unwrap();
    let result = member.invoke(P, &received).unwrap();
    let reply = encode_result_for(&result, version).unwrap();
    decode_result(&reply).unwrap()
}

#[test]
fn test_codec_current_peers_see_identical_results() {
    let local = serving_member();
    let remote = serving_member();

    let commands = [
        Command::Initialise,
        Command::Offer(OfferRequest::new(vec![
            Bytes::from_static(b"one"),
            Bytes::new(),
            Bytes::from_static(b"three"),
        ])),
        Command::Subscribe(SubscribeRequest {
            group: GROUP,
            start: SubscriberStart::Earliest,
        }),
        Command::Poll(PollRequest::new(GROUP, 1).with_expected(Position::origin())),
        Command::Poll(PollRequest::new(GROUP, 1).with_expected(Position::origin())),
        Command::TailAdvance(TailAdvanceRequest::new(PageId::new(4))),
        Command::Offer(OfferRequest::new(vec![Bytes::from_static(b"four")]).with_seal(true)),
        Command::Poll(PollRequest::new(GROUP, 10)),
        Command::Compact,
    ];

    for command in &commands {
        let direct = local.invoke(P, command).unwrap();
        let via_wire = remote_invoke(&remote, command, CURRENT_VERSION);
        assert_eq!(via_wire, direct, "{}", command.name());
    }
    assert_eq!(local.snapshot(P).unwrap(), remote.snapshot(P).unwrap());
}

#[test]
fn test_codec_older_peer_during_rolling_upgrade() {
    let member = serving_member();

    let offered = remote_invoke(
        &member,
        &Command::Offer(
            OfferRequest::new(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")])
                .with_seal(true),
        ),
        1,
    );
    // The seal flag does not exist for the older peer: page 0 is full by
    // capacity, not by request.
    let CommandResult::Offered(offered) = offered else {
        panic!("unexpected result {offered:?}");
    };
    assert_eq!(offered.accepted_count, 2);

    // The expected head is dropped, so a stale retry drains again instead
    // of reporting AlreadyApplied.
    let stale = Command::Poll(PollRequest::new(GROUP, 1).with_expected(Position::origin()));
    let first = remote_invoke(&member, &stale, 1);
    let second = remote_invoke(&member, &stale, 1);
    for result in [&first, &second] {
        let CommandResult::Polled(result) = result else {
            panic!("unexpected result {result:?}");
        };
        assert_eq!(result.status, PollStatus::Delivered);
        assert_eq!(result.elements.len(), 1);
    }

    // A current peer keeps the expected head.
    let CommandResult::Polled(current) = remote_invoke(&member, &stale, CURRENT_VERSION) else {
        panic!("expected a poll result");
    };
    assert_eq!(current.status, PollStatus::AlreadyApplied);

    // Commands the older peer cannot express are refused before sending.
    let err = encode_command_for(&Command::Compact, 1).unwrap_err();
    assert_eq!(
        err,
        CodecError::UnsupportedForVersion {
            kind: "compact",
            version: 1
        }
    );
}

#[test]
fn test_codec_rejects_unknown_versions() {
    let framed = Envelope::new(CURRENT_VERSION + 1, Bytes::from_static(&[0x01]))
        .encode()
        .unwrap();
    assert_eq!(
        decode_command(&framed).unwrap_err(),
        CodecError::UnsupportedVersion {
            version: CURRENT_VERSION + 1
        }
    );

    // A registry trimmed to the current version no longer reads v1.
    let mut registry = DecoderRegistry::new();
    registry.register(Arc::new(StandardCodec::v2()));
    let old = encode_command_for(&Command::Initialise, 1).unwrap();
    assert_eq!(
        registry.decode(&old).unwrap_err(),
        CodecError::UnsupportedVersion { version: 1 }
    );
}

#[test]
fn test_codec_detects_corruption() {
    let member = serving_member();
    member
        .invoke(
            P,
            &Command::Offer(OfferRequest::new(vec![Bytes::from_static(b"payload")])),
        )
        .unwrap();
    let result = member
        .invoke(P, &Command::Poll(PollRequest::new(GROUP, 10)))
        .unwrap();
    let framed = encode_result(&result).unwrap();

    let mut corrupt = framed.to_vec();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    assert!(matches!(
        decode_result(&corrupt).unwrap_err(),
        CodecError::ChecksumMismatch { .. }
    ));

    let truncated = &framed[..framed.len() - 1];
    assert!(matches!(
        decode_result(truncated).unwrap_err(),
        CodecError::InsufficientData { .. }
    ));
    assert!(matches!(
        decode_result(&framed[..ENVELOPE_HEADER_BYTES - 1]).unwrap_err(),
        CodecError::InsufficientData { .. }
    ));
}

#[test]
fn test_codec_reads_a_stream_of_frames() {
    let registry = DecoderRegistry::standard();
    let commands = [
        Command::Initialise,
        Command::Offer(OfferRequest::new(vec![Bytes::from_static(b"x")])),
        Command::Compact,
    ];

    let mut stream = BytesMut::new();
    stream.extend_from_slice(&encode_command_for(&commands[0], 1).unwrap());
    stream.extend_from_slice(&encode_command(&commands[1]).unwrap());
    stream.extend_from_slice(&encode_command(&commands[2]).unwrap());

    let mut decoded = Vec::new();
    let mut versions = Vec::new();
    let mut rest = &stream[..];
    while !rest.is_empty() {
        let (payload, version, consumed) = registry.decode(rest).unwrap();
        decoded.push(payload);
        versions.push(version);
        rest = &rest[consumed..];
    }

    assert_eq!(
        decoded,
        commands.iter().cloned().map(Payload::Command).collect::<Vec<_>>()
    );
    assert_eq!(versions, vec![1, CURRENT_VERSION, CURRENT_VERSION]);
}
