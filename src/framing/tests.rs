//! Framing tests covering round trips, fragmented delivery, and the
//! overflow boundaries.

use bytes::Bytes;

use super::delimiter::{DelimiterFramer, DelimiterFramerFactory};
use super::length_prefix::{LengthPrefixFramer, LengthPrefixFramerFactory};
use super::{Framer, FramerFactory, FramingError};

fn drain<M>(framer: &mut dyn Framer<M>) -> Vec<M> {
    let mut messages = Vec::new();
    while let Some(message) = framer.next().expect("drain should not overflow") {
        messages.push(message);
    }
    messages
}

#[test]
fn test_delimiter_single_message() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(b"Hello, world!\n").unwrap();
    assert_eq!(drain(&mut framer), vec!["Hello, world!\n".to_string()]);
    assert_eq!(framer.next().unwrap(), None);
}

#[test]
fn test_delimiter_split_delivery() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(b"First half of message").unwrap();
    assert_eq!(framer.next().unwrap(), None);
    framer.feed(b" and second half\n").unwrap();
    assert_eq!(
        drain(&mut framer),
        vec!["First half of message and second half\n".to_string()]
    );
}

#[test]
fn test_delimiter_multiple_messages_one_feed() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(b"Message1\nMessage2\nMessage3\n").unwrap();
    assert_eq!(
        drain(&mut framer),
        vec![
            "Message1\n".to_string(),
            "Message2\n".to_string(),
            "Message3\n".to_string(),
        ]
    );
}

#[test]
fn test_delimiter_at_position_zero() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(b"\nrest").unwrap();
    assert_eq!(framer.next().unwrap(), Some("\n".to_string()));
    assert_eq!(framer.next().unwrap(), None);
}

#[test]
fn test_delimiter_empty_payload_between_delimiters() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(b"a\n\nb\n").unwrap();
    assert_eq!(
        drain(&mut framer),
        vec!["a\n".to_string(), "\n".to_string(), "b\n".to_string()]
    );
}

#[test]
fn test_delimiter_empty_feed_is_noop() {
    let mut framer = DelimiterFramer::new('\n', 8).unwrap();
    framer.feed(b"").unwrap();
    assert_eq!(framer.next().unwrap(), None);
}

#[test]
fn test_delimiter_overflow_boundary() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();

    // Exactly the limit without a delimiter is still fine.
    framer.feed(&vec![b'A'; 1024]).unwrap();

    // One more byte tips it over.
    let err = framer.feed(b"A").unwrap_err();
    assert!(matches!(err, FramingError::UnframedOverflow { limit: 1024, .. }));
}

#[test]
fn test_delimiter_overflow_spares_buffers_containing_a_delimiter() {
    let mut framer = DelimiterFramer::new('\n', 16).unwrap();
    let mut payload = vec![b'x'; 40];
    payload[5] = b'\n';
    framer.feed(&payload).unwrap();
    assert_eq!(framer.next().unwrap(), Some("xxxxx\n".to_string()));
}

#[test]
fn test_delimiter_invalid_utf8_is_replaced() {
    let mut framer = DelimiterFramer::new('\n', 1024).unwrap();
    framer.feed(&[0xFF, 0xFE, b'!', b'\n']).unwrap();
    let message = framer.next().unwrap().unwrap();
    assert!(message.ends_with("!\n"));
    assert!(message.contains('\u{FFFD}'));
}

#[test]
fn test_delimiter_custom_delimiter() {
    let mut framer = DelimiterFramer::new(';', 1024).unwrap();
    framer.feed(b"one;two;").unwrap();
    assert_eq!(
        drain(&mut framer),
        vec!["one;".to_string(), "two;".to_string()]
    );
}

#[test]
fn test_delimiter_rejects_zero_bound() {
    assert!(DelimiterFramer::new('\n', 0).is_err());
    assert!(DelimiterFramerFactory::new('\n', 0).is_err());
}

#[test]
fn test_length_prefix_round_trip() {
    let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
    framer
        .feed(&[0, 0, 0, 2, 10, 20, 0, 0, 0, 3, 30, 40, 50])
        .unwrap();
    assert_eq!(
        drain(&mut framer),
        vec![Bytes::from_static(&[10, 20]), Bytes::from_static(&[30, 40, 50])]
    );
}

#[test]
fn test_length_prefix_chunked_arbitrarily() {
    let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
    let stream: Vec<u8> = vec![0, 0, 0, 2, 10, 20, 0, 0, 0, 3, 30, 40, 50];

    let mut collected = Vec::new();
    for byte in stream {
        framer.feed(&[byte]).unwrap();
        collected.extend(drain(&mut framer));
    }
    assert_eq!(
        collected,
        vec![Bytes::from_static(&[10, 20]), Bytes::from_static(&[30, 40, 50])]
    );
}

#[test]
fn test_length_prefix_header_split_across_feeds() {
    let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
    framer.feed(&[0, 0]).unwrap();
    assert_eq!(framer.next().unwrap(), None);
    framer.feed(&[0, 1]).unwrap();
    assert_eq!(framer.next().unwrap(), None);
    framer.feed(&[42]).unwrap();
    assert_eq!(framer.next().unwrap(), Some(Bytes::from_static(&[42])));
}

#[test]
fn test_length_prefix_zero_length_is_overflow() {
    let mut framer = LengthPrefixFramer::new(4, 1024).unwrap();
    let err = framer.feed(&[0, 0, 0, 0]).unwrap_err();
    assert!(matches!(err, FramingError::InvalidLength { declared: 0, .. }));
}

#[test]
fn test_length_prefix_max_size_boundary() {
    let mut framer = LengthPrefixFramer::new(2, 16).unwrap();

    // Declared length equal to the bound is accepted.
    framer.feed(&[0, 16]).unwrap();
    framer.feed(&[7; 16]).unwrap();
    assert_eq!(framer.next().unwrap(), Some(Bytes::from(vec![7u8; 16])));

    // One past the bound is rejected at feed time.
    let err = framer.feed(&[0, 17]).unwrap_err();
    assert!(matches!(
        err,
        FramingError::InvalidLength {
            declared: 17,
            max: 16
        }
    ));
}

#[test]
fn test_length_prefix_bad_header_after_drained_message() {
    let mut framer = LengthPrefixFramer::new(2, 16).unwrap();

    // A valid frame and an oversize header arrive in one chunk. The first
    // frame must still be delivered; the bad header surfaces on the next
    // call into the framer.
    framer.feed(&[0, 1, 99]).unwrap();
    assert_eq!(framer.next().unwrap(), Some(Bytes::from_static(&[99])));

    framer.feed(&[255, 255]).unwrap();
    let err = framer.next().unwrap_err();
    assert!(matches!(err, FramingError::InvalidLength { declared: 65535, .. }));
}

#[test]
fn test_length_prefix_single_byte_header() {
    let mut framer = LengthPrefixFramer::new(1, 255).unwrap();
    framer.feed(&[3, 1, 2, 3, 1, 9]).unwrap();
    assert_eq!(
        drain(&mut framer),
        vec![Bytes::from_static(&[1, 2, 3]), Bytes::from_static(&[9])]
    );
}

#[test]
fn test_length_prefix_eight_byte_header() {
    let mut framer = LengthPrefixFramer::new(8, 1024).unwrap();
    framer.feed(&[0, 0, 0, 0, 0, 0, 0, 2, 5, 6]).unwrap();
    assert_eq!(framer.next().unwrap(), Some(Bytes::from_static(&[5, 6])));
}

#[test]
fn test_length_prefix_rejects_invalid_params() {
    assert!(LengthPrefixFramer::new(0, 1024).is_err());
    assert!(LengthPrefixFramer::new(9, 1024).is_err());
    assert!(LengthPrefixFramer::new(4, 0).is_err());
    assert!(LengthPrefixFramerFactory::new(0, 1024).is_err());
    assert!(LengthPrefixFramerFactory::new(4, 0).is_err());
}

#[test]
fn test_factories_produce_independent_framers() {
    let factory = DelimiterFramerFactory::default();
    let mut first = factory.create();
    let mut second = factory.create();

    first.feed(b"partial").unwrap();
    second.feed(b"done\n").unwrap();

    assert_eq!(first.next().unwrap(), None);
    assert_eq!(second.next().unwrap(), Some("done\n".to_string()));

    let factory = LengthPrefixFramerFactory::default();
    let mut framer = factory.create();
    framer.feed(&[0, 0, 0, 1, 8]).unwrap();
    assert_eq!(framer.next().unwrap(), Some(Bytes::from_static(&[8])));
}
