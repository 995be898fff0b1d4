//! Integration tests for the camlink-core protocol codec.
//!
//! These tests verify round-trip encoding and decoding of every message type
//! through the public API, plus the behaviour of a reader that splits a
//! multi-message buffer into lines.

use camlink_core::{
    decode_message, encode_message, CameraMode, CameraState, FlashMode, Message, MessageType,
    ProtocolError,
};

/// Encodes a message and then decodes it, asserting that exactly one line was produced.
fn roundtrip(msg: &Message) -> Message {
    let bytes = encode_message(msg).expect("encode must succeed");
    let text = std::str::from_utf8(&bytes).expect("wire format is UTF-8");
    assert_eq!(text.matches('\n').count(), 1, "one message is one line");
    decode_message(text).expect("decode must succeed")
}

#[test]
fn test_roundtrip_every_message_type() {
    for (i, message_type) in MessageType::ALL.into_iter().enumerate() {
        let original = Message::at(message_type, 1_730_000_000_000 + i as i64)
            .with_action(format!("action-{i}"))
            .with_value(format!("value-{i}"));

        assert_eq!(original, roundtrip(&original), "{message_type}");
    }
}

#[test]
fn test_roundtrip_preview_frame_with_base64_payload() {
    let payload = "/9j/4AAQSkZJRgABAQAAAQABAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8U";
    let original = Message::at(MessageType::PreviewFrame, 7).with_value(payload);

    assert_eq!(original, roundtrip(&original));
}

#[test]
fn test_roundtrip_unicode_action() {
    let original = Message::at(MessageType::ApplySuggestion, 3).with_action("Règle des tiers 📷");
    assert_eq!(original, roundtrip(&original));
}

#[test]
fn test_roundtrip_camera_state_nested_document() {
    let state = CameraState {
        zoom: 3.0,
        flash: FlashMode::Off,
        mode: CameraMode::Macro,
    };
    let original = state.to_message().unwrap();

    let decoded = roundtrip(&original);

    assert_eq!(decoded, original);
    assert_eq!(CameraState::from_wire(&decoded.value).unwrap(), state);
}

#[test]
fn test_stream_of_lines_isolates_bad_line() {
    // Arrange: good, bad, good – as a reader would see them on the stream.
    let mut buf = Vec::new();
    buf.extend(encode_message(&Message::at(MessageType::ZoomIn, 1)).unwrap());
    buf.extend(b"{\"type\":\"TELEPORT\",\"timestamp\":2}\n");
    buf.extend(encode_message(&Message::at(MessageType::ZoomOut, 3)).unwrap());
    let text = String::from_utf8(buf).unwrap();

    // Act
    let results: Vec<Result<Message, ProtocolError>> = text.lines().map(decode_message).collect();

    // Assert
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(Message::at(MessageType::ZoomIn, 1)));
    assert!(matches!(results[1], Err(ProtocolError::UnknownMessageType(_))));
    assert_eq!(results[2], Ok(Message::at(MessageType::ZoomOut, 3)));
}

#[test]
fn test_decode_line_from_older_peer_without_timestamp() {
    let msg = decode_message("{\"type\":\"SWITCH_CAMERA\",\"action\":\"\",\"value\":\"\"}").unwrap();
    assert_eq!(msg.message_type, MessageType::SwitchCamera);
    assert_eq!(msg.timestamp, 0);
}
