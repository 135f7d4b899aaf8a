//! Wire protocol tests
//!
//! These tests verify:
//! - Event tags and field names seen by the other end
//! - Rejection of malformed frames

use miramatch_shared::{
    decode_frame, encode_frame, ClientEvent, MessagePayload, MessageType, ProtocolError,
    ServerEvent,
};

#[test]
fn test_client_event_tag_and_field_names() {
    let frame = encode_frame(&ClientEvent::TypingStart {
        conversation_id: "conv-1".into(),
    })
    .unwrap();

    // Decode generically to inspect the keys the server will see
    let value: serde_json::Value = rmp_serde::from_slice(&frame).unwrap();
    assert_eq!(value["type"], "typing_start");
    assert_eq!(value["conversationId"], "conv-1");
}

#[test]
fn test_send_message_defaults_to_text() {
    // A client that omits the body type sends text
    let raw = rmp_serde::to_vec_named(&serde_json::json!({
        "type": "send_message",
        "conversationId": "conv-1",
        "message": { "content": "Bonjour" },
    }))
    .unwrap();

    match decode_frame::<ClientEvent>(&raw).unwrap() {
        ClientEvent::SendMessage { conversation_id, message } => {
            assert_eq!(conversation_id, "conv-1");
            assert_eq!(message.kind, MessageType::Text);
            assert_eq!(message, MessagePayload::text("Bonjour"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_unknown_event_rejected() {
    let raw = rmp_serde::to_vec_named(&serde_json::json!({
        "type": "voice_data",
        "conversationId": "conv-1",
    }))
    .unwrap();

    let err = decode_frame::<ClientEvent>(&raw).unwrap_err();
    assert!(matches!(err, ProtocolError::Decode(_)));
}

#[test]
fn test_garbage_frame_rejected() {
    assert!(decode_frame::<ServerEvent>(&[0xc1, 0x00, 0xff]).is_err());
}

#[test]
fn test_server_event_scope() {
    let typing = ServerEvent::UserTypingStopped {
        conversation_id: "conv-9".into(),
        user_id: "u1".into(),
    };
    assert_eq!(typing.conversation_id(), Some("conv-9"));
    assert_eq!(ServerEvent::Pong.conversation_id(), None);

    let frame = encode_frame(&typing).unwrap();
    assert_eq!(decode_frame::<ServerEvent>(&frame).unwrap(), typing);
}
