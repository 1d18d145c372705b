use hush_crypto::{Identity, Recipient};
use hush_proto::{
    decode_frame, encode_frame, ChatContent, ChatPayload, Envelope, Frame, FrameKind, Payload,
    ProtoError, ReplayGuard,
};

#[test]
fn chat_survives_the_full_wire_path() {
    let alice = Identity::generate("alice").unwrap();
    let bob = Identity::generate("bob").unwrap();

    let content = ChatContent::new("alice", &["bob".into()], "over the wire");
    let sealed = hush_crypto::seal(
        &content.to_bytes().unwrap(),
        &[Recipient {
            peer_id: "bob",
            key: Some(bob.encryption_key()),
        }],
    )
    .unwrap();
    let payload = Payload::Chat(ChatPayload::from_sealed("alice", &sealed, vec!["relay".into()]));
    let line = encode_frame(&Frame::SignedData(Envelope::sign(payload, 1, &alice).unwrap())).unwrap();

    // receiver side
    let frame = decode_frame(&line).unwrap();
    assert_eq!(frame.kind(), FrameKind::Chat);
    let Frame::SignedData(envelope) = frame else {
        panic!("expected signed data");
    };
    assert!(envelope.verify(alice.verification_key()).unwrap());
    assert!(ReplayGuard::new().accept(envelope.sender(), envelope.counter));

    let Payload::Chat(chat) = &envelope.data else {
        panic!("expected chat");
    };
    let plaintext = hush_crypto::open(&chat.to_sealed().unwrap(), "bob", &bob).unwrap();
    let received = ChatContent::from_bytes(&plaintext).unwrap();
    assert_eq!(received, content);
}

#[test]
fn relay_rewrites_break_the_signature() {
    let alice = Identity::generate("alice").unwrap();
    let payload = Payload::PublicChat(hush_proto::PublicChatPayload {
        sender: "alice".into(),
        message: "hi".into(),
    });
    let line = encode_frame(&Frame::SignedData(Envelope::sign(payload, 7, &alice).unwrap())).unwrap();

    // a relay rewriting the message must break the signature
    let rewritten = line.replace(r#""message":"hi""#, r#""message":"bye""#);
    assert_ne!(line, rewritten);
    let Frame::SignedData(envelope) = decode_frame(&rewritten).unwrap() else {
        panic!("expected signed data");
    };
    assert!(!envelope.verify(alice.verification_key()).unwrap());

    // and so must truncating the line
    assert!(matches!(
        decode_frame(&line[..line.len() - 2]),
        Err(ProtoError::EnvelopeFormat(_))
    ));
}
