//! Fixtures shared by the session integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use hush_crypto::Identity;
use hush_proto::{encode_frame, ClientEntry, ClientList, Envelope, Frame, Payload, PublicChatPayload, ServerEntry};
use hush_session::transport::MemoryFrameSource;
use hush_session::{memory_pipe, Session};

/// One identity per name for the whole test binary; RSA keygen is slow.
pub fn identity(name: &str) -> Arc<Identity> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<Identity>>>> = OnceLock::new();
    let mut cache = CACHE.get_or_init(Default::default).lock().unwrap();
    cache
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Identity::generate(name).unwrap()))
        .clone()
}

pub struct Peer {
    pub session: Arc<Session>,
    pub wire: MemoryFrameSource,
}

impl Peer {
    pub fn new(name: &str) -> Self {
        Self::with_identity(identity(name))
    }

    pub fn with_identity(identity: Arc<Identity>) -> Self {
        let (sink, wire) = memory_pipe();
        Self {
            session: Arc::new(Session::new(identity, sink)),
            wire,
        }
    }

    pub fn sent(&mut self) -> String {
        self.wire.try_next_line().expect("a frame was sent")
    }
}

pub fn entry(name: &str) -> ClientEntry {
    let id = identity(name);
    ClientEntry {
        username: name.into(),
        public_key: id.encryption_key().to_pem().unwrap(),
        signing_key: Some(id.verification_key().to_pem().unwrap()),
    }
}

pub fn snapshot_line(names: &[&str]) -> String {
    let frame = Frame::ClientList(ClientList {
        servers: vec![ServerEntry {
            address: "127.0.0.1:8000".into(),
            clients: names.iter().map(|n| entry(n)).collect(),
        }],
    });
    encode_frame(&frame).unwrap()
}

pub fn signed_line(payload: Payload, counter: u64, signer: &Identity) -> String {
    encode_frame(&Frame::SignedData(Envelope::sign(payload, counter, signer).unwrap())).unwrap()
}

pub fn public(sender: &str, message: &str) -> Payload {
    Payload::PublicChat(PublicChatPayload {
        sender: sender.into(),
        message: message.into(),
    })
}

/// Everyone in `names` knows everyone in `names`.
pub fn network(names: &[&str]) -> Vec<Peer> {
    let line = snapshot_line(names);
    names
        .iter()
        .map(|n| {
            let peer = Peer::new(n);
            peer.session.handle_frame(&line).unwrap();
            peer
        })
        .collect()
}
