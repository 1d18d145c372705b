//! Session driver: turns user intents into signed frames and inbound frames
//! into `SessionEvent`s.
//!
//! Inbound signed traffic goes through the same gate in this order:
//!   1. signature, against the sender's known (or, for hello, carried) key
//!   2. replay counter, against the sender's high-water mark for the
//!      signing key that verified the frame
//!   3. payload handling (decrypt, participants check, directory update)
//! A frame that fails any step is dropped with an error; nothing it carries
//! reaches the caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use hush_crypto::{Identity, Recipient};
use hush_proto::{
    decode_frame, encode_frame, ChatContent, ChatPayload, ClientList, CounterIssuer, Envelope,
    Frame, HelloPayload, Payload, PublicChatPayload, ReplayGuard,
};

use crate::directory::{PeerDirectory, PublicIdentity};
use crate::error::{Result, SessionError};
use crate::transport::{FrameSink, FrameSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PeerAnnounced {
        peer_id: String,
        fingerprint: String,
        /// Set when the peer was already known under different keys.
        previous_fingerprint: Option<String>,
        at: DateTime<Utc>,
    },
    DirectoryUpdated {
        peers: Vec<String>,
        rejected: Vec<String>,
        at: DateTime<Utc>,
    },
    /// Someone asked for the directory; only meaningful when this process
    /// is acting as a directory provider.
    DirectoryRequested { at: DateTime<Utc> },
    Chat {
        from: String,
        participants: Vec<String>,
        message: String,
        counter: u64,
        at: DateTime<Utc>,
    },
    PublicChat {
        from: String,
        message: String,
        counter: u64,
        at: DateTime<Utc>,
    },
    /// A frame was dropped. `tampering` separates forged or replayed traffic
    /// from merely malformed input.
    Rejected {
        reason: String,
        tampering: bool,
        at: DateTime<Utc>,
    },
}

pub struct Session {
    identity: Arc<Identity>,
    directory: PeerDirectory,
    counters: CounterIssuer,
    replay: ReplayGuard,
    sink: Mutex<Box<dyn FrameSink>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer_id", &self.peer_id())
            .field("peers", &self.directory.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(identity: Arc<Identity>, sink: impl FrameSink + 'static) -> Self {
        Self {
            identity,
            directory: PeerDirectory::new(),
            counters: CounterIssuer::new(),
            replay: ReplayGuard::new(),
            sink: Mutex::new(Box::new(sink)),
        }
    }

    pub fn peer_id(&self) -> &str {
        self.identity.display_name()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Announce this identity and both public keys.
    pub async fn hello(&self) -> Result<u64> {
        let payload = Payload::Hello(HelloPayload {
            username: self.peer_id().to_string(),
            public_key: self.identity.encryption_key().to_pem()?,
            signing_key: self.identity.verification_key().to_pem()?,
        });
        self.send_signed(payload).await
    }

    pub async fn request_directory(&self) -> Result<()> {
        let line = encode_frame(&PeerDirectory::request())?;
        self.sink.lock().await.send_line(&line).await
    }

    /// Encrypt `text` to `recipients` and send it. Returns the counter used.
    pub async fn send_chat(&self, recipients: &[String], text: &str) -> Result<u64> {
        let mut seen = BTreeSet::new();
        let recipients: Vec<String> = recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect();

        let known: Vec<Option<Arc<PublicIdentity>>> =
            recipients.iter().map(|r| self.directory.lookup(r)).collect();
        let resolved: Vec<Recipient<'_>> = recipients
            .iter()
            .zip(&known)
            .map(|(peer_id, peer)| Recipient {
                peer_id: peer_id.as_str(),
                key: peer.as_ref().map(|p| &p.encryption_key),
            })
            .collect();

        let content = ChatContent::new(self.peer_id(), &recipients, text);
        let sealed = hush_crypto::seal(&content.to_bytes()?, &resolved)?;
        let servers = self.directory.servers_for(&recipients);
        let payload = Payload::Chat(ChatPayload::from_sealed(self.peer_id(), &sealed, servers));

        let counter = self.send_signed(payload).await?;
        tracing::debug!(recipients = recipients.len(), counter, "chat sent");
        Ok(counter)
    }

    pub async fn send_public(&self, text: &str) -> Result<u64> {
        let payload = Payload::PublicChat(PublicChatPayload {
            sender: self.peer_id().to_string(),
            message: text.to_string(),
        });
        self.send_signed(payload).await
    }

    // Counter, signature and write share one critical section so that frames
    // leave in counter order.
    async fn send_signed(&self, payload: Payload) -> Result<u64> {
        let mut sink = self.sink.lock().await;
        let counter = self.counters.next()?;
        let envelope = Envelope::sign(payload, counter, &self.identity)?;
        let line = encode_frame(&Frame::SignedData(envelope))?;
        sink.send_line(&line).await?;
        Ok(counter)
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Process one line from the transport. `Ok(None)` means the frame was
    /// valid but produces nothing for the caller (e.g. our own echo).
    pub fn handle_frame(&self, line: &str) -> Result<Option<SessionEvent>> {
        match decode_frame(line)? {
            Frame::SignedData(envelope) => self.handle_signed(envelope),
            Frame::ClientList(list) => Ok(Some(self.handle_client_list(&list))),
            Frame::ClientListRequest => Ok(Some(SessionEvent::DirectoryRequested { at: Utc::now() })),
        }
    }

    fn handle_client_list(&self, list: &ClientList) -> SessionEvent {
        let rejected = self
            .directory
            .apply_snapshot(list)
            .into_iter()
            .map(|e| e.to_string())
            .collect();
        SessionEvent::DirectoryUpdated {
            peers: self.directory.peer_ids(),
            rejected,
            at: Utc::now(),
        }
    }

    fn handle_signed(&self, envelope: Envelope) -> Result<Option<SessionEvent>> {
        let sender = envelope.sender().to_string();
        if sender == self.peer_id() {
            tracing::trace!(counter = envelope.counter, "ignoring own frame");
            return Ok(None);
        }

        match &envelope.data {
            Payload::Hello(hello) => self.handle_hello(hello, &envelope),
            Payload::Chat(chat) => {
                self.authenticate(&sender, &envelope)?;
                let sealed = chat.to_sealed()?;
                let plaintext = hush_crypto::open(&sealed, self.peer_id(), &self.identity)?;
                let content = ChatContent::from_bytes(&plaintext)?;
                if content.sender() != Some(sender.as_str()) {
                    tracing::warn!(peer = %sender, "participants list does not start with the signer");
                    return Err(SessionError::Authentication(sender));
                }
                Ok(Some(SessionEvent::Chat {
                    from: sender,
                    participants: content.participants,
                    message: content.message,
                    counter: envelope.counter,
                    at: Utc::now(),
                }))
            }
            Payload::PublicChat(public) => {
                self.authenticate(&sender, &envelope)?;
                Ok(Some(SessionEvent::PublicChat {
                    from: sender,
                    message: public.message.clone(),
                    counter: envelope.counter,
                    at: Utc::now(),
                }))
            }
        }
    }

    // Hello is verified with the key it carries. A hello under a signing key
    // not seen before for this name is a new session and reseeds the mark;
    // one under the current key must still move the mark forward.
    fn handle_hello(&self, hello: &HelloPayload, envelope: &Envelope) -> Result<Option<SessionEvent>> {
        let server = self
            .directory
            .lookup(&hello.username)
            .and_then(|p| p.server.clone());
        let peer = PublicIdentity::from_pems(
            &hello.username,
            &hello.public_key,
            Some(&hello.signing_key),
            server,
        )?;
        let (Some(key), Some(key_id)) = (peer.verification_key.as_ref(), peer.signing_fingerprint.as_deref()) else {
            return Err(SessionError::UnknownSender(hello.username.clone()));
        };
        if !envelope.verify(key)? {
            tracing::warn!(peer = %hello.username, "hello signature does not match its signing key");
            return Err(SessionError::Authentication(hello.username.clone()));
        }
        let outcome = self
            .replay
            .accept_hello(&hello.username, key_id, envelope.counter)
            .ok_or_else(|| SessionError::ReplayRejected {
                peer: hello.username.clone(),
                counter: envelope.counter,
            })?;

        let peer_id = peer.peer_id.clone();
        let fingerprint = peer.fingerprint.clone();
        let previous_fingerprint = self.directory.register(peer);
        tracing::info!(peer = %peer_id, %fingerprint, ?outcome, "peer announced");
        Ok(Some(SessionEvent::PeerAnnounced {
            peer_id,
            fingerprint,
            previous_fingerprint,
            at: Utc::now(),
        }))
    }

    fn authenticate(&self, sender: &str, envelope: &Envelope) -> Result<()> {
        let peer = self
            .directory
            .lookup(sender)
            .ok_or_else(|| SessionError::UnknownSender(sender.to_string()))?;
        let (Some(key), Some(key_id)) = (peer.verification_key.as_ref(), peer.signing_fingerprint.as_deref()) else {
            return Err(SessionError::UnknownSender(sender.to_string()));
        };
        if !envelope.verify(key)? {
            tracing::warn!(peer = %sender, counter = envelope.counter, "bad signature");
            return Err(SessionError::Authentication(sender.to_string()));
        }
        if self.replay.accept_signed(sender, key_id, envelope.counter) {
            Ok(())
        } else {
            Err(SessionError::ReplayRejected {
                peer: sender.to_string(),
                counter: envelope.counter,
            })
        }
    }

    /// Drain `source` until it closes, forwarding events to `events`.
    /// Per-frame errors become `Rejected` events (or are dropped quietly when
    /// the frame simply was not addressed to us); only transport failures end
    /// the loop with an error.
    pub async fn run_inbound<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<()> {
        while let Some(line) = source.next_line().await? {
            let event = match self.handle_frame(&line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) if e.is_not_for_us() => {
                    tracing::debug!("chat not addressed to us");
                    continue;
                }
                Err(e) => {
                    let tampering = e.is_tampering();
                    if tampering {
                        tracing::warn!(error = %e, "rejected frame");
                    } else {
                        tracing::debug!(error = %e, "dropped frame");
                    }
                    SessionEvent::Rejected {
                        reason: e.to_string(),
                        tampering,
                        at: Utc::now(),
                    }
                }
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
        tracing::info!("inbound stream closed");
        Ok(())
    }
}
