//! Peer directory: who is online and which keys they use.
//!
//! Fed from two places:
//!   - `client_list` snapshots from the relay, which replace the table
//!   - verified `hello` envelopes, which upsert a single peer
//!
//! Every key goes through the `hush_crypto` PEM import checks before an
//! entry is admitted, so nothing in the table holds unchecked key text.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use hush_crypto::{CryptoError, EncryptionPublicKey, VerificationKey};
use hush_proto::{ClientEntry, ClientList, Frame};

/// Public half of a peer, as far as this client knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    pub peer_id: String,
    pub encryption_key: EncryptionPublicKey,
    /// `None` when the relay listed the peer without a signing key and no
    /// hello has been seen yet. Such a peer can be written to but not
    /// heard from.
    pub verification_key: Option<VerificationKey>,
    /// Home relay address, used for `destination_servers`.
    pub server: Option<String>,
    /// SHA-256 of the encryption key PEM.
    pub fingerprint: String,
    /// SHA-256 of the signing key PEM; identifies the peer's session.
    pub signing_fingerprint: Option<String>,
}

impl PublicIdentity {
    pub fn from_pems(
        peer_id: &str,
        encryption_pem: &str,
        signing_pem: Option<&str>,
        server: Option<String>,
    ) -> Result<Self, CryptoError> {
        let encryption_key = EncryptionPublicKey::from_pem(encryption_pem)?;
        let verification_key = signing_pem.map(VerificationKey::from_pem).transpose()?;
        let fingerprint = encryption_key.fingerprint()?;
        let signing_fingerprint = verification_key.as_ref().map(VerificationKey::fingerprint).transpose()?;
        Ok(Self {
            peer_id: peer_id.to_string(),
            encryption_key,
            verification_key,
            server,
            fingerprint,
            signing_fingerprint,
        })
    }
}

/// One `client_list` entry that was not admitted.
#[derive(Debug, Error)]
#[error("directory entry {peer_id:?} rejected: {reason}")]
pub struct DirectoryEntryError {
    pub peer_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<BTreeMap<String, Arc<PublicIdentity>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame that asks the relay for a fresh snapshot.
    pub fn request() -> Frame {
        Frame::ClientListRequest
    }

    /// Replace the whole table with `list`. Malformed entries are skipped and
    /// returned; well-formed ones are kept.
    pub fn apply_snapshot(&self, list: &ClientList) -> Vec<DirectoryEntryError> {
        let mut next: BTreeMap<String, Arc<PublicIdentity>> = BTreeMap::new();
        let mut rejected = Vec::new();

        for server in &list.servers {
            let address = (!server.address.is_empty()).then(|| server.address.clone());
            for entry in &server.clients {
                match admit(entry, address.clone()) {
                    Ok(peer) if next.contains_key(&peer.peer_id) => rejected.push(DirectoryEntryError {
                        peer_id: peer.peer_id,
                        reason: "listed more than once".into(),
                    }),
                    Ok(peer) => {
                        next.insert(peer.peer_id.clone(), Arc::new(peer));
                    }
                    Err(e) => rejected.push(e),
                }
            }
        }

        for e in &rejected {
            tracing::warn!(peer = %e.peer_id, reason = %e.reason, "dropping directory entry");
        }
        tracing::debug!(peers = next.len(), rejected = rejected.len(), "directory snapshot applied");

        *self.peers.write() = next;
        rejected
    }

    /// Insert or replace one peer. Returns the previous encryption key
    /// fingerprint when either of the peer's keys changed.
    pub fn register(&self, peer: PublicIdentity) -> Option<String> {
        let mut peers = self.peers.write();
        let previous = peers
            .get(&peer.peer_id)
            .filter(|old| old.fingerprint != peer.fingerprint || old.signing_fingerprint != peer.signing_fingerprint)
            .map(|old| old.fingerprint.clone());
        if let Some(old) = &previous {
            tracing::warn!(peer = %peer.peer_id, old = %old, new = %peer.fingerprint, "peer keys changed");
        }
        peers.insert(peer.peer_id.clone(), Arc::new(peer));
        previous
    }

    pub fn lookup(&self, peer_id: &str) -> Option<Arc<PublicIdentity>> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Sorted list of known peer ids.
    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Deduplicated home servers of `recipients`, in first-seen order.
    /// Recipients without a known server are skipped.
    pub fn servers_for(&self, recipients: &[String]) -> Vec<String> {
        let peers = self.peers.read();
        let mut seen = BTreeSet::new();
        recipients
            .iter()
            .filter_map(|r| peers.get(r).and_then(|p| p.server.clone()))
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }
}

fn admit(entry: &ClientEntry, server: Option<String>) -> Result<PublicIdentity, DirectoryEntryError> {
    if entry.username.trim().is_empty() {
        return Err(DirectoryEntryError {
            peer_id: entry.username.clone(),
            reason: "empty username".into(),
        });
    }
    PublicIdentity::from_pems(
        &entry.username,
        &entry.public_key,
        entry.signing_key.as_deref(),
        server,
    )
    .map_err(|e| DirectoryEntryError {
        peer_id: entry.username.clone(),
        reason: e.to_string(),
    })
}
