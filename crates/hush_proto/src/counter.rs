//! Replay counters.
//!
//! Outbound: one `CounterIssuer` per local identity hands out strictly
//! increasing values, even when several tasks send at once.
//!
//! Inbound: `ReplayGuard` keeps a high-water mark per sender.
//!
//!   no mark seen ──accept(n)──▶ mark = n
//!   mark = m     ──accept(n), n > m──▶ mark = n
//!   mark = m     ──accept(n), n ≤ m──▶ rejected, mark stays m
//!
//! The mark belongs to one signing key. A verified hello under a new key
//! starts a new session: the mark is reseeded and the old key is retired.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::ProtoError;

#[derive(Debug, Default)]
pub struct CounterIssuer {
    last: Mutex<u64>,
}

impl CounterIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value, strictly greater than everything issued before.
    pub fn next(&self) -> Result<u64, ProtoError> {
        let mut last = self.last.lock();
        *last = last.checked_add(1).ok_or(ProtoError::CounterExhausted)?;
        Ok(*last)
    }

    pub fn last_issued(&self) -> u64 {
        *self.last.lock()
    }
}

/// How a verified hello relates to what was already known about its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// First traffic ever seen from this peer.
    Fresh,
    /// Same signing key as before, counter above the mark.
    Continued,
    /// New signing key: the peer started a new session and the mark was
    /// reseeded to this hello's counter.
    Restarted,
}

#[derive(Debug)]
struct PeerMark {
    counter: u64,
    /// Fingerprint of the signing key the mark belongs to, once known.
    key: Option<String>,
    /// Signing keys of earlier sessions. Keys are never reused, so traffic
    /// under one of these is always a replay.
    retired: HashSet<String>,
}

impl PeerMark {
    fn new(counter: u64, key: Option<&str>) -> Self {
        Self {
            counter,
            key: key.map(str::to_string),
            retired: HashSet::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReplayGuard {
    marks: Mutex<HashMap<String, PeerMark>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `counter` from `peer_id` iff it is above the recorded mark.
    /// The check and the update happen under one lock.
    pub fn accept(&self, peer_id: &str, counter: u64) -> bool {
        let mut marks = self.marks.lock();
        match marks.get_mut(peer_id) {
            Some(mark) => advance(peer_id, mark, counter),
            None => {
                marks.insert(peer_id.to_string(), PeerMark::new(counter, None));
                true
            }
        }
    }

    /// `accept` for traffic verified under the signing key `key_id`.
    /// A key other than the one owning the mark is refused; only a hello
    /// can switch sessions.
    pub fn accept_signed(&self, peer_id: &str, key_id: &str, counter: u64) -> bool {
        let mut marks = self.marks.lock();
        let Some(mark) = marks.get_mut(peer_id) else {
            marks.insert(peer_id.to_string(), PeerMark::new(counter, Some(key_id)));
            return true;
        };
        if matches!(&mark.key, Some(k) if k != key_id) {
            tracing::warn!(peer = peer_id, counter, "traffic under a signing key that does not own the mark");
            return false;
        }
        if !advance(peer_id, mark, counter) {
            return false;
        }
        mark.key.get_or_insert_with(|| key_id.to_string());
        true
    }

    /// Gate for a verified hello signed by `key_id`.
    ///
    /// The first hello under a new key seeds the mark with whatever counter
    /// it carries, and the previous key is retired. A hello under the
    /// current key is held to the usual strictly-increasing rule, and one
    /// under a retired key is refused. `None` means rejected.
    pub fn accept_hello(&self, peer_id: &str, key_id: &str, counter: u64) -> Option<HelloOutcome> {
        let mut marks = self.marks.lock();
        let Some(mark) = marks.get_mut(peer_id) else {
            marks.insert(peer_id.to_string(), PeerMark::new(counter, Some(key_id)));
            return Some(HelloOutcome::Fresh);
        };
        if mark.retired.contains(key_id) {
            tracing::warn!(peer = peer_id, counter, "hello under a retired signing key");
            return None;
        }
        match mark.key.clone() {
            Some(old) if old != key_id => {
                tracing::info!(peer = peer_id, old_mark = mark.counter, counter, "peer started a new session");
                mark.retired.insert(old);
                mark.key = Some(key_id.to_string());
                mark.counter = counter;
                Some(HelloOutcome::Restarted)
            }
            _ => {
                if !advance(peer_id, mark, counter) {
                    return None;
                }
                mark.key = Some(key_id.to_string());
                Some(HelloOutcome::Continued)
            }
        }
    }

    pub fn high_water_mark(&self, peer_id: &str) -> Option<u64> {
        self.marks.lock().get(peer_id).map(|m| m.counter)
    }

    pub fn is_seeded(&self, peer_id: &str) -> bool {
        self.marks.lock().contains_key(peer_id)
    }
}

fn advance(peer_id: &str, mark: &mut PeerMark, counter: u64) -> bool {
    if counter <= mark.counter {
        tracing::warn!(peer = peer_id, counter, mark = mark.counter, "replayed or reordered counter");
        return false;
    }
    mark.counter = counter;
    true
}
