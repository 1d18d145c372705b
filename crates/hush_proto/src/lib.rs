//! hush_proto - wire types, signed envelopes, and replay counters for hush
//!
//! All on-wire types are JSON, one frame per line.
//!
//! # Modules
//! - `payload`  - Hello / Chat / PublicChat payloads and directory messages
//! - `envelope` - Signed, counter-stamped wrapper and its canonical form
//! - `counter`  - Outbound counter issuance and inbound replay guard
//! - `frame`    - Line framing and frame dispatch kinds

pub mod counter;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod payload;

pub use counter::{CounterIssuer, HelloOutcome, ReplayGuard};
pub use envelope::{canonical_bytes, Envelope};
pub use error::ProtoError;
pub use frame::{decode_frame, encode_frame, Frame, FrameKind};
pub use payload::{
    ChatContent, ChatPayload, ClientEntry, ClientList, HelloPayload, Payload, PublicChatPayload,
    ServerEntry,
};
