//! Wire framing - one JSON object per line.
//!
//! Frame types:
//!   - `signed_data`         - an `Envelope` from a peer
//!   - `client_list_request` - ask the relay for its directory
//!   - `client_list`         - directory snapshot from the relay (unsigned)
//!
//! Compact `serde_json` output never contains a raw newline, so a frame is
//! always exactly one line.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::ProtoError;
use crate::payload::{ClientList, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    SignedData(Envelope),
    ClientListRequest,
    ClientList(ClientList),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Hello,
    Chat,
    PublicChat,
    ClientListRequest,
    ClientListResponse,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::SignedData(env) => match env.data {
                Payload::Hello(_) => FrameKind::Hello,
                Payload::Chat(_) => FrameKind::Chat,
                Payload::PublicChat(_) => FrameKind::PublicChat,
            },
            Frame::ClientListRequest => FrameKind::ClientListRequest,
            Frame::ClientList(_) => FrameKind::ClientListResponse,
        }
    }
}

/// Encode a frame for the wire (no trailing newline).
pub fn encode_frame(frame: &Frame) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode one line from the wire. Anything that is not a known, complete
/// frame is an `EnvelopeFormat` error.
pub fn decode_frame(line: &str) -> Result<Frame, ProtoError> {
    serde_json::from_str(line.trim_end()).map_err(|e| ProtoError::EnvelopeFormat(e.to_string()))
}
