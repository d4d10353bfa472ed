use crate::error::SyncResult;
use serde::{Deserialize, Serialize};

/// Text message asking peers to reply with their full current state.
pub const INITIAL_SYNC_EVENT: &str = "INITIAL_SYNC_EVENT";

/// A timestamped state snapshot exchanged between contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Ordering key; the larger timestamp wins.
    pub timestamp: u64,
    /// Encoded state, as produced by the store's codec.
    pub state: String,
}

/// Anything that travels over a sync channel.
///
/// On the wire an envelope is a JSON object and a text message is a bare
/// JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncMessage {
    Envelope(SyncEnvelope),
    Text(String),
}

impl SyncMessage {
    pub fn initial_sync_request() -> Self {
        SyncMessage::Text(INITIAL_SYNC_EVENT.to_string())
    }

    pub fn is_initial_sync_request(&self) -> bool {
        matches!(self, SyncMessage::Text(text) if text == INITIAL_SYNC_EVENT)
    }

    /// Encode for transports that carry text between processes.
    pub fn to_wire(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(wire: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(wire)?)
    }
}

impl From<SyncEnvelope> for SyncMessage {
    fn from(envelope: SyncEnvelope) -> Self {
        SyncMessage::Envelope(envelope)
    }
}
