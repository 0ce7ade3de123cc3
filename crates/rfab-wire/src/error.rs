use thiserror::Error;

/// Errors surfaced by the framing and codec layers (C1/C2).
///
/// This is the full set of transport-level failures; higher layers
/// (`rfab-registry`, `rfab-client`) add their own variants on top of these.
#[derive(Error, Debug)]
pub enum WireError {
    /// The peer closed the stream, or writing to it failed because it is
    /// gone. Raised mid-header or mid-body per spec: a partial frame at
    /// EOF is `Disconnected`, never a silent short read.
    #[error("peer disconnected")]
    Disconnected,

    /// The codec failed to encode a request or decode a reply. Wraps the
    /// underlying cause so callers can inspect it.
    #[error("serialization error: {0}")]
    Serialization(#[from] bitcode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, WireError::Disconnected)
    }
}
