use thiserror::Error;

use rfab_wire::{Sid, WireError};

/// Errors observable by users of the client session (C6) and remote
/// handle (C7), spec.md §7's user-visible kinds minus the server-only
/// `DanglingReference`/`BadAddress` (those travel back as
/// [`ClientError::RemoteFailure`] instead, since they were raised on the
/// other end of the wire).
#[derive(Error, Debug)]
pub enum ClientError {
    /// `Task::wait(timeout)` elapsed with no reply (spec.md §7).
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The stream closed during a header/body read, or a write found a
    /// dead peer (spec.md §7).
    #[error("disconnected from slave")]
    Disconnected,

    /// The codec failed to encode a request or decode a reply.
    #[error("serialization error: {0}")]
    Serialization(#[from] bitcode::Error),

    /// A handle was decoded in a process with no active session to its
    /// owning slave (spec.md §4.7, §7).
    #[error("no bridge to slave {0}: connect to it before passing this handle here")]
    NoBridge(Sid),

    /// The server-side execution raised; carries the error value and a
    /// human-readable traceback (spec.md §7).
    #[error("remote failure: {error:?}\n{traceback}")]
    RemoteFailure { error: rfab_wire::Value, traceback: String },
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Disconnected => ClientError::Disconnected,
            WireError::Serialization(e) => ClientError::Serialization(e),
            WireError::Io(e) => ClientError::Disconnected.with_io_context(e),
        }
    }
}

impl ClientError {
    // `WireError::Io` has no direct client-facing kind (spec.md §7 lists
    // only `Disconnected` for transport failures); a transport-level I/O
    // error that is not a clean disconnect is still surfaced as
    // `Disconnected` since every client-visible transport failure fails
    // the session the same way (spec.md §7 "Client-side transport
    // failures fail the session").
    fn with_io_context(self, err: std::io::Error) -> Self {
        tracing::debug!(%err, "client: io error treated as disconnect");
        self
    }
}
