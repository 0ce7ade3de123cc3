use std::{net::SocketAddr, path::PathBuf};

/// Transport address: `AF_UNIX` (path) or `AF_INET` (`host:port`), chosen
/// by address shape (spec.md §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Endpoint {
    /// Parses a `-a ADDRESS` value: `host:port` resolves to TCP, anything
    /// else is a filesystem path for a Unix socket (spec.md §6 CLI, mirrors
    /// `guess_socket_familly` in `processional/connection.py`).
    pub fn parse(raw: &str) -> Result<Self, std::net::AddrParseError> {
        if let Ok(addr) = raw.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }
        // host:port without a pre-resolved ip still looks like "a:b" — try
        // std's resolver before falling back to "it must be a path".
        if raw.contains(':') {
            if let Ok(mut addrs) = std::net::ToSocketAddrs::to_socket_addrs(&raw) {
                if let Some(addr) = addrs.next() {
                    return Ok(Endpoint::Tcp(addr));
                }
            }
        }
        Ok(Endpoint::Unix(PathBuf::from(raw)))
    }

    /// The default address for a slave with no `-a`, derived from the pid
    /// (spec.md §6, `processional::process._default_address`).
    pub fn default_for_pid(pid: u32) -> Self {
        Endpoint::Unix(PathBuf::from(format!("/tmp/rfab-{pid}")))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}
