use std::fmt;

use serde::{Deserialize, Serialize};

/// Slave identifier: `(host, pid)`, unique for the lifetime of a server
/// process. Sent by the server to every new client as the handshake frame
/// (spec.md §3, §6).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid {
    pub host: String,
    pub pid: u32,
}

impl Sid {
    /// Builds the SID for the current process.
    pub fn current() -> Self {
        Self { host: hostname(), pid: std::process::id() }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.pid)
    }
}

#[cfg(unix)]
fn hostname() -> String {
    let mut buf = vec![0_u8; 256];
    // SAFETY: buf is a valid, correctly-sized out-buffer for gethostname(2).
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "unknown-host".to_string();
    }
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(nul);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown-host".to_string())
}
