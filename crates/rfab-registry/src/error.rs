use thiserror::Error;

/// Errors raised resolving or mutating entries in the handle registry (C3).
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("dangling reference: root {0} is not registered, was it dropped by its owners?")]
    DanglingReference(u64),

    #[error("bad address: {0}")]
    BadAddress(String),
}
