use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    /// `send_bytes` was called before the handshake reached the data state.
    /// Outbound data is rejected rather than silently dropped.
    #[error("link has not reached the data state")]
    NotConnected,

    #[error("no call or answer in progress")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, ModemError>;
