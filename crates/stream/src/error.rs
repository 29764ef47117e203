// Copyright 2025-2026 CEMAXECUTER LLC

//! Error type shared by the stream core and the callback routing layer.
//!
//! Pairing and timing violations are never errors; they are reported through
//! [`crate::SynchroEvent`]. Only caller-contract violations end up here.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `close()` was called on a handoff channel that is already closed.
    #[error("already closed")]
    AlreadyClosed,

    /// Callbacks are already registered for this device handle.
    #[error("callbacks already registered for device {0:#x}")]
    DuplicateDevice(usize),

    /// No callbacks are registered for this device handle.
    #[error("no callbacks registered for device {0:#x}")]
    UnknownDevice(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_closed_message() {
        assert_eq!(Error::AlreadyClosed.to_string(), "already closed");
    }

    #[test]
    fn test_device_handle_formatting() {
        assert_eq!(
            Error::UnknownDevice(0x2a).to_string(),
            "no callbacks registered for device 0x2a"
        );
    }
}
