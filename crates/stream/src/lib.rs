// Copyright 2025-2026 CEMAXECUTER LLC

pub mod drops;
pub mod error;
pub mod handoff;
pub mod synchro;

pub use drops::DropDetector;
pub use error::{Error, Result};
pub use handoff::{EventMsg, Handoff, HandoffCloser, StreamMsg, SynchroMsg};
pub use synchro::{Frame, Synchro, SynchroEvent, SynchroHandler};

/// Metadata delivered with every stream callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamParams {
    /// Hardware sample counter of the first sample in the block (wraps at 2^32)
    pub first_sample_num: u32,
    /// Gain reduction changed since the previous block
    pub gr_changed: bool,
    /// RF frequency changed since the previous block
    pub rf_changed: bool,
    /// Sample rate changed since the previous block
    pub fs_changed: bool,
    /// Number of samples per component in the block
    pub num_samples: u32,
}

/// Tuner selector used by dual-tuner devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tuner {
    A,
    B,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overload {
    Detected,
    Corrected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuoModeChange {
    PrimaryInitialised,
    SecondaryAttached,
    SecondaryDetached,
    SecondaryInitialised,
    SecondaryUninitialised,
    PrimaryDllDisappeared,
    SecondaryDllDisappeared,
}

/// Asynchronous device event reported by the hardware runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceEvent {
    GainChange {
        /// Total gain reduction in dB
        gr_db: u32,
        /// LNA share of the gain reduction in dB
        lna_gr_db: u32,
        /// Resulting system gain in dB
        curr_gain: f64,
    },
    PowerOverload(Overload),
    DeviceRemoved,
    DuoModeChange(DuoModeChange),
}
