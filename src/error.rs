// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

use core::fmt;

/// Errors returned by the public entry points of [`crate::EcMatrix`].
///
/// Hardware-transient errors (a failed ADC sample, a GPIO that refused to
/// reconfigure) never reach this type: they are logged at `warn` and the
/// scan loop keeps running on whatever value was already in the buffer.
/// Only configuration, contention and protocol errors are surfaced here.
#[derive(Debug)]
pub enum KscanError {
    /// Geometry (`strobes`/`inputs`/masks) failed validation at construction.
    InvalidGeometry(&'static str),
    /// `trigger_percentage` was outside the accepted `11..=89` range.
    InvalidTriggerPercentage(u8),
    /// Pre-seeded calibration arrays did not match `strobes * inputs`.
    InvalidCalibrationSeed(&'static str),
    /// A required hardware handle failed during bring-up (e.g. ADC
    /// self-calibration).
    HardwareInit(&'static str),
    /// `configure` was called a second time; the key-event sink is write-once.
    AlreadyConfigured,
    /// The device mutex could not be acquired within the caller's bound.
    Busy,
}

impl fmt::Display for KscanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KscanError::InvalidGeometry(why) => write!(f, "invalid matrix geometry: {why}"),
            KscanError::InvalidTriggerPercentage(pct) => {
                write!(f, "trigger_percentage {pct} out of range 11..=89")
            }
            KscanError::InvalidCalibrationSeed(why) => {
                write!(f, "invalid pre-seeded calibration data: {why}")
            }
            KscanError::HardwareInit(why) => write!(f, "hardware init failed: {why}"),
            KscanError::AlreadyConfigured => write!(f, "key-event sink already configured"),
            KscanError::Busy => write!(f, "device busy, try again"),
        }
    }
}

impl std::error::Error for KscanError {}

pub type Result<T> = core::result::Result<T, KscanError>;
