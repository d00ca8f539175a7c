// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Configuration/descriptor layer. A device-tree binding in the original
//! driver becomes a descriptor struct validated once at construction.

use crate::error::{KscanError, Result};
use crate::gateway::GatewayTiming;

/// Matrix dimensions and the optional per-strobe disabled-input mask.
#[derive(Debug, Clone)]
pub struct GeometryConfig {
    pub strobes: usize,
    pub inputs: usize,
    /// One `u64` bitmap per strobe; bit `r` set means input `r` is disabled
    /// for that strobe. Defaults to all-enabled when omitted.
    pub strobe_input_masks: Option<Vec<u64>>,
}

/// Resolved, validated matrix geometry used throughout the crate.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub strobes: usize,
    pub inputs: usize,
    pub strobe_input_masks: Vec<u64>,
}

impl Geometry {
    pub fn is_masked(&self, s: usize, r: usize) -> bool {
        (self.strobe_input_masks[s] >> r) & 1 != 0
    }

    pub fn cell_count(&self) -> usize {
        self.strobes * self.inputs
    }
}

/// Timing recognised by the read sequence and sweep/calibration batch
/// boundaries (SPEC_FULL.md §4.1, §6).
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    pub matrix_relax_us: u32,
    pub adc_read_settle_us: u32,
    pub matrix_warm_up_us: u32,
    pub fake_open_drain: bool,
}

impl From<TimingConfig> for GatewayTiming {
    fn from(t: TimingConfig) -> Self {
        GatewayTiming {
            matrix_relax_us: t.matrix_relax_us,
            adc_read_settle_us: t.adc_read_settle_us,
            matrix_warm_up_us: t.matrix_warm_up_us,
            fake_open_drain: t.fake_open_drain,
        }
    }
}

/// Cadence governor settings (SPEC_FULL.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct CadenceSettings {
    pub active_polling_interval_ms: u32,
    pub idle_polling_interval_ms: u32,
    pub sleep_polling_interval_ms: u32,
    pub idle_after_secs: u32,
    pub sleep_after_secs: u32,
    pub dynamic_polling_interval: bool,
}

/// Pre-seeded calibration data, used verbatim when startup calibration is
/// skipped (SPEC_FULL.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct CalibrationSeed {
    pub skip_startup_calibration: bool,
    pub precalib_avg_lows: Option<Vec<u16>>,
    pub precalib_avg_highs: Option<Vec<u16>>,
}

/// Full per-device configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub geometry: GeometryConfig,
    pub timing: TimingConfig,
    pub cadence: CadenceSettings,
    pub calibration_seed: CalibrationSeed,
    /// 11..=89, percentage of `range` below `avg_high` used as the press
    /// threshold.
    pub trigger_percentage: u8,
    /// ADC sample width, used to derive the phase-2 candidate threshold
    /// `2^(adc_resolution_bits - 1)`.
    pub adc_resolution_bits: u8,
}

impl DeviceConfig {
    pub(crate) fn validate(&self) -> Result<Geometry> {
        self.validate_inner().map_err(|e| {
            log::error!("device configuration rejected: {e}");
            e
        })
    }

    fn validate_inner(&self) -> Result<Geometry> {
        if self.geometry.strobes == 0 || self.geometry.inputs == 0 {
            return Err(KscanError::InvalidGeometry("strobes and inputs must be non-zero"));
        }
        if self.geometry.inputs > 64 {
            return Err(KscanError::InvalidGeometry(
                "inputs per strobe must fit in a 64-bit mask",
            ));
        }
        if self.geometry.strobes * self.geometry.inputs > 4096 {
            return Err(KscanError::InvalidGeometry("strobes * inputs exceeds 4096"));
        }
        if !(11..=89).contains(&self.trigger_percentage) {
            return Err(KscanError::InvalidTriggerPercentage(self.trigger_percentage));
        }
        if self.adc_resolution_bits == 0 || self.adc_resolution_bits > 16 {
            return Err(KscanError::InvalidGeometry("adc_resolution_bits must be in 1..=16"));
        }

        let strobe_input_masks = match &self.geometry.strobe_input_masks {
            Some(masks) => {
                if masks.len() != self.geometry.strobes {
                    return Err(KscanError::InvalidGeometry(
                        "strobe_input_masks length must equal strobes",
                    ));
                }
                masks.clone()
            }
            None => vec![0u64; self.geometry.strobes],
        };

        Ok(Geometry {
            strobes: self.geometry.strobes,
            inputs: self.geometry.inputs,
            strobe_input_masks,
        })
    }

    /// Half full-scale in raw ADC units; phase-2 candidates must exceed this
    /// on a single probe read.
    pub(crate) fn high_threshold(&self) -> u16 {
        1u16 << (self.adc_resolution_bits - 1)
    }
}
