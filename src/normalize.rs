// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Normalisation and hysteretic press/release decision.

use crate::calibration::CalibrationEntry;

/// Top of the normalised range (`2^16 - 1`).
pub const FULL: u32 = u16::MAX as u32;

/// Clamp `v` into `[avg_low, avg_high]` and rescale to `[0, FULL]`.
/// Monotone non-decreasing in `v`; `avg_low -> 0`, `avg_high -> FULL`.
pub fn normalize(v: u16, avg_low: u16, avg_high: u16) -> u16 {
    debug_assert!(avg_low < avg_high);
    let clamped = v.clamp(avg_low, avg_high);
    let range = (avg_high - avg_low) as u32;
    let numerator = FULL * (clamped - avg_low) as u32;
    (numerator / range) as u16
}

/// Press/release thresholds in normalised units, derived from one
/// calibration entry and the configured trigger percentage.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub press_limit: u16,
    pub release_limit: u16,
}

impl Thresholds {
    pub fn compute(entry: &CalibrationEntry, trigger_pct: u8) -> Self {
        let range = (entry.avg_high - entry.avg_low) as u32;
        let noise = entry.noise as u32;

        let margin = (range * trigger_pct as u32 / 100).max(noise);
        let press_limit_raw = (entry.avg_high as u32).saturating_sub(margin) as u16;

        let hys_buffer = (range / 8).max(noise) as u16;
        let release_limit_raw = press_limit_raw.saturating_sub(hys_buffer);

        Thresholds {
            press_limit: normalize(press_limit_raw, entry.avg_low, entry.avg_high),
            release_limit: normalize(release_limit_raw, entry.avg_low, entry.avg_high),
        }
    }
}

/// Hysteretic press/release decision: a cell only flips 0->1 above
/// `press_limit` and only flips 1->0 below `release_limit`; it otherwise
/// holds its previous bit.
pub fn decide(prev: bool, normalized: u16, thresholds: &Thresholds) -> bool {
    if !prev && normalized > thresholds.press_limit {
        true
    } else if prev && normalized < thresholds.release_limit {
        false
    } else {
        prev
    }
}
