// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! The calibration table and the two-phase calibrator (SPEC_FULL.md §4.3).

use crate::callbacks::{CalibrationEvent, CalibrationEventSink};
use crate::config::{CalibrationSeed, DeviceConfig, Geometry};
use crate::error::{KscanError, Result};
use crate::gateway::{Delay, HardwareGateway};
use crate::sampler::{sample, DEFAULT_SAMPLE_COUNT};

/// One cell's learned baseline. `avg_low == 0` means not yet calibrated;
/// `avg_high == 0` means phase 2 has not completed for this cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationEntry {
    pub avg_low: u16,
    pub avg_high: u16,
    pub noise: u16,
}

impl CalibrationEntry {
    /// A cell is usable by the scan loop only when `0 < avg_low < avg_high`.
    pub fn is_usable(&self) -> bool {
        self.avg_low > 0 && self.avg_low < self.avg_high
    }
}

/// `S * I` calibration entries, row-major by (strobe, input).
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
    inputs: usize,
}

impl CalibrationTable {
    fn index(&self, s: usize, r: usize) -> usize {
        s * self.inputs + r
    }

    pub fn entry(&self, s: usize, r: usize) -> CalibrationEntry {
        self.entries[self.index(s, r)]
    }

    pub fn set_entry(&mut self, s: usize, r: usize, entry: CalibrationEntry) {
        let i = self.index(s, r);
        self.entries[i] = entry;
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn empty(geometry: &Geometry) -> Self {
        Self {
            entries: vec![CalibrationEntry::default(); geometry.cell_count()],
            inputs: geometry.inputs,
        }
    }

    pub fn from_precalibrated(geometry: &Geometry, seed: &CalibrationSeed) -> Result<Self> {
        let lows = seed
            .precalib_avg_lows
            .as_ref()
            .ok_or(KscanError::InvalidCalibrationSeed("missing precalib_avg_lows"))?;
        let highs = seed
            .precalib_avg_highs
            .as_ref()
            .ok_or(KscanError::InvalidCalibrationSeed("missing precalib_avg_highs"))?;
        let cells = geometry.cell_count();
        if lows.len() != cells || highs.len() != cells {
            return Err(KscanError::InvalidCalibrationSeed(
                "precalib arrays must have strobes * inputs entries",
            ));
        }

        let entries = lows
            .iter()
            .zip(highs.iter())
            .map(|(&avg_low, &avg_high)| CalibrationEntry { avg_low, avg_high, noise: 0 })
            .collect();

        Ok(Self { entries, inputs: geometry.inputs })
    }
}

/// Run the full two-phase calibration described in SPEC_FULL.md §4.3.
/// Runs to completion on the calling (scan) thread while the device mutex
/// is held for the whole duration, matching the single-threaded contract.
pub fn run_calibration<G: HardwareGateway, D: Delay>(
    gateway: &mut G,
    delay: &mut D,
    geometry: &Geometry,
    config: &DeviceConfig,
    table: &mut CalibrationTable,
    sink: &mut dyn CalibrationEventSink,
) {
    if gateway.has_power() {
        gateway.power_on();
        gateway.warm_up(config.timing.matrix_warm_up_us);
    }

    // Flush ADC startup transients with one discarded read.
    let _ = gateway.read_raw(0, 0);

    log::debug!("calibration: low-sampling phase start");
    sink.on_calibration_event(CalibrationEvent::LowSamplingStart);
    for s in 0..geometry.strobes {
        for r in 0..geometry.inputs {
            if geometry.is_masked(s, r) {
                continue;
            }
            table.set_entry(s, r, CalibrationEntry::default());
            let stats = sample(delay, DEFAULT_SAMPLE_COUNT, || gateway.read_raw(s, r));
            table.set_entry(
                s,
                r,
                CalibrationEntry { avg_low: stats.mean, avg_high: 0, noise: stats.noise },
            );
            sink.on_calibration_event(CalibrationEvent::PositionLowDetermined {
                strobe: s as u8,
                input: r as u8,
                low_avg: stats.mean,
                noise: stats.noise,
            });
        }
    }

    log::debug!("calibration: high-sampling phase start");
    sink.on_calibration_event(CalibrationEvent::HighSamplingStart);
    let high_threshold = config.high_threshold();
    let mut remaining: usize = (0..geometry.strobes)
        .flat_map(|s| (0..geometry.inputs).map(move |r| (s, r)))
        .filter(|&(s, r)| !geometry.is_masked(s, r))
        .count();

    while remaining > 0 {
        for s in 0..geometry.strobes {
            for r in 0..geometry.inputs {
                if geometry.is_masked(s, r) {
                    continue;
                }
                let entry = table.entry(s, r);
                if entry.avg_high != 0 {
                    continue;
                }

                let probe = gateway.read_raw(s, r);
                if probe <= high_threshold {
                    continue;
                }
                delay.sleep_ms(1);
                let reprobe = gateway.read_raw(s, r);
                if reprobe <= high_threshold {
                    continue;
                }
                delay.sleep_ms(200);

                let stats = sample(delay, DEFAULT_SAMPLE_COUNT, || gateway.read_raw(s, r));
                let noise = entry.noise.max(stats.noise);
                let completed = CalibrationEntry { avg_low: entry.avg_low, avg_high: stats.mean, noise };
                table.set_entry(s, r, completed);
                remaining -= 1;

                let snr = if noise == 0 {
                    None
                } else {
                    Some(
                        ((completed.avg_high as u32 - completed.avg_low as u32 + noise as u32)
                            / noise as u32) as u16,
                    )
                };
                sink.on_calibration_event(CalibrationEvent::PositionComplete {
                    strobe: s as u8,
                    input: r as u8,
                    low_avg: completed.avg_low,
                    high_avg: completed.avg_high,
                    noise,
                    snr,
                });
                delay.sleep_ms(1);
            }
        }
        delay.sleep_ms(1);
    }

    if gateway.has_power() {
        gateway.power_off();
    }
    log::debug!("calibration: complete");
    sink.on_calibration_event(CalibrationEvent::Complete);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_usability_requires_low_below_high() {
        assert!(!CalibrationEntry::default().is_usable());
        assert!(CalibrationEntry { avg_low: 100, avg_high: 900, noise: 5 }.is_usable());
        assert!(!CalibrationEntry { avg_low: 900, avg_high: 100, noise: 5 }.is_usable());
        assert!(!CalibrationEntry { avg_low: 100, avg_high: 100, noise: 5 }.is_usable());
    }

    #[test]
    fn precalibrated_table_rejects_mismatched_lengths() {
        let geometry = Geometry { strobes: 2, inputs: 2, strobe_input_masks: vec![0, 0] };
        let seed = CalibrationSeed {
            skip_startup_calibration: true,
            precalib_avg_lows: Some(vec![100, 100, 100]),
            precalib_avg_highs: Some(vec![900, 900, 900, 900]),
        };
        assert!(CalibrationTable::from_precalibrated(&geometry, &seed).is_err());
    }

    #[test]
    fn precalibrated_table_accepts_matching_lengths() {
        let geometry = Geometry { strobes: 2, inputs: 2, strobe_input_masks: vec![0, 0] };
        let seed = CalibrationSeed {
            skip_startup_calibration: true,
            precalib_avg_lows: Some(vec![100, 110, 120, 130]),
            precalib_avg_highs: Some(vec![900, 910, 920, 930]),
        };
        let table = CalibrationTable::from_precalibrated(&geometry, &seed).unwrap();
        assert_eq!(table.entry(1, 1), CalibrationEntry { avg_low: 130, avg_high: 930, noise: 0 });
    }
}
