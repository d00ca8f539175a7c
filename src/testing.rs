// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! A software-simulated [`HardwareGateway`] for exercising the scan loop and
//! calibrator without real hardware, driven by a scripted sequence of ADC
//! readings per coordinate.

use std::collections::{HashMap, VecDeque};

use crate::gateway::{HardwareGateway, ReadTiming};

/// A gateway whose `read_raw` replays a scripted queue of readings per
/// (strobe, input) coordinate. Coordinates with no script left return `0`.
pub struct SimulatedGateway {
    readings: HashMap<(usize, usize), VecDeque<u16>>,
    powered: bool,
    self_calibrate_result: Result<(), &'static str>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self { readings: HashMap::new(), powered: false, self_calibrate_result: Ok(()) }
    }

    /// Append one reading to the end of the queue for a coordinate.
    pub fn push_reading(&mut self, strobe: usize, input: usize, value: u16) -> &mut Self {
        self.readings.entry((strobe, input)).or_default().push_back(value);
        self
    }

    /// Append the same sequence of readings to every coordinate in
    /// `0..strobes, 0..inputs` -- useful for seeding calibration's discarded
    /// warm-up read and the low/high sampling windows uniformly.
    pub fn fill(&mut self, strobes: usize, inputs: usize, values: &[u16]) -> &mut Self {
        for s in 0..strobes {
            for r in 0..inputs {
                for &v in values {
                    self.push_reading(s, r, v);
                }
            }
        }
        self
    }

    pub fn force_self_calibrate_failure(&mut self, reason: &'static str) -> &mut Self {
        self.self_calibrate_result = Err(reason);
        self
    }
}

impl HardwareGateway for SimulatedGateway {
    fn has_power(&self) -> bool {
        true
    }

    fn power_on(&mut self) {
        self.powered = true;
    }

    fn power_off(&mut self) {
        self.powered = false;
    }

    fn warm_up(&mut self, _us: u32) {}

    fn read_raw(&mut self, strobe: usize, input: usize) -> u16 {
        self.readings
            .get_mut(&(strobe, input))
            .and_then(|q| if q.len() > 1 { q.pop_front() } else { q.front().copied() })
            .unwrap_or(0)
    }

    fn self_calibrate_adc(&mut self) -> Result<(), &'static str> {
        self.self_calibrate_result
    }

    fn last_read_timing(&self) -> ReadTiming {
        ReadTiming::default()
    }

    fn max_scan_duration_ns(&self) -> u64 {
        0
    }
}
