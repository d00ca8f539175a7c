// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! The hardware gateway: one-shot reads of a single (strobe, input)
//! coordinate, and the timing-critical sequence that produces them.

pub mod pins;

pub use pins::{AnalogChannel, Delay, Drain, Input, Power, Strobe};

use std::time::{Duration, Instant};

/// Per-phase nanosecond breakdown of the most recently completed single-cell
/// read, plus a running worst case since the last reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadTiming {
    /// Time spent configuring and later disconnecting the input line.
    pub input_setup_ns: u64,
    /// Time spent inside the interrupt-locked region (drain release through
    /// ADC sample).
    pub locked_region_ns: u64,
    /// Total wall time of the whole sequence.
    pub total_ns: u64,
}

/// Timing configuration recognised by the read sequence (`matrix_relax_us`,
/// `adc_read_settle_us`) and by sweep/calibration batch boundaries
/// (`matrix_warm_up_us`).
#[derive(Debug, Clone, Copy)]
pub struct GatewayTiming {
    pub matrix_relax_us: u32,
    pub adc_read_settle_us: u32,
    pub matrix_warm_up_us: u32,
    pub fake_open_drain: bool,
}

/// Hardware access needed by the rest of the crate: one-shot coordinate
/// reads, power rail control and ADC self-calibration. Implemented here for
/// any combination of the seam traits in [`pins`]; [`crate::testing::SimulatedGateway`]
/// implements it directly against a scripted fixture.
pub trait HardwareGateway: Send {
    fn has_power(&self) -> bool;
    fn power_on(&mut self);
    fn power_off(&mut self);
    fn warm_up(&mut self, us: u32);
    /// Read one (strobe, input) coordinate. Never fails at this level:
    /// hardware errors are logged and the last successfully sampled value
    /// is returned.
    fn read_raw(&mut self, strobe: usize, input: usize) -> u16;
    /// Run ADC self-calibration once, at init, unless startup calibration is
    /// skipped.
    fn self_calibrate_adc(&mut self) -> Result<(), &'static str>;
    fn last_read_timing(&self) -> ReadTiming;
    fn max_scan_duration_ns(&self) -> u64;
}

/// Generic gateway built from a set of strobe/input lines plus an optional
/// power rail and drain, driving the twelve-step sequence in SPEC_FULL.md
/// §4.1.
pub struct Gateway<S, I, A, D, P, Dr> {
    strobes: Vec<S>,
    inputs: Vec<I>,
    adc: A,
    delay: D,
    power: Option<P>,
    drain: Option<Dr>,
    timing: GatewayTiming,
    last_raw: u16,
    last_timing: ReadTiming,
    max_scan_duration_ns: u64,
}

impl<S, I, A, D, P, Dr> Gateway<S, I, A, D, P, Dr>
where
    S: Strobe,
    I: Input,
    A: AnalogChannel,
    D: Delay,
    P: Power,
    Dr: Drain,
{
    pub fn new(
        strobes: Vec<S>,
        inputs: Vec<I>,
        adc: A,
        delay: D,
        power: Option<P>,
        drain: Option<Dr>,
        timing: GatewayTiming,
    ) -> Self {
        Self {
            strobes,
            inputs,
            adc,
            delay,
            power,
            drain,
            timing,
            last_raw: 0,
            last_timing: ReadTiming::default(),
            max_scan_duration_ns: 0,
        }
    }
}

impl<S, I, A, D, P, Dr> HardwareGateway for Gateway<S, I, A, D, P, Dr>
where
    S: Strobe + Send,
    I: Input + Send,
    A: AnalogChannel + Send,
    D: Delay + Send,
    P: Power + Send,
    Dr: Drain + Send,
{
    fn has_power(&self) -> bool {
        self.power.is_some()
    }

    fn power_on(&mut self) {
        if let Some(power) = self.power.as_mut() {
            if let Err(e) = power.enable() {
                log::warn!("matrix power rail failed to enable: {e:?}");
            }
        }
    }

    fn power_off(&mut self) {
        if let Some(power) = self.power.as_mut() {
            if let Err(e) = power.disable() {
                log::warn!("matrix power rail failed to disable: {e:?}");
            }
        }
    }

    fn warm_up(&mut self, us: u32) {
        self.delay.busy_wait_us(us);
    }

    fn read_raw(&mut self, strobe: usize, input: usize) -> u16 {
        let started = Instant::now();

        if let Err(e) = self.inputs[input].connect() {
            log::warn!("input {input} failed to connect: {e:?}");
        }
        self.delay.busy_wait_us(self.timing.matrix_relax_us);
        let after_setup = Instant::now();

        let fake_open_drain = self.timing.fake_open_drain;
        let sample = critical_section::with(|_cs| {
            if let Some(drain) = self.drain.as_mut() {
                if let Err(e) = drain.release(fake_open_drain) {
                    log::warn!("drain failed to release: {e:?}");
                }
            }
            if let Err(e) = self.strobes[strobe].assert() {
                log::warn!("strobe {strobe} failed to assert: {e:?}");
            }
            self.delay.busy_wait_us(self.timing.adc_read_settle_us);
            self.adc.sample()
        });
        let after_locked = Instant::now();

        if let Err(e) = self.strobes[strobe].deassert() {
            log::warn!("strobe {strobe} failed to deassert: {e:?}");
        }
        if let Some(drain) = self.drain.as_mut() {
            if let Err(e) = drain.engage(fake_open_drain) {
                log::warn!("drain failed to engage: {e:?}");
            }
        }
        if let Err(e) = self.inputs[input].disconnect() {
            log::warn!("input {input} failed to disconnect: {e:?}");
        }
        let finished = Instant::now();

        match sample {
            Ok(v) => self.last_raw = v,
            Err(e) => log::warn!("adc sample at ({strobe}, {input}) failed: {e:?}"),
        }

        self.last_timing = ReadTiming {
            input_setup_ns: after_setup.duration_since(started).as_nanos() as u64,
            locked_region_ns: after_locked.duration_since(after_setup).as_nanos() as u64,
            total_ns: finished.duration_since(started).as_nanos() as u64,
        };
        self.max_scan_duration_ns = self.max_scan_duration_ns.max(self.last_timing.total_ns);

        self.last_raw
    }

    fn self_calibrate_adc(&mut self) -> Result<(), &'static str> {
        self.adc.self_calibrate().map_err(|e| {
            log::error!("adc self-calibration failed: {e:?}");
            "adc self-calibration failed"
        })
    }

    fn last_read_timing(&self) -> ReadTiming {
        self.last_timing
    }

    fn max_scan_duration_ns(&self) -> u64 {
        self.max_scan_duration_ns
    }
}

/// Host-side [`Delay`] implementation: a spin-loop busy-wait for
/// microsecond precision and `std::thread::sleep` for millisecond
/// cooperative sleeps. The direct mapping for a hosted build; embedded
/// backends use their own timer peripheral via the `embedded-hal` blanket
/// impl instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn busy_wait_us(&mut self, us: u32) {
        let deadline = Instant::now() + Duration::from_micros(us as u64);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    fn sleep_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}
