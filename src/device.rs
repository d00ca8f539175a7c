// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Lifecycle & coordinator: init, enable/disable gating, power-management
//! hooks, and the mutex discipline the rest of the crate runs under
//! (SPEC_FULL.md §4.7, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::calibration::{run_calibration, CalibrationEntry, CalibrationTable};
use crate::callbacks::{CalibrationEventSink, KeyEventSink};
use crate::config::{DeviceConfig, Geometry};
use crate::error::{KscanError, Result};
use crate::gateway::{HardwareGateway, ReadTiming, StdDelay};
use crate::scan::run_sweep;

/// Power-management bridge (SPEC_FULL.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmAction {
    Suspend,
    Resume,
}

/// State owned by the scan thread, behind the single device mutex.
pub(crate) struct Guarded<G, DL> {
    pub(crate) gateway: G,
    pub(crate) delay: DL,
    pub(crate) calibration: CalibrationTable,
    pub(crate) matrix_state: Vec<u64>,
    pub(crate) reported_matrix_state: Vec<u64>,
    pub(crate) key_sink: Option<Box<dyn KeyEventSink>>,
    pub(crate) calibration_sink: Option<Box<dyn CalibrationEventSink>>,
    pub(crate) enabled: bool,
    pub(crate) poll_interval_ms: u32,
    pub(crate) last_release_ms: u64,
    start: Instant,
}

impl<G, DL> Guarded<G, DL> {
    pub(crate) fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(gateway: G, calibration: CalibrationTable, strobes: usize) -> Self
    where
        DL: Default,
    {
        Self {
            gateway,
            delay: DL::default(),
            calibration,
            matrix_state: vec![0u64; strobes],
            reported_matrix_state: vec![0u64; strobes],
            key_sink: None,
            calibration_sink: None,
            enabled: true,
            poll_interval_ms: 1,
            last_release_ms: 0,
            start: Instant::now(),
        }
    }
}

/// A single EC key-matrix device instance: owns a background scan thread
/// and the mutex that gates it.
pub struct EcMatrix<G: HardwareGateway + 'static> {
    inner: Arc<Mutex<Guarded<G, StdDelay>>>,
    geometry: Geometry,
    config: DeviceConfig,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<G: HardwareGateway + 'static> EcMatrix<G> {
    /// Validate `config`, seed the calibration table, and spawn the scan
    /// thread gated (not yet running scans) until [`EcMatrix::enable`] is
    /// called.
    pub fn new(mut gateway: G, config: DeviceConfig) -> Result<Self> {
        let geometry = config.validate()?;

        let calibration = if config.calibration_seed.skip_startup_calibration {
            CalibrationTable::from_precalibrated(&geometry, &config.calibration_seed)?
        } else {
            gateway.self_calibrate_adc().map_err(|e| {
                log::error!("adc self-calibration failed during init: {e}");
                KscanError::HardwareInit(e)
            })?;
            CalibrationTable::empty(&geometry)
        };

        let mut guarded = Guarded {
            gateway,
            delay: StdDelay,
            calibration,
            matrix_state: vec![0u64; geometry.strobes],
            reported_matrix_state: vec![0u64; geometry.strobes],
            key_sink: None,
            calibration_sink: None,
            enabled: false,
            poll_interval_ms: config.cadence.active_polling_interval_ms,
            last_release_ms: 0,
            start: Instant::now(),
        };
        guarded.last_release_ms = guarded.now_ms();

        let inner = Arc::new(Mutex::new(guarded));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_inner = inner.clone();
        let thread_shutdown = shutdown.clone();
        let thread_geometry = geometry.clone();
        let thread_config = config.clone();

        let handle = std::thread::Builder::new()
            .name("ec-kscan".into())
            .spawn(move || thread_main(thread_inner, thread_shutdown, thread_geometry, thread_config))
            .expect("failed to spawn scan thread");

        log::info!("ec matrix initialised: {} strobes x {} inputs", geometry.strobes, geometry.inputs);
        Ok(Self { inner, geometry, config, shutdown, thread: Some(handle) })
    }

    /// Register the key-event sink. Rejects a second registration; the
    /// sink is write-once from the consumer.
    pub fn configure(&self, sink: impl KeyEventSink + 'static) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.key_sink.is_some() {
            return Err(KscanError::AlreadyConfigured);
        }
        guard.key_sink = Some(Box::new(sink));
        Ok(())
    }

    /// Start (or resume) scanning: reset cadence to active and ungate the
    /// scan thread.
    pub fn enable(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.enabled = true;
        guard.poll_interval_ms = self.config.cadence.active_polling_interval_ms;
        guard.last_release_ms = guard.now_ms();
        log::info!("ec matrix enabled");
        Ok(())
    }

    /// Stop scanning. Bounded 30 ms wait, matching the original timeout for
    /// reacquiring the gate at a sweep boundary.
    pub fn disable(&self) -> Result<()> {
        match self.inner.try_lock_for(Duration::from_millis(30)) {
            Some(mut guard) => {
                guard.enabled = false;
                log::info!("ec matrix disabled");
                Ok(())
            }
            None => Err(KscanError::Busy),
        }
    }

    /// Arm a one-shot calibration run on the next sweep.
    pub fn calibrate(&self, sink: impl CalibrationEventSink + 'static) -> Result<()> {
        match self.inner.try_lock_for(Duration::from_secs(1)) {
            Some(mut guard) => {
                guard.calibration_sink = Some(Box::new(sink));
                Ok(())
            }
            None => Err(KscanError::Busy),
        }
    }

    /// Visit the calibration table under the device mutex.
    pub fn access_calibration<F: FnOnce(&[CalibrationEntry])>(&self, visitor: F) -> Result<()> {
        match self.inner.try_lock_for(Duration::from_secs(1)) {
            Some(guard) => {
                visitor(guard.calibration.entries());
                Ok(())
            }
            None => Err(KscanError::Busy),
        }
    }

    /// Worst-case single-cell read duration observed since construction.
    pub fn max_scan_duration_ns(&self) -> Result<u64> {
        match self.inner.try_lock_for(Duration::from_millis(10)) {
            Some(guard) => Ok(guard.gateway.max_scan_duration_ns()),
            None => Err(KscanError::Busy),
        }
    }

    /// Per-phase timing breakdown of the most recently completed single-cell
    /// read.
    pub fn last_read_timing(&self) -> Result<ReadTiming> {
        match self.inner.try_lock_for(Duration::from_millis(10)) {
            Some(guard) => Ok(guard.gateway.last_read_timing()),
            None => Err(KscanError::Busy),
        }
    }

    /// Power-management bridge: `Suspend` disables, `Resume` enables.
    pub fn pm_action(&self, action: PmAction) -> Result<()> {
        match action {
            PmAction::Suspend => self.disable(),
            PmAction::Resume => self.enable(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl<G: HardwareGateway + 'static> Drop for EcMatrix<G> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Thread body: acquire the gate with a bounded wait (so shutdown is always
/// observed promptly even while disabled), run one sweep or a queued
/// calibration, then sleep for the current poll interval.
fn thread_main<G: HardwareGateway>(
    inner: Arc<Mutex<Guarded<G, StdDelay>>>,
    shutdown: Arc<AtomicBool>,
    geometry: Geometry,
    config: DeviceConfig,
) {
    while !shutdown.load(Ordering::Acquire) {
        let Some(mut guard) = inner.try_lock_for(Duration::from_millis(50)) else {
            continue;
        };

        if guard.enabled {
            if let Some(mut sink) = guard.calibration_sink.take() {
                let (gateway, delay, calibration) =
                    (&mut guard.gateway, &mut guard.delay, &mut guard.calibration);
                run_calibration(gateway, delay, &geometry, &config, calibration, sink.as_mut());
            } else {
                run_sweep(&mut guard, &geometry, &config);
            }
        }

        let interval = guard.poll_interval_ms;
        drop(guard);
        std::thread::sleep(Duration::from_millis(interval as u64));
    }
}
