// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Driver for capacitive electrostatic (EC) key matrices.
//!
//! The crate is organised around three subsystems:
//!
//! - [`gateway`]: the timing-critical single-cell read sequence and the
//!   hardware seam traits it is built from.
//! - [`calibration`]: the two-phase calibrator that learns per-cell
//!   low/high baselines and noise floors.
//! - cadence ([`cadence`]) plus an internal debounced full-matrix sweep,
//!   driving the adaptive poll interval the scan thread sleeps on between
//!   sweeps.
//!
//! [`EcMatrix`] ties these together behind a single mutex and a dedicated
//! scan thread; it is the type most consumers construct. [`testing`]
//! provides a software gateway for exercising it without hardware.
//!
//! ```no_run
//! use ec_kscan_matrix::*;
//!
//! let config = DeviceConfig {
//!     geometry: GeometryConfig { strobes: 6, inputs: 18, strobe_input_masks: None },
//!     timing: TimingConfig {
//!         matrix_relax_us: 5,
//!         adc_read_settle_us: 10,
//!         matrix_warm_up_us: 500,
//!         fake_open_drain: false,
//!     },
//!     cadence: CadenceSettings {
//!         active_polling_interval_ms: 1,
//!         idle_polling_interval_ms: 5,
//!         sleep_polling_interval_ms: 50,
//!         idle_after_secs: 5,
//!         sleep_after_secs: 300,
//!         dynamic_polling_interval: true,
//!     },
//!     calibration_seed: CalibrationSeed::default(),
//!     trigger_percentage: 40,
//!     adc_resolution_bits: 12,
//! };
//!
//! let matrix = EcMatrix::new(testing::SimulatedGateway::new(), config)?;
//! matrix.configure(|strobe, input, pressed| {
//!     log::debug!("({strobe}, {input}) -> {pressed}");
//! })?;
//! matrix.enable()?;
//! # Ok::<(), KscanError>(())
//! ```

pub mod cadence;
pub mod calibration;
pub mod callbacks;
pub mod config;
mod device;
pub mod error;
pub mod gateway;
pub mod normalize;
mod sampler;
mod scan;
pub mod testing;

pub use calibration::CalibrationEntry;
pub use callbacks::{CalibrationEvent, CalibrationEventSink, KeyEventSink};
pub use config::{
    CadenceSettings, CalibrationSeed, DeviceConfig, Geometry, GeometryConfig, TimingConfig,
};
pub use device::{EcMatrix, PmAction};
pub use error::{KscanError, Result};
pub use gateway::{
    AnalogChannel, Delay, Drain, Gateway, GatewayTiming, HardwareGateway, Input, Power, ReadTiming,
    StdDelay, Strobe,
};
