// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Small seam traits the single-cell read sequence is built from.
//!
//! Each trait names exactly the operation the sequence needs rather than
//! exposing a whole pin. Blanket implementations cover anything already
//! implementing the matching `embedded-hal` 0.2 trait, so a real embedded
//! backend plugs in without adapter code; [`crate::testing::SimulatedGateway`]
//! implements these directly with no hardware crate at all.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::OutputPin;

/// A row line, energised to induce charge on the currently connected column.
pub trait Strobe {
    type Error: core::fmt::Debug;
    fn assert(&mut self) -> Result<(), Self::Error>;
    fn deassert(&mut self) -> Result<(), Self::Error>;
}

impl<T: OutputPin> Strobe for T {
    type Error = T::Error;
    fn assert(&mut self) -> Result<(), Self::Error> {
        self.set_high()
    }
    fn deassert(&mut self) -> Result<(), Self::Error> {
        self.set_low()
    }
}

/// The optional matrix power rail.
pub trait Power {
    type Error: core::fmt::Debug;
    fn enable(&mut self) -> Result<(), Self::Error>;
    fn disable(&mut self) -> Result<(), Self::Error>;
}

/// A column drain, reconfigured between the locked window and idle time to
/// bound stray capacitance. `fake_open_drain` decides whether "release"
/// means setting the line high or reconfiguring it as an input.
pub trait Drain {
    type Error: core::fmt::Debug;
    fn release(&mut self, fake_open_drain: bool) -> Result<(), Self::Error>;
    fn engage(&mut self, fake_open_drain: bool) -> Result<(), Self::Error>;
}

/// A single input (column sense) line.
pub trait Input {
    type Error: core::fmt::Debug;
    /// Configure as high-impedance input, ready to be sensed.
    fn connect(&mut self) -> Result<(), Self::Error>;
    /// Disconnect (high-Z, no pull) to avoid ghosting on adjacent columns.
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}

/// A single-shot analog channel bound to one ADC.
pub trait AnalogChannel {
    type Error: core::fmt::Debug;
    fn sample(&mut self) -> Result<u16, Self::Error>;
    /// One-shot ADC self-calibration, run at init unless startup
    /// calibration is skipped. Default no-op for channels that don't
    /// support it.
    fn self_calibrate(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Microsecond busy-waits and millisecond cooperative sleeps, as used by the
/// read sequence and the sampler respectively.
pub trait Delay {
    fn busy_wait_us(&mut self, us: u32);
    fn sleep_ms(&mut self, ms: u32);
}

impl<T> Delay for T
where
    T: DelayUs<u32> + DelayMs<u32>,
{
    fn busy_wait_us(&mut self, us: u32) {
        self.delay_us(us)
    }
    fn sleep_ms(&mut self, ms: u32) {
        self.delay_ms(ms)
    }
}

/// A plain GPIO output doubling as the power rail: active-low or
/// active-high is the implementer's concern, `enable`/`disable` name the
/// logical state only.
impl<T: OutputPin> Power for T {
    type Error = T::Error;
    fn enable(&mut self) -> Result<(), Self::Error> {
        self.set_high()
    }
    fn disable(&mut self) -> Result<(), Self::Error> {
        self.set_low()
    }
}

/// `Input` and `Drain` are not blanket-implemented: reconfiguring a pin
/// between input and output direction is not expressible generically over
/// `embedded-hal` 0.2's split pin traits (the keyscanning teacher crate
/// hits the same wall and resolves it with `IoPin`, which is concrete-board
/// specific in the same way). Boards implement both directly.
