//! Local sensor interface and per-metric smoothing
//!
//! The wire-level drivers (I2C temperature/humidity chip, analog light
//! sensor) live outside the core. They are consumed through [`LocalSensors`],
//! which only reports a raw sample or a failure.

mod smoothed;

pub use smoothed::{Arrow, SmoothedValue};

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed during {operation}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: not responding")]
    NotResponding { sensor: &'static str },
}

/// One temperature/humidity measurement from the room sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}

/// Raw access to the sensors wired to the station itself.
pub trait LocalSensors {
    /// Read the temperature/humidity chip.
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError>;

    /// Read the raw ambient light intensity.
    fn read_light_level(&mut self) -> Result<u16, SensorError>;
}
