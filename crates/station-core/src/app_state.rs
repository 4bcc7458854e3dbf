//! Station-wide run state and error types

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::network::{BusError, RadioError};
use crate::sensors::SensorError;
use crate::weather::WeatherError;

/// Cross-cutting pause flag, independent of the connectivity state.
///
/// Set when a firmware update starts. While paused, local sampling and
/// rendering continue but nothing may block on the network. There is no way
/// back: the flag is cleared only by restarting the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunState {
    paused: bool,
}

impl RunState {
    pub const fn new() -> Self {
        Self { paused: false }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_running(&self) -> bool {
        !self.paused
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationError {
    #[error("WiFi: {0}")]
    Wifi(RadioError),
    #[error("message bus: {0}")]
    Bus(BusError),
    #[error("weather API: {0}")]
    Weather(WeatherError),
    #[error("sensor: {0}")]
    Sensor(SensorError),
    #[error("configuration: {0}")]
    Config(ConfigError),
}

impl From<RadioError> for StationError {
    fn from(e: RadioError) -> Self {
        Self::Wifi(e)
    }
}

impl From<BusError> for StationError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<WeatherError> for StationError {
    fn from(e: WeatherError) -> Self {
        Self::Weather(e)
    }
}

impl From<SensorError> for StationError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<ConfigError> for StationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
