//! Weather-API polling
//!
//! Two request shapes against a fixed host: current conditions and an
//! N-point forecast. The HTTP transport is external; the core builds the
//! request path, hands it to a [`WeatherClient`] and parses the body.

extern crate alloc;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;
use thiserror_no_std::Error;

use crate::config::WeatherConfig;

mod current;
mod forecast;

pub use current::{CurrentConditions, HPA_PER_MMHG, parse_current};
pub use forecast::{Checkpoints, Forecast, ForecastPoint, find_checkpoints, parse_forecast};

pub const WEATHER_HOST: &str = "api.openweathermap.org";

/// Forecast entries requested per fetch (3-hour steps, a bit over two days)
pub const FORECAST_ENTRIES: u8 = 17;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherError {
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("transport failure")]
    Transport,
    #[error("response is not a valid document")]
    Parse,
    #[error("response is missing {field}")]
    Incomplete { field: &'static str },
    #[error("no observation time known yet")]
    NoObservationTime,
    #[error("forecast checkpoints not found")]
    CheckpointsMissing,
}

/// Plain HTTP GET against the weather host.
pub trait WeatherClient {
    /// Fetch `path` from `host`, returning the body of a 200 response.
    fn get(&mut self, host: &str, path: &str) -> Result<Vec<u8>, WeatherError>;
}

pub fn current_path(config: &WeatherConfig) -> String {
    format!(
        "/data/2.5/weather?q={}&units=metric&APPID={}",
        config.location, config.app_id
    )
}

pub fn forecast_path(config: &WeatherConfig) -> String {
    format!(
        "/data/2.5/forecast?q={}&units=metric&cnt={}&APPID={}",
        config.location, FORECAST_ENTRIES, config.app_id
    )
}

// Blocks shared by both document shapes.

#[derive(Deserialize, Debug, Default)]
struct Clouds {
    all: Option<f32>,
}

#[derive(Deserialize, Debug, Default)]
struct Wind {
    speed: Option<f32>,
    deg: Option<f32>,
}

#[derive(Deserialize, Debug, Default)]
struct Precipitation {
    #[serde(rename = "3h")]
    three_hours: Option<f32>,
}

/// Rain amount if any fell, snow otherwise.
fn precipitation(rain: Option<&Precipitation>, snow: Option<&Precipitation>) -> f32 {
    let rain = rain.and_then(|r| r.three_hours).unwrap_or(0.0);
    if rain != 0.0 {
        return rain;
    }
    snow.and_then(|s| s.three_hours).unwrap_or(0.0)
}
