use serde::Deserialize;

use super::{Clouds, Precipitation, WeatherError, Wind, precipitation};

/// hPa in one mmHg; the API reports hPa, the station shows mmHg
pub const HPA_PER_MMHG: f32 = 1.333_223_9;

/// Parsed current-conditions document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentConditions {
    /// Observation time, Unix seconds (UTC)
    pub observed_at: i64,
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
    pub pressure_mmhg: f32,
    pub precipitation_mm: f32,
    pub wind_speed: Option<f32>,
    pub wind_direction_deg: Option<f32>,
    pub cloud_cover_percent: Option<f32>,
}

#[derive(Deserialize, Debug)]
struct Document {
    dt: Option<i64>,
    main: Option<Main>,
    #[serde(default)]
    wind: Wind,
    #[serde(default)]
    clouds: Clouds,
    rain: Option<Precipitation>,
    snow: Option<Precipitation>,
}

#[derive(Deserialize, Debug)]
struct Main {
    temp: Option<f32>,
    humidity: Option<f32>,
    pressure: Option<f32>,
}

/// Parse a current-conditions response body.
///
/// The observation time and the temperature, humidity and pressure block are
/// required; wind and cloud cover may be absent.
pub fn parse_current(body: &[u8]) -> Result<CurrentConditions, WeatherError> {
    let doc: Document = serde_json::from_slice(body).map_err(|_| WeatherError::Parse)?;

    let observed_at = doc.dt.ok_or(WeatherError::Incomplete { field: "dt" })?;
    let main = doc.main.ok_or(WeatherError::Incomplete { field: "main" })?;
    let temperature = main.temp.ok_or(WeatherError::Incomplete { field: "main.temp" })?;
    let humidity = main
        .humidity
        .ok_or(WeatherError::Incomplete { field: "main.humidity" })?;
    let pressure_hpa = main
        .pressure
        .ok_or(WeatherError::Incomplete { field: "main.pressure" })?;

    Ok(CurrentConditions {
        observed_at,
        temperature_celsius: temperature,
        humidity_percent: humidity,
        pressure_mmhg: pressure_hpa / HPA_PER_MMHG,
        precipitation_mm: precipitation(doc.rain.as_ref(), doc.snow.as_ref()),
        wind_speed: doc.wind.speed,
        wind_direction_deg: doc.wind.deg,
        cloud_cover_percent: doc.clouds.all,
    })
}
