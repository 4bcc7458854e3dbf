//! Forecast checkpoint selection
//!
//! The station shows two forecast columns: local midday and local evening of
//! the "next interesting" day. A forecast line is used only when its
//! timestamp equals a checkpoint exactly; if either checkpoint is absent the
//! whole response is rejected.

extern crate alloc;
use alloc::vec::Vec;

use serde::Deserialize;

use super::{Clouds, Precipitation, WeatherError, Wind, precipitation};

const SECS_PER_DAY: i64 = 24 * 60 * 60;
const SECS_PER_HOUR: i64 = 60 * 60;

const MIDDAY_HOUR: i64 = 12;
const EVENING_HOUR: i64 = 18;
/// After this local hour the checkpoints move to the following day
const ROLLOVER_HOUR: i64 = 6;

/// Target timestamps (Unix seconds, UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    pub midday: i64,
    pub evening: i64,
}

impl Checkpoints {
    /// Checkpoints relative to the latest observation time.
    pub fn after(observed_at: i64, utc_offset_secs: i32) -> Self {
        let offset = i64::from(utc_offset_secs);
        let local = observed_at + offset;
        let mut day = local.div_euclid(SECS_PER_DAY);
        if local.rem_euclid(SECS_PER_DAY) / SECS_PER_HOUR > ROLLOVER_HOUR {
            day += 1;
        }
        let midnight_utc = day * SECS_PER_DAY - offset;
        Self {
            midday: midnight_utc + MIDDAY_HOUR * SECS_PER_HOUR,
            evening: midnight_utc + EVENING_HOUR * SECS_PER_HOUR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub at: i64,
    pub temperature_celsius: Option<f32>,
    pub cloud_cover_percent: Option<f32>,
    pub precipitation_mm: f32,
    pub wind_speed: Option<f32>,
    pub wind_direction_deg: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub midday: ForecastPoint,
    pub evening: ForecastPoint,
}

#[derive(Deserialize, Debug)]
struct Document {
    cnt: Option<usize>,
    list: Option<Vec<Line>>,
}

#[derive(Deserialize, Debug)]
struct Line {
    dt: i64,
    main: Option<Main>,
    #[serde(default)]
    clouds: Clouds,
    #[serde(default)]
    wind: Wind,
    rain: Option<Precipitation>,
    snow: Option<Precipitation>,
}

#[derive(Deserialize, Debug)]
struct Main {
    temp: Option<f32>,
}

impl Line {
    fn point(&self) -> ForecastPoint {
        ForecastPoint {
            at: self.dt,
            temperature_celsius: self.main.as_ref().and_then(|m| m.temp),
            cloud_cover_percent: self.clouds.all,
            precipitation_mm: precipitation(self.rain.as_ref(), self.snow.as_ref()),
            wind_speed: self.wind.speed,
            wind_direction_deg: self.wind.deg,
        }
    }
}

/// Indices of the lines matching the midday and evening checkpoints.
///
/// Fails unless both are present.
pub fn find_checkpoints<I>(timestamps: I, checkpoints: Checkpoints) -> Result<(usize, usize), WeatherError>
where
    I: IntoIterator<Item = i64>,
{
    let mut midday = None;
    let mut evening = None;
    for (index, dt) in timestamps.into_iter().enumerate() {
        if dt == checkpoints.midday {
            midday = Some(index);
        } else if dt == checkpoints.evening {
            evening = Some(index);
        }
    }
    match (midday, evening) {
        (Some(midday), Some(evening)) => Ok((midday, evening)),
        _ => Err(WeatherError::CheckpointsMissing),
    }
}

/// Parse a forecast response and pick the two checkpoint lines.
///
/// `observed_at` is the timestamp of the latest current-conditions document;
/// without it no checkpoint can be computed.
pub fn parse_forecast(
    body: &[u8],
    observed_at: Option<i64>,
    utc_offset_secs: i32,
) -> Result<Forecast, WeatherError> {
    let observed_at = observed_at.ok_or(WeatherError::NoObservationTime)?;
    let doc: Document = serde_json::from_slice(body).map_err(|_| WeatherError::Parse)?;
    let list = doc.list.ok_or(WeatherError::Incomplete { field: "list" })?;

    // Only the advertised number of lines is considered.
    let count = doc.cnt.unwrap_or(list.len());
    let lines = list
        .get(..count)
        .ok_or(WeatherError::Incomplete { field: "list" })?;

    let checkpoints = Checkpoints::after(observed_at, utc_offset_secs);
    let (midday, evening) = find_checkpoints(lines.iter().map(|line| line.dt), checkpoints)?;

    Ok(Forecast {
        midday: lines[midday].point(),
        evening: lines[evening].point(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use core::fmt::Write;

    const MOSCOW: i32 = 3 * 60 * 60;
    /// 2023-11-14 22:13:20 UTC, already 01:13 on the 15th in Moscow
    const LATE_EVENING: i64 = 1_700_000_000;
    /// 2023-11-15 00:00:00 UTC
    const NOV_15: i64 = 1_700_006_400;

    fn body(count: usize, times: &[i64]) -> String {
        let mut out = String::new();
        write!(out, r#"{{"cod": "200", "cnt": {}, "list": ["#, count).unwrap();
        for (i, dt) in times.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write!(
                out,
                r#"{{"dt": {}, "main": {{"temp": {}}}, "clouds": {{"all": {}}}, "wind": {{"speed": 2.5, "deg": 90}}, "rain": {{"3h": 0.5}}}}"#,
                dt,
                i,
                i * 10
            )
            .unwrap();
        }
        out.push_str("]}");
        out
    }

    fn three_hourly(from: i64, n: usize) -> Vec<i64> {
        (0..n as i64).map(|i| from + i * 3 * SECS_PER_HOUR).collect()
    }

    #[test]
    fn checkpoints_follow_local_day() {
        // 01:13 local: still the same local day.
        assert_eq!(
            Checkpoints::after(LATE_EVENING, MOSCOW),
            Checkpoints {
                midday: NOV_15 + 9 * SECS_PER_HOUR,
                evening: NOV_15 + 15 * SECS_PER_HOUR,
            }
        );

        // Local noon is past the rollover hour, so look at tomorrow.
        let noon = NOV_15 + 9 * SECS_PER_HOUR;
        assert_eq!(
            Checkpoints::after(noon, MOSCOW),
            Checkpoints {
                midday: noon + SECS_PER_DAY,
                evening: noon + SECS_PER_DAY + 6 * SECS_PER_HOUR,
            }
        );
    }

    #[test]
    fn picks_both_checkpoint_lines() {
        let times = three_hourly(NOV_15, 17);
        let forecast = parse_forecast(body(17, &times).as_bytes(), Some(LATE_EVENING), MOSCOW).unwrap();

        assert_eq!(forecast.midday.at, NOV_15 + 9 * SECS_PER_HOUR);
        assert_eq!(forecast.midday.temperature_celsius, Some(3.0));
        assert_eq!(forecast.midday.cloud_cover_percent, Some(30.0));
        assert_eq!(forecast.evening.temperature_celsius, Some(5.0));
        assert_eq!(forecast.evening.precipitation_mm, 0.5);
        assert_eq!(forecast.evening.wind_direction_deg, Some(90.0));
    }

    #[test]
    fn single_checkpoint_is_rejected() {
        let times: Vec<i64> = three_hourly(NOV_15, 17)
            .into_iter()
            .filter(|&t| t != NOV_15 + 15 * SECS_PER_HOUR)
            .collect();
        assert_eq!(
            parse_forecast(body(times.len(), &times).as_bytes(), Some(LATE_EVENING), MOSCOW),
            Err(WeatherError::CheckpointsMissing)
        );
    }

    #[test]
    fn lines_beyond_count_are_ignored() {
        let times = three_hourly(NOV_15, 17);
        assert_eq!(
            parse_forecast(body(4, &times).as_bytes(), Some(LATE_EVENING), MOSCOW),
            Err(WeatherError::CheckpointsMissing)
        );
        assert_eq!(
            parse_forecast(body(20, &times).as_bytes(), Some(LATE_EVENING), MOSCOW),
            Err(WeatherError::Incomplete { field: "list" })
        );
    }

    #[test]
    fn needs_an_observation_time() {
        let times = three_hourly(NOV_15, 17);
        assert_eq!(
            parse_forecast(body(17, &times).as_bytes(), None, MOSCOW),
            Err(WeatherError::NoObservationTime)
        );
    }
}
