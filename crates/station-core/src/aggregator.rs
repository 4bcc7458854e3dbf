//! Data aggregation
//!
//! The [`DataAggregator`] owns every smoothed metric, the pressure history
//! and one [`PeriodicTrigger`] per data source. Each scheduling pass it
//! samples whichever sources are due, folds the results into the data model
//! and remembers which screen sections have new data, so
//! [`DataAggregator::present`] only redraws those.

use core::fmt::Write;

use embassy_time::{Duration, Instant};
use heapless::String;
use log::{debug, info, warn};

use crate::config::{OutdoorSource, StationConfig, WeatherConfig};
use crate::display::{AgeUnit, Backlight, Font, ForecastColumn, Renderer, Slot};
use crate::network::{BusInbox, BusMessage, RemoteTopic};
use crate::sensors::{LocalSensors, SensorError, SmoothedValue};
use crate::storage::{PressureHistory, pressure_history};
use crate::trigger::{PeriodicTrigger, TriggerState};
use crate::weather::{
    self, CurrentConditions, Forecast, ForecastPoint, WEATHER_HOST, WeatherClient, WeatherError,
};

/// How often each source is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadences {
    pub local_sensors: Duration,
    pub bus_drain: Duration,
    pub current_conditions: Duration,
    pub forecast: Duration,
    /// Delay before retrying a failed weather fetch
    pub weather_retry: Duration,
}

impl Default for Cadences {
    fn default() -> Self {
        Self {
            local_sensors: Duration::from_secs(1),
            bus_drain: Duration::from_millis(250),
            current_conditions: Duration::from_secs(60),
            forecast: Duration::from_secs(15 * 60),
            weather_retry: Duration::from_secs(10),
        }
    }
}

/// Screen sections holding data that has not been drawn yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub local: bool,
    pub remote: bool,
    pub current: bool,
    pub forecast: bool,
}

impl Readiness {
    pub fn any(&self) -> bool {
        self.local || self.remote || self.current || self.forecast
    }
}

pub struct DataAggregator {
    cadences: Cadences,
    local_trigger: PeriodicTrigger,
    bus_trigger: PeriodicTrigger,
    current_trigger: PeriodicTrigger,
    forecast_trigger: PeriodicTrigger,

    indoor_temperature: SmoothedValue,
    indoor_humidity: SmoothedValue,
    light: SmoothedValue,

    outdoor_temperature: SmoothedValue,
    outdoor_humidity: SmoothedValue,
    outdoor_pressure: SmoothedValue,
    pressure_history: PressureHistory,
    remote_error: Option<i32>,

    precipitation: SmoothedValue,
    wind_speed: SmoothedValue,
    wind_direction: SmoothedValue,
    cloud_cover: SmoothedValue,
    observed_at: Option<i64>,
    forecast: Option<Forecast>,

    inbox: BusInbox,

    last_local: Option<Instant>,
    last_remote: Option<Instant>,
    last_current: Option<Instant>,
    last_forecast: Option<Instant>,
    ready: Readiness,

    backlight: Option<Backlight>,
    pending_backlight: Option<Backlight>,

    outdoor_source: OutdoorSource,
    brightness_setpoint: u16,
    weather: WeatherConfig,
}

impl DataAggregator {
    /// Every trigger starts already elapsed so the first pass samples all
    /// sources.
    pub fn new(config: &StationConfig, cadences: Cadences) -> Self {
        Self {
            cadences,
            local_trigger: PeriodicTrigger::new(cadences.local_sensors, TriggerState::Started),
            bus_trigger: PeriodicTrigger::new(cadences.bus_drain, TriggerState::Started),
            current_trigger: PeriodicTrigger::new(cadences.current_conditions, TriggerState::Started),
            forecast_trigger: PeriodicTrigger::new(cadences.forecast, TriggerState::Started),
            indoor_temperature: SmoothedValue::new(),
            indoor_humidity: SmoothedValue::new(),
            light: SmoothedValue::new(),
            outdoor_temperature: SmoothedValue::new(),
            outdoor_humidity: SmoothedValue::new(),
            outdoor_pressure: SmoothedValue::new(),
            pressure_history: pressure_history(),
            remote_error: None,
            precipitation: SmoothedValue::new(),
            wind_speed: SmoothedValue::new(),
            wind_direction: SmoothedValue::new(),
            cloud_cover: SmoothedValue::new(),
            observed_at: None,
            forecast: None,
            inbox: BusInbox::new(),
            last_local: None,
            last_remote: None,
            last_current: None,
            last_forecast: None,
            ready: Readiness::default(),
            backlight: None,
            pending_backlight: None,
            outdoor_source: config.outdoor_source,
            brightness_setpoint: config.display.brightness_setpoint,
            weather: config.weather.clone(),
        }
    }

    /// Arm all triggers.
    pub fn start(&mut self, now: Instant) {
        self.local_trigger.start(now);
        self.bus_trigger.start(now);
        self.current_trigger.start(now);
        self.forecast_trigger.start(now);
    }

    /// Take the non-network settings of a new configuration.
    ///
    /// Smoothed values and history are kept.
    pub fn apply_config(&mut self, config: &StationConfig) {
        if self.outdoor_source != config.outdoor_source {
            info!("Outdoor values now come from {:?}", config.outdoor_source);
        }
        self.outdoor_source = config.outdoor_source;
        self.brightness_setpoint = config.display.brightness_setpoint;
        self.weather = config.weather.clone();
        // Re-evaluate the backlight on the next light reading.
        self.backlight = None;
    }

    /// Queue filled by the message-bus transport.
    pub fn inbox(&self) -> &BusInbox {
        &self.inbox
    }

    /// Advance every trigger to `now`.
    pub fn tick(&mut self, now: Instant) {
        self.local_trigger.poll(now);
        self.bus_trigger.poll(now);
        self.current_trigger.poll(now);
        self.forecast_trigger.poll(now);
    }

    /// Sample the local sensors if their cadence elapsed.
    ///
    /// Returns whether the indoor values changed. A failed climate read
    /// leaves the previous values alone and is retried on the next pass. The
    /// light level is independent: a failed light read only skips the
    /// backlight update until the next period.
    pub fn poll_local<S>(&mut self, now: Instant, sensors: &mut S) -> Result<bool, SensorError>
    where
        S: LocalSensors + ?Sized,
    {
        if !self.local_trigger.is_elapsed() {
            return Ok(false);
        }

        let reading = sensors.read_climate().inspect_err(|e| {
            warn!("Local climate read failed: {}", e);
            self.local_trigger.reset(TriggerState::Started);
        })?;
        let temperature = self.indoor_temperature.update(reading.temperature_celsius);
        let humidity = self.indoor_humidity.update(reading.humidity_percent);
        let accepted = temperature || humidity;
        if accepted {
            self.ready.local = true;
            self.last_local = Some(now);
            debug!(
                "Indoor: {} C, {} %",
                reading.temperature_celsius, reading.humidity_percent
            );
        } else {
            warn!(
                "Discarding indoor reading {} C, {} %",
                reading.temperature_celsius, reading.humidity_percent
            );
        }

        match sensors.read_light_level() {
            Ok(level) => {
                if self.light.update(f32::from(level)) {
                    self.update_backlight();
                }
            }
            Err(e) => warn!("Light level read failed: {}", e),
        }

        Ok(accepted)
    }

    fn update_backlight(&mut self) {
        let Some(level) = self.light.current() else {
            return;
        };
        let backlight = Backlight::for_light_level(level, self.brightness_setpoint);
        if self.backlight != Some(backlight) {
            debug!("Backlight {:?} at light level {}", backlight, level);
            self.backlight = Some(backlight);
            self.pending_backlight = Some(backlight);
        }
    }

    /// Apply every queued bus message if the drain cadence elapsed.
    ///
    /// Returns the number of messages that changed the data model.
    pub fn drain_bus(&mut self, now: Instant) -> usize {
        if !self.bus_trigger.is_elapsed() {
            return 0;
        }

        let mut applied = 0;
        while let Some(message) = self.inbox.take() {
            if self.apply_remote(&message, now) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_remote(&mut self, message: &BusMessage, now: Instant) -> bool {
        let topic = message.topic.topic();

        if message.topic == RemoteTopic::SensorError {
            let Some(code) = message.parse_i32() else {
                warn!("Malformed error code on {}", topic);
                return false;
            };
            if self.remote_error != Some(code) {
                info!("Remote sensor error code {}", code);
            }
            self.remote_error = Some(code);
            self.mark_remote(now);
            return true;
        }

        if self.outdoor_source != OutdoorSource::RemoteFeed {
            debug!("Ignoring {}, outdoor values come from the weather API", topic);
            return false;
        }
        let Some(value) = message.parse_f32() else {
            warn!("Malformed payload on {}", topic);
            return false;
        };

        let accepted = match message.topic {
            RemoteTopic::OutdoorTemperature => self.outdoor_temperature.update(value),
            RemoteTopic::OutdoorHumidity => self.outdoor_humidity.update(value),
            RemoteTopic::OutdoorPressure => self.update_pressure(value, now),
            // Handled above.
            RemoteTopic::SensorError => false,
        };
        if accepted {
            debug!("{} = {}", topic, value);
            self.mark_remote(now);
        }
        accepted
    }

    fn update_pressure(&mut self, mmhg: f32, now: Instant) -> bool {
        if !self.outdoor_pressure.update(mmhg) {
            return false;
        }
        if self.pressure_history.append(mmhg, now) {
            debug!("Pressure history: {} samples", self.pressure_history.len());
        }
        true
    }

    fn mark_remote(&mut self, now: Instant) {
        self.ready.remote = true;
        self.last_remote = Some(now);
    }

    /// Fetch current conditions and forecast when their cadences elapsed.
    ///
    /// Both fetches are attempted; a failed one is retried after the short
    /// retry delay and the first failure is returned.
    pub fn poll_weather<C>(&mut self, now: Instant, client: &mut C) -> Result<(), WeatherError>
    where
        C: WeatherClient + ?Sized,
    {
        let mut result = Ok(());

        if self.current_trigger.is_elapsed() {
            if let Err(e) = self.fetch_current(now, client) {
                warn!("Current conditions update failed: {}", e);
                self.current_trigger.reschedule(now, self.cadences.weather_retry);
                result = Err(e);
            }
        }

        if self.forecast_trigger.is_elapsed() {
            if let Err(e) = self.fetch_forecast(now, client) {
                warn!("Forecast update failed: {}", e);
                self.forecast_trigger.reschedule(now, self.cadences.weather_retry);
                result = result.and(Err(e));
            }
        }

        result
    }

    fn fetch_current<C>(&mut self, now: Instant, client: &mut C) -> Result<(), WeatherError>
    where
        C: WeatherClient + ?Sized,
    {
        let body = client.get(WEATHER_HOST, &weather::current_path(&self.weather))?;
        let current = weather::parse_current(&body)?;
        self.apply_current(&current, now);
        Ok(())
    }

    fn apply_current(&mut self, current: &CurrentConditions, now: Instant) {
        info!(
            "Current conditions at {}: {} C, {} mmHg",
            current.observed_at, current.temperature_celsius, current.pressure_mmhg
        );
        self.observed_at = Some(current.observed_at);
        self.precipitation.update(current.precipitation_mm);
        self.wind_speed.update(current.wind_speed.unwrap_or(f32::NAN));
        self.wind_direction
            .update(current.wind_direction_deg.unwrap_or(f32::NAN));
        self.cloud_cover
            .update(current.cloud_cover_percent.unwrap_or(f32::NAN));

        if self.outdoor_source == OutdoorSource::WeatherApi {
            self.outdoor_temperature.update(current.temperature_celsius);
            self.outdoor_humidity.update(current.humidity_percent);
            self.update_pressure(current.pressure_mmhg, now);
            self.mark_remote(now);
        }

        self.ready.current = true;
        self.last_current = Some(now);
    }

    fn fetch_forecast<C>(&mut self, now: Instant, client: &mut C) -> Result<(), WeatherError>
    where
        C: WeatherClient + ?Sized,
    {
        // Checkpoints are relative to the latest observation.
        if self.observed_at.is_none() {
            return Err(WeatherError::NoObservationTime);
        }
        let body = client.get(WEATHER_HOST, &weather::forecast_path(&self.weather))?;
        let forecast =
            weather::parse_forecast(&body, self.observed_at, self.weather.utc_offset_secs)?;
        info!(
            "Forecast updated for {} and {}",
            forecast.midday.at, forecast.evening.at
        );
        self.forecast = Some(forecast);
        self.ready.forecast = true;
        self.last_forecast = Some(now);
        Ok(())
    }

    /// Draw the sections with new data, then the data ages.
    ///
    /// Returns the sections that were drawn.
    pub fn present<R>(&mut self, now: Instant, renderer: &mut R) -> Readiness
    where
        R: Renderer + ?Sized,
    {
        if let Some(level) = self.pending_backlight.take() {
            renderer.set_backlight(level);
        }

        let ready = core::mem::take(&mut self.ready);

        if ready.local {
            renderer.set_font(Font::Large);
            draw_with_arrow(renderer, &self.indoor_temperature, Slot::IndoorTemperature, true);
            draw_with_arrow(renderer, &self.indoor_humidity, Slot::IndoorHumidity, false);
        }

        if ready.remote {
            renderer.set_font(Font::Large);
            draw_with_arrow(renderer, &self.outdoor_temperature, Slot::OutdoorTemperature, true);
            draw_with_arrow(renderer, &self.outdoor_humidity, Slot::OutdoorHumidity, false);
            draw_with_arrow(renderer, &self.outdoor_pressure, Slot::OutdoorPressure, false);
            if self.outdoor_pressure.is_valid() {
                if let Some(chart) = self.pressure_history.snapshot() {
                    renderer.draw_chart(chart);
                }
            }
            if let Some(code) = self.remote_error {
                renderer.set_font(Font::Small);
                renderer.draw_number(code as f32, Slot::RemoteError, false, 0);
            }
        }

        if ready.current {
            renderer.set_font(Font::Small);
            if let Some(observed_at) = self.observed_at {
                let mut text: String<8> = String::new();
                if write_time_of_day(&mut text, observed_at, self.weather.utc_offset_secs).is_ok() {
                    renderer.draw_text(&text, Slot::ObservationTime);
                }
            }
            if let Some(mm) = self.precipitation.current() {
                renderer.draw_number(mm, Slot::Precipitation, false, 2);
            }
            if let Some(speed) = self.wind_speed.current() {
                renderer.draw_number(speed, Slot::WindSpeed, false, 0);
            }
            if let Some(deg) = self.wind_direction.current() {
                renderer.draw_wind(deg, Slot::WindDirection);
            }
        }

        if ready.forecast {
            if let Some(forecast) = self.forecast {
                renderer.set_font(Font::Small);
                draw_forecast(renderer, &forecast.midday, ForecastColumn::Midday);
                draw_forecast(renderer, &forecast.evening, ForecastColumn::Evening);
            }
        }

        renderer.set_font(Font::Small);
        renderer.draw_age(age(now, self.last_local, 1), AgeUnit::Seconds, Slot::LocalAge);
        renderer.draw_age(age(now, self.last_remote, 1), AgeUnit::Seconds, Slot::RemoteAge);
        renderer.draw_age(age(now, self.last_current, 1), AgeUnit::Seconds, Slot::CurrentAge);
        renderer.draw_age(age(now, self.last_forecast, 60), AgeUnit::Minutes, Slot::ForecastAge);

        ready
    }

    pub fn readiness(&self) -> Readiness {
        self.ready
    }

    pub fn indoor_temperature(&self) -> &SmoothedValue {
        &self.indoor_temperature
    }

    pub fn indoor_humidity(&self) -> &SmoothedValue {
        &self.indoor_humidity
    }

    pub fn light(&self) -> &SmoothedValue {
        &self.light
    }

    pub fn outdoor_temperature(&self) -> &SmoothedValue {
        &self.outdoor_temperature
    }

    pub fn outdoor_humidity(&self) -> &SmoothedValue {
        &self.outdoor_humidity
    }

    /// Outdoor pressure in mmHg
    pub fn outdoor_pressure(&self) -> &SmoothedValue {
        &self.outdoor_pressure
    }

    pub fn pressure_history(&self) -> &PressureHistory {
        &self.pressure_history
    }

    pub fn remote_error(&self) -> Option<i32> {
        self.remote_error
    }

    pub fn precipitation(&self) -> &SmoothedValue {
        &self.precipitation
    }

    pub fn wind_speed(&self) -> &SmoothedValue {
        &self.wind_speed
    }

    pub fn wind_direction(&self) -> &SmoothedValue {
        &self.wind_direction
    }

    pub fn cloud_cover(&self) -> &SmoothedValue {
        &self.cloud_cover
    }

    /// Timestamp of the latest current-conditions document, Unix seconds
    pub fn observed_at(&self) -> Option<i64> {
        self.observed_at
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        self.forecast.as_ref()
    }

    pub fn backlight(&self) -> Option<Backlight> {
        self.backlight
    }
}

fn draw_with_arrow<R>(renderer: &mut R, metric: &SmoothedValue, slot: Slot, signed: bool)
where
    R: Renderer + ?Sized,
{
    let Some(value) = metric.current() else {
        return;
    };
    renderer.draw_number(value, slot, signed, 0);
    if let Some(trend) = metric.trend() {
        renderer.draw_arrow(value, trend, slot);
    }
}

fn draw_forecast<R>(renderer: &mut R, point: &ForecastPoint, column: ForecastColumn)
where
    R: Renderer + ?Sized,
{
    if let Some(t) = point.temperature_celsius {
        renderer.draw_number(t, Slot::ForecastTemperature(column), true, 0);
    }
    if let Some(clouds) = point.cloud_cover_percent {
        renderer.draw_number(clouds, Slot::ForecastClouds(column), false, 0);
    }
    renderer.draw_number(point.precipitation_mm, Slot::ForecastPrecipitation(column), false, 2);
    if let Some(speed) = point.wind_speed {
        renderer.draw_number(speed, Slot::ForecastWindSpeed(column), false, 0);
    }
    if let Some(deg) = point.wind_direction_deg {
        renderer.draw_wind(deg, Slot::ForecastWindDirection(column));
    }
}

/// Whole `unit_secs` elapsed since `since`
fn age(now: Instant, since: Option<Instant>, unit_secs: u64) -> Option<u32> {
    let elapsed = now.saturating_duration_since(since?).as_secs() / unit_secs;
    Some(u32::try_from(elapsed).unwrap_or(u32::MAX))
}

/// `HH:MM:SS` of a Unix timestamp at a fixed UTC offset
fn write_time_of_day<W: Write>(out: &mut W, timestamp: i64, utc_offset_secs: i32) -> core::fmt::Result {
    let secs = (timestamp + i64::from(utc_offset_secs)).rem_euclid(24 * 60 * 60);
    write!(
        out,
        "{:02}:{:02}:{:02}",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    )
}
