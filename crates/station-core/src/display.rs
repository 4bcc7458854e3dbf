//! Renderer interface
//!
//! Pixel work happens outside the core. The core decides *what* to show and
//! addresses the renderer by named [`Slot`]s; the renderer maps slots to
//! screen positions and glyphs.

use crate::storage::ChartSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backlight {
    Dim,
    Bright,
}

impl Backlight {
    /// Bright at or above the configured setpoint.
    pub fn for_light_level(level: f32, setpoint: u16) -> Self {
        if level >= f32::from(setpoint) {
            Backlight::Bright
        } else {
            Backlight::Dim
        }
    }
}

/// Which forecast column a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastColumn {
    Midday,
    Evening,
}

/// Named screen positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    IndoorTemperature,
    IndoorHumidity,
    OutdoorTemperature,
    OutdoorHumidity,
    OutdoorPressure,
    RemoteError,
    Precipitation,
    WindSpeed,
    WindDirection,
    ForecastTemperature(ForecastColumn),
    ForecastClouds(ForecastColumn),
    ForecastPrecipitation(ForecastColumn),
    ForecastWindSpeed(ForecastColumn),
    ForecastWindDirection(ForecastColumn),
    ObservationTime,
    LocalAge,
    RemoteAge,
    CurrentAge,
    ForecastAge,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Seconds,
    Minutes,
}

/// Drawing capability consumed by the station.
pub trait Renderer {
    fn set_font(&mut self, font: Font);

    /// Draw `value` with `precision` decimals, with an explicit sign when
    /// `signed` is set.
    fn draw_number(&mut self, value: f32, slot: Slot, signed: bool, precision: u8);

    /// Rising/falling indicator comparing `value` with its running average.
    fn draw_arrow(&mut self, value: f32, trend: f32, slot: Slot);

    /// Wind vector pointing from `degrees` (meteorological convention).
    fn draw_wind(&mut self, degrees: f32, slot: Slot);

    fn draw_chart(&mut self, chart: ChartSnapshot<'_>);

    fn draw_text(&mut self, text: &str, slot: Slot);

    /// Age of a data section; `None` when the section never updated.
    fn draw_age(&mut self, age: Option<u32>, unit: AgeUnit, slot: Slot);

    fn set_backlight(&mut self, level: Backlight);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlight_follows_setpoint() {
        assert_eq!(Backlight::for_light_level(99.0, 100), Backlight::Dim);
        assert_eq!(Backlight::for_light_level(100.0, 100), Backlight::Bright);
        assert_eq!(Backlight::for_light_level(4000.0, 100), Backlight::Bright);
    }
}
