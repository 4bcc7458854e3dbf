mod history;

pub use history::{ChartSnapshot, HistoryBuffer};

use embassy_time::Duration;

/// Wall-clock span covered by the pressure chart
pub const CHART_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);

/// Chart width in pixels; one stored sample per pixel column
pub const PRESSURE_HISTORY_CAPACITY: usize = 230;

/// Initial pressure chart scale in mmHg
pub const PRESSURE_CHART_MIN: f32 = 730.0;
pub const PRESSURE_CHART_MAX: f32 = 750.0;

pub type PressureHistory = HistoryBuffer<PRESSURE_HISTORY_CAPACITY>;

/// Empty pressure history seeded with the default chart scale.
pub fn pressure_history() -> PressureHistory {
    PressureHistory::new().with_initial_range(PRESSURE_CHART_MIN, PRESSURE_CHART_MAX)
}
