//! Desktop simulator for the weather display station.
//!
//! Drives `station-core` against synthetic collaborators so the scheduling
//! pass, connectivity fallback and data model can be watched in the log
//! without hardware.
//!
//! # Environment
//!
//! | Variable                | Effect                                        |
//! |-------------------------|-----------------------------------------------|
//! | `RUST_LOG`              | Log filter, e.g. `info` or `debug`            |
//! | `SIM_NO_WIFI`           | The Wi-Fi network is unreachable              |
//! | `SIM_SSID`              | Network name stored in the configuration      |
//! | `SIM_UPDATE_AFTER_SECS` | Signal a firmware update after N seconds      |
//! | `SIM_DURATION_SECS`     | Exit after N seconds (runs forever otherwise) |

use std::net::Ipv4Addr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde_json::json;

use station_core::config::{ConfigError, ConfigStore, StationConfig};
use station_core::display::{AgeUnit, Backlight, Font, Renderer, Slot};
use station_core::network::{
    BusEndpoint, BusError, MessageBus, NetworkInterface, RadioError, TOPIC_OUTDOOR_HUMIDITY,
    TOPIC_OUTDOOR_PRESSURE, TOPIC_OUTDOOR_TEMPERATURE, UpdateSignal, UpdateTransport,
};
use station_core::sensors::{ClimateReading, LocalSensors, SensorError};
use station_core::station::{Collaborators, Station};
use station_core::storage::ChartSnapshot;
use station_core::weather::{WEATHER_HOST, WeatherClient, WeatherError};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Scheduling pass interval
const PASS_INTERVAL: Duration = Duration::from_millis(50);

/// Time the simulated radio needs to join
const JOIN_DELAY: Duration = Duration::from_secs(2);

/// Interval between remote sensor publications
const REMOTE_PUBLISH_INTERVAL: Duration = Duration::from_secs(5);

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Generates synthetic local sensor readings that vary over time.
struct MockSensorGenerator {
    start: Instant,
}

impl MockSensorGenerator {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn t(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl LocalSensors for MockSensorGenerator {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        let t = self.t();
        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        // Humidity: 40–60 %
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();
        Ok(ClimateReading {
            temperature_celsius: temperature as f32,
            humidity_percent: humidity as f32,
        })
    }

    fn read_light_level(&mut self) -> Result<u16, SensorError> {
        // Sweeps across the default brightness setpoint once a minute.
        let level = 100.0 + 80.0 * (self.t() / 10.0).sin();
        Ok(level as u16)
    }
}

// ---------------------------------------------------------------------------
// Simulated network
// ---------------------------------------------------------------------------

struct SimNetwork {
    reachable: bool,
    join_started: Option<Instant>,
    ap_up: bool,
}

impl NetworkInterface for SimNetwork {
    fn begin_join(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        info!("[radio] joining {}", ssid);
        self.join_started = Some(Instant::now());
        Ok(())
    }

    fn is_link_up(&mut self) -> bool {
        self.reachable
            && self
                .join_started
                .is_some_and(|started| started.elapsed() >= JOIN_DELAY)
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.join_started.map(|_| Ipv4Addr::new(192, 168, 0, 77))
    }

    fn leave(&mut self) {
        self.join_started = None;
        self.ap_up = false;
    }

    fn start_access_point(&mut self, ssid: &str, _password: &str) -> Result<Ipv4Addr, RadioError> {
        info!("[radio] access point {} up", ssid);
        self.ap_up = true;
        Ok(Ipv4Addr::new(192, 168, 4, 1))
    }

    fn is_access_point_up(&mut self) -> bool {
        self.ap_up
    }

    fn start_captive_dns(&mut self, ip: Ipv4Addr) -> Result<(), RadioError> {
        info!("[dns] answering every lookup with {}", ip);
        Ok(())
    }

    fn process_dns(&mut self) {}
}

/// Broker that publishes a synthetic outdoor sensor
struct SimBus {
    connected: bool,
    start: Instant,
    last_publish: Option<Instant>,
}

impl MessageBus for SimBus {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn connect(&mut self, endpoint: BusEndpoint<'_>, client_id: &str) -> Result<(), BusError> {
        info!(
            "[bus] {} connected to {}:{}",
            client_id, endpoint.server, endpoint.port
        );
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &'static str) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        debug!("[bus] subscribed to {}", topic);
        Ok(())
    }

    fn poll(&mut self, deliver: &mut dyn FnMut(&str, &[u8])) {
        if self
            .last_publish
            .is_some_and(|last| last.elapsed() < REMOTE_PUBLISH_INTERVAL)
        {
            return;
        }
        self.last_publish = Some(Instant::now());

        let t = self.start.elapsed().as_secs_f64();
        let temperature = -3.0 + 2.0 * (t / 90.0).sin();
        let humidity = 85.0 + 5.0 * (t / 60.0).cos();
        let pressure = 742.0 + 4.0 * (t / 300.0).sin();

        deliver(TOPIC_OUTDOOR_TEMPERATURE, format!("{temperature:.1}").as_bytes());
        deliver(TOPIC_OUTDOOR_HUMIDITY, format!("{humidity:.0}").as_bytes());
        deliver(TOPIC_OUTDOOR_PRESSURE, format!("{pressure:.1}").as_bytes());
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

struct SimUpdate {
    at: Option<Instant>,
}

impl UpdateTransport for SimUpdate {
    fn poll(&mut self) -> Option<UpdateSignal> {
        let at = self.at?;
        if Instant::now() < at {
            return None;
        }
        self.at = None;
        warn!("[ota] update transfer starting");
        Some(UpdateSignal::Started)
    }
}

/// Serves weather documents aligned with the wall clock
struct CannedWeather;

impl CannedWeather {
    fn current(now: i64) -> serde_json::Value {
        json!({
            "main": {"temp": -1.5, "pressure": 1002, "humidity": 88},
            "wind": {"speed": 4, "deg": 225},
            "clouds": {"all": 90},
            "snow": {"3h": 0.4},
            "dt": now,
        })
    }

    fn forecast(now: i64) -> serde_json::Value {
        let midnight = now - now.rem_euclid(24 * 60 * 60);
        let list: Vec<_> = (0..17)
            .map(|i| {
                let rain = if i % 3 == 0 { 0.5 } else { 0.0 };
                json!({
                    "dt": midnight + i * 3 * 60 * 60,
                    "main": {"temp": -4 + i},
                    "clouds": {"all": (i * 6) % 100},
                    "wind": {"speed": 2 + i % 4, "deg": (i * 40) % 360},
                    "rain": {"3h": rain},
                })
            })
            .collect();
        json!({"cnt": list.len(), "list": list})
    }
}

impl WeatherClient for CannedWeather {
    fn get(&mut self, host: &str, path: &str) -> Result<Vec<u8>, WeatherError> {
        info!("[http] GET http://{}{}", host, path);
        if host != WEATHER_HOST {
            return Err(WeatherError::Http { status: 404 });
        }
        let now = unix_now();
        let body = if path.starts_with("/data/2.5/weather") {
            Self::current(now)
        } else {
            Self::forecast(now)
        };
        serde_json::to_vec(&body).map_err(|_| WeatherError::Transport)
    }
}

#[derive(Default)]
struct MemoryStore {
    record: Option<Vec<u8>>,
}

impl ConfigStore for MemoryStore {
    fn read(&mut self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.record.clone())
    }

    fn write(&mut self, record: &[u8]) -> Result<(), ConfigError> {
        self.record = Some(record.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Logs every draw call instead of painting pixels
struct LogRenderer;

impl Renderer for LogRenderer {
    fn set_font(&mut self, _font: Font) {}

    fn draw_number(&mut self, value: f32, slot: Slot, signed: bool, precision: u8) {
        let precision = usize::from(precision);
        if signed {
            info!("{:?}: {:+.*}", slot, precision, value);
        } else {
            info!("{:?}: {:.*}", slot, precision, value);
        }
    }

    fn draw_arrow(&mut self, value: f32, trend: f32, slot: Slot) {
        let arrow = if value > trend {
            "up"
        } else if value < trend {
            "down"
        } else {
            "steady"
        };
        debug!("{:?}: trend {} (avg {:.2})", slot, arrow, trend);
    }

    fn draw_wind(&mut self, degrees: f32, slot: Slot) {
        info!("{:?}: wind from {:.0} deg", slot, degrees);
    }

    fn draw_chart(&mut self, chart: ChartSnapshot<'_>) {
        info!(
            "Pressure chart: {} samples, scale {:.1}..{:.1}",
            chart.samples.len(),
            chart.min,
            chart.max
        );
    }

    fn draw_text(&mut self, text: &str, slot: Slot) {
        for line in text.lines() {
            info!("{:?}: {}", slot, line);
        }
    }

    fn draw_age(&mut self, age: Option<u32>, unit: AgeUnit, slot: Slot) {
        let unit = match unit {
            AgeUnit::Seconds => "s",
            AgeUnit::Minutes => "min",
        };
        match age {
            Some(age) => debug!("{:?}: {}{} ago", slot, age, unit),
            None => debug!("{:?}: never", slot),
        }
    }

    fn set_backlight(&mut self, level: Backlight) {
        info!("Backlight {:?}", level);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::default();
    let mut config = StationConfig::default();
    let ssid = std::env::var("SIM_SSID").unwrap_or_else(|_| "simulated-net".into());
    let seeded = config
        .set_named("ssid", &ssid)
        .and_then(|()| config.set_named("ApiAppId", "simulator"))
        .and_then(|()| config.save(&mut store));
    if let Err(e) = seeded {
        warn!("Could not seed configuration: {}", e);
    }
    store
}

fn main() {
    env_logger::init();
    info!("Starting weather station simulator");

    let reachable = std::env::var_os("SIM_NO_WIFI").is_none();
    if !reachable {
        info!("SIM_NO_WIFI set, the network will never come up");
    }
    let update_at = env_secs("SIM_UPDATE_AFTER_SECS").map(|d| Instant::now() + d);
    let run_for = env_secs("SIM_DURATION_SECS");

    let parts = Collaborators {
        net: SimNetwork {
            reachable,
            join_started: None,
            ap_up: false,
        },
        bus: SimBus {
            connected: false,
            start: Instant::now(),
            last_publish: None,
        },
        update: SimUpdate { at: update_at },
        sensors: MockSensorGenerator::new(),
        weather: CannedWeather,
    };
    let mut station = Station::new(parts, seeded_store(), embassy_time::Instant::now());
    let mut renderer = LogRenderer;

    let started = Instant::now();
    loop {
        let pass_start = Instant::now();

        for event in station.poll(embassy_time::Instant::now(), &mut renderer) {
            debug!("Connectivity event {:?}", event);
        }

        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        let elapsed = pass_start.elapsed();
        if elapsed < PASS_INTERVAL {
            std::thread::sleep(PASS_INTERVAL - elapsed);
        }
    }

    if let Some(e) = station.last_error() {
        info!("Last error: {}", e);
    }
    info!("Simulator exiting");
}
