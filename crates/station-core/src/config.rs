//! Station configuration
//!
//! A small key/value set read once at start and written when the operator
//! saves the on-device form. Persistence is delegated to a [`ConfigStore`];
//! the record itself is encoded with `postcard`.

extern crate alloc;
use alloc::vec::Vec;

use heapless::String;
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 64;
pub const SERVER_MAX_LEN: usize = 64;
pub const APP_ID_MAX_LEN: usize = 40;
pub const LOCATION_MAX_LEN: usize = 64;

pub const DEFAULT_BUS_SERVER: &str = "192.168.0.3";
pub const DEFAULT_BUS_PORT: u16 = 1883;
pub const DEFAULT_LOCATION: &str = "Moscow,ru";
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 3 * 60 * 60;
pub const DEFAULT_BRIGHTNESS_SETPOINT: u16 = 100;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config storage unavailable: {0}")]
    Storage(&'static str),
    #[error("config record could not be decoded")]
    Decode,
    #[error("config record could not be encoded")]
    Encode,
    #[error("value for {field} is longer than {max} bytes")]
    TooLong { field: &'static str, max: usize },
    #[error("value for {field} is not a valid number")]
    InvalidNumber { field: &'static str },
    #[error("value for {field} is not one of the allowed choices")]
    InvalidChoice { field: &'static str },
    #[error("unknown configuration field")]
    UnknownField,
}

/// Which producer owns the outdoor temperature, humidity and pressure values
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutdoorSource {
    /// The remote sensor publishing on the message bus
    #[default]
    RemoteFeed,
    /// The current-conditions weather API
    WeatherApi,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct InternetConfig {
    pub ssid: String<SSID_MAX_LEN>,
    pub password: String<PASSWORD_MAX_LEN>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub server: String<SERVER_MAX_LEN>,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WeatherConfig {
    pub app_id: String<APP_ID_MAX_LEN>,
    pub location: String<LOCATION_MAX_LEN>,
    /// Offset of local time from UTC, used for forecast checkpoints and
    /// observation times
    pub utc_offset_secs: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Light level at or above which the backlight runs bright
    pub brightness_setpoint: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct StationConfig {
    pub internet: InternetConfig,
    pub bus: BusConfig,
    pub weather: WeatherConfig,
    pub display: DisplayConfig,
    pub outdoor_source: OutdoorSource,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            server: bounded(DEFAULT_BUS_SERVER, "server").unwrap_or_default(),
            port: DEFAULT_BUS_PORT,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            location: bounded(DEFAULT_LOCATION, "ApiLocation").unwrap_or_default(),
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            brightness_setpoint: DEFAULT_BRIGHTNESS_SETPOINT,
        }
    }
}

/// Fields exposed on the configuration form, by form name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Ssid,
    Password,
    BusServer,
    BusPort,
    ApiAppId,
    ApiLocation,
    Brightness,
    OutdoorSource,
}

impl ConfigField {
    pub const ALL: [ConfigField; 8] = [
        Self::Ssid,
        Self::Password,
        Self::BusServer,
        Self::BusPort,
        Self::ApiAppId,
        Self::ApiLocation,
        Self::Brightness,
        Self::OutdoorSource,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ssid => "ssid",
            Self::Password => "password",
            Self::BusServer => "server",
            Self::BusPort => "port",
            Self::ApiAppId => "ApiAppId",
            Self::ApiLocation => "ApiLocation",
            Self::Brightness => "brightness",
            Self::OutdoorSource => "source",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

fn bounded<const N: usize>(text: &str, field: &'static str) -> Result<String<N>, ConfigError> {
    String::try_from(text).map_err(|_| ConfigError::TooLong { field, max: N })
}

impl StationConfig {
    /// Apply one form field. Nothing is changed if the value is rejected.
    pub fn set_field(&mut self, field: ConfigField, value: &str) -> Result<(), ConfigError> {
        let name = field.name();
        let value = value.trim();
        match field {
            ConfigField::Ssid => self.internet.ssid = bounded(value, name)?,
            ConfigField::Password => self.internet.password = bounded(value, name)?,
            ConfigField::BusServer => self.bus.server = bounded(value, name)?,
            ConfigField::BusPort => {
                self.bus.port = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { field: name })?
            }
            ConfigField::ApiAppId => self.weather.app_id = bounded(value, name)?,
            ConfigField::ApiLocation => self.weather.location = bounded(value, name)?,
            ConfigField::Brightness => {
                self.display.brightness_setpoint = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { field: name })?
            }
            ConfigField::OutdoorSource => {
                self.outdoor_source = match value {
                    "remote" => OutdoorSource::RemoteFeed,
                    "api" => OutdoorSource::WeatherApi,
                    _ => return Err(ConfigError::InvalidChoice { field: name }),
                }
            }
        }
        Ok(())
    }

    /// Apply a form field by its form name.
    pub fn set_named(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let field = ConfigField::from_name(name).ok_or(ConfigError::UnknownField)?;
        self.set_field(field, value)
    }

    /// Whether switching to `other` requires bringing networking up again.
    pub fn network_differs(&self, other: &StationConfig) -> bool {
        self.internet != other.internet || self.bus != other.bus
    }

    pub fn encode(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn decode(record: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(record).map_err(|_| ConfigError::Decode)
    }

    /// Read the stored configuration.
    ///
    /// `Ok(None)` means nothing has been saved yet.
    pub fn load<S: ConfigStore>(store: &mut S) -> Result<Option<Self>, ConfigError> {
        let Some(record) = store.read()? else {
            return Ok(None);
        };
        let config = Self::decode(&record)?;
        info!("Configuration loaded ({} bytes)", record.len());
        Ok(Some(config))
    }

    /// Read the stored configuration, falling back to defaults.
    ///
    /// The error is returned alongside the defaults when a record existed but
    /// could not be read, so the station can report it to the operator.
    pub fn load_or_default<S: ConfigStore>(store: &mut S) -> (Self, Option<ConfigError>) {
        match Self::load(store) {
            Ok(Some(config)) => (config, None),
            Ok(None) => {
                info!("No stored configuration, using defaults");
                (Self::default(), None)
            }
            Err(e) => {
                error!("Failed to read configuration: {}", e);
                (Self::default(), Some(e))
            }
        }
    }

    pub fn save<S: ConfigStore>(&self, store: &mut S) -> Result<(), ConfigError> {
        let record = self.encode()?;
        store.write(&record).map_err(|e| {
            error!("Failed to write configuration: {}", e);
            e
        })?;
        info!("Configuration saved ({} bytes)", record.len());
        Ok(())
    }
}

/// Persistent storage for the encoded configuration record.
pub trait ConfigStore {
    /// Return the stored record, or `None` if nothing was saved yet.
    fn read(&mut self) -> Result<Option<Vec<u8>>, ConfigError>;

    /// Replace the stored record.
    fn write(&mut self, record: &[u8]) -> Result<(), ConfigError>;
}
