//! The station scheduling pass
//!
//! [`Station::poll`] is called repeatedly from the main loop. Each pass checks
//! connectivity first, then samples the local sensors, drains the bus inbox
//! and, only while the upstream network is usable, polls the weather API.
//! Rendering of new data closes the pass.

extern crate alloc;
use alloc::borrow::Cow;
use alloc::format;

use embassy_time::Instant;
use log::{info, warn};

use crate::aggregator::{Cadences, DataAggregator};
use crate::app_state::StationError;
use crate::config::{ConfigStore, StationConfig};
use crate::display::{Font, Renderer, Slot};
use crate::network::{
    Connectivity, ConnectivityEvent, Events, HOST_NAME, JoinBudget, MessageBus, NetworkInterface,
    UpdateTransport,
};
use crate::sensors::LocalSensors;
use crate::weather::WeatherClient;

pub const STATUS_CONNECTING: &str = "Connecting to Wi-Fi...";
pub const STATUS_UPDATING: &str = "Updating firmware...";
pub const STATUS_WIFI_ERROR: &str = "WiFi connection error!";
pub const STATUS_CONFIG_ERROR: &str = "Error reading config!";

/// How a saved configuration takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconfigurePolicy {
    /// Re-initialise networking in place, keeping collected data
    #[default]
    InPlace,
    /// Stop scheduling and ask the platform for a process restart
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Applied,
    RestartRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StationSettings {
    pub cadences: Cadences,
    pub join_budget: JoinBudget,
    pub policy: ReconfigurePolicy,
}

/// External capabilities the station runs against
pub struct Collaborators<N, B, U, S, C> {
    pub net: N,
    pub bus: B,
    pub update: U,
    pub sensors: S,
    pub weather: C,
}

pub struct Station<N, B, U, S, C, K> {
    config: StationConfig,
    store: K,
    connectivity: Connectivity<N, B, U>,
    aggregator: DataAggregator,
    sensors: S,
    weather: C,
    policy: ReconfigurePolicy,
    restart_required: bool,
    pending_status: Option<&'static str>,
    last_error: Option<StationError>,
}

impl<N, B, U, S, C, K> Station<N, B, U, S, C, K>
where
    N: NetworkInterface,
    B: MessageBus,
    U: UpdateTransport,
    S: LocalSensors,
    C: WeatherClient,
    K: ConfigStore,
{
    pub fn new(parts: Collaborators<N, B, U, S, C>, store: K, now: Instant) -> Self {
        Self::with_settings(parts, store, StationSettings::default(), now)
    }

    /// Load the stored configuration and arm every cadence at `now`.
    pub fn with_settings(
        parts: Collaborators<N, B, U, S, C>,
        mut store: K,
        settings: StationSettings,
        now: Instant,
    ) -> Self {
        let (config, load_error) = StationConfig::load_or_default(&mut store);

        let connectivity = Connectivity::new(
            parts.net,
            parts.bus,
            parts.update,
            &config,
            settings.join_budget,
        );
        let mut aggregator = DataAggregator::new(&config, settings.cadences);
        aggregator.start(now);

        Self {
            config,
            store,
            connectivity,
            aggregator,
            sensors: parts.sensors,
            weather: parts.weather,
            policy: settings.policy,
            restart_required: false,
            pending_status: load_error.map(|_| STATUS_CONFIG_ERROR),
            last_error: load_error.map(StationError::from),
        }
    }

    /// Run one scheduling pass.
    ///
    /// Returns the connectivity events of this pass. Does nothing once a
    /// restart is required.
    pub fn poll<R>(&mut self, now: Instant, renderer: &mut R) -> Events
    where
        R: Renderer + ?Sized,
    {
        if self.restart_required {
            return Events::new();
        }

        if let Some(status) = self.pending_status.take() {
            renderer.set_font(Font::Small);
            renderer.draw_text(status, Slot::Status);
        }

        let inbox = self.aggregator.inbox();
        let events = self.connectivity.poll(now, |topic, payload| {
            inbox.deliver(topic, payload);
        });
        for event in events.iter() {
            self.show_event(*event, renderer);
        }

        self.aggregator.tick(now);
        if let Err(e) = self.aggregator.poll_local(now, &mut self.sensors) {
            self.last_error = Some(e.into());
        }
        self.aggregator.drain_bus(now);
        if self.connectivity.upstream_available() {
            if let Err(e) = self.aggregator.poll_weather(now, &mut self.weather) {
                self.last_error = Some(e.into());
            }
        }

        self.aggregator.present(now, renderer);
        events
    }

    fn show_event<R>(&mut self, event: ConnectivityEvent, renderer: &mut R)
    where
        R: Renderer + ?Sized,
    {
        let status: Cow<'static, str> = match event {
            ConnectivityEvent::Connecting { .. } => STATUS_CONNECTING.into(),
            ConnectivityEvent::Connected { ip: Some(ip) } => format!("IP: {}", ip).into(),
            ConnectivityEvent::Connected { ip: None } => "IP: unknown".into(),
            ConnectivityEvent::AccessPoint { ip } => format!(
                "Connect to Wi-Fi network \"{}\"\nOpen page at http://{}\nto configure station.",
                HOST_NAME, ip
            )
            .into(),
            ConnectivityEvent::JoinFailed => STATUS_WIFI_ERROR.into(),
            ConnectivityEvent::AccessPointFailed(e) => {
                self.last_error = Some(e.into());
                STATUS_WIFI_ERROR.into()
            }
            ConnectivityEvent::UpdateStarted => STATUS_UPDATING.into(),
            ConnectivityEvent::BusFailed(e) => {
                self.last_error = Some(e.into());
                return;
            }
            ConnectivityEvent::LinkLost | ConnectivityEvent::BusConnected => return,
        };
        renderer.set_font(Font::Small);
        renderer.draw_text(&status, Slot::Status);
    }

    /// Persist `config` and make it take effect.
    pub fn save_configuration(&mut self, config: StationConfig) -> Result<SaveOutcome, StationError> {
        config.save(&mut self.store)?;

        match self.policy {
            ReconfigurePolicy::Restart => {
                info!("Configuration saved, restart required");
                self.config = config;
                self.restart_required = true;
                Ok(SaveOutcome::RestartRequired)
            }
            ReconfigurePolicy::InPlace => {
                if self.config.network_differs(&config) {
                    self.connectivity.reconfigure(&config);
                }
                self.aggregator.apply_config(&config);
                self.config = config;
                info!("Configuration applied");
                Ok(SaveOutcome::Applied)
            }
        }
    }

    /// Apply submitted form fields on top of the current configuration and
    /// save. Nothing is saved if any field is rejected.
    pub fn apply_form(&mut self, fields: &[(&str, &str)]) -> Result<SaveOutcome, StationError> {
        let mut config = self.config.clone();
        for (name, value) in fields {
            config.set_named(name, value).inspect_err(|e| {
                warn!("Rejected form field {}: {}", name, e);
            })?;
        }
        self.save_configuration(config)
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &DataAggregator {
        &self.aggregator
    }

    pub fn connectivity(&self) -> &Connectivity<N, B, U> {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut Connectivity<N, B, U> {
        &mut self.connectivity
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn weather_mut(&mut self) -> &mut C {
        &mut self.weather
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Most recent failure, kept for display and diagnostics.
    pub fn last_error(&self) -> Option<StationError> {
        self.last_error
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }
}
