//! Client/access-point connectivity state machine
//!
//! ```text
//! Disconnected ──► ConnectingClient ──► ClientConnected
//!                        │  ▲                  │
//!                        ▼  └── link lost ─────┘
//!                 AccessPointFallback ── AP down ──► ConnectingClient
//! ```
//!
//! One join attempt is in flight at a time. Each attempt gets a time budget;
//! when every attempt of the [`JoinBudget`] expired without a link, the
//! station opens its own access point with a captive DNS responder so the
//! operator can reach the configuration form.
//!
//! The message bus is only touched in `ClientConnected`. A firmware update
//! signal pauses all of this (see [`RunState`]).

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use heapless::String;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::bus::{BusEndpoint, BusError, CLIENT_ID, MessageBus, RemoteTopic};
use crate::app_state::RunState;
use crate::config::{BusConfig, InternetConfig, SERVER_MAX_LEN, StationConfig};

/// Name announced by the station, also used as the access point SSID
pub const HOST_NAME: &str = "EspWeatherStationDisplay";

/// Password of the fallback access point
pub const DEFAULT_AP_PASSWORD: &str = "DefaultPassword0001";

pub const DEFAULT_JOIN_ATTEMPTS: u8 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events reported by one pass of the machine
pub const MAX_EVENTS_PER_POLL: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("join request rejected")]
    JoinRejected,
    #[error("access point could not be started")]
    AccessPointFailed,
    #[error("captive DNS responder could not be started")]
    DnsFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    ConnectingClient,
    ClientConnected,
    AccessPointFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// A join attempt was started (1-based)
    Connecting { attempt: u8 },
    Connected { ip: Option<Ipv4Addr> },
    /// The fallback access point is up at `ip`
    AccessPoint { ip: Ipv4Addr },
    LinkLost,
    /// Every join attempt of the budget expired
    JoinFailed,
    AccessPointFailed(RadioError),
    BusConnected,
    BusFailed(BusError),
    UpdateStarted,
}

pub type Events = heapless::Vec<ConnectivityEvent, MAX_EVENTS_PER_POLL>;

/// How long the machine keeps trying the configured network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinBudget {
    pub attempts: u8,
    pub attempt_timeout: Duration,
}

impl Default for JoinBudget {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_JOIN_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Wi-Fi radio plus the captive DNS responder used in access-point mode.
pub trait NetworkInterface {
    /// Start joining `ssid`. Completion is observed through [`Self::is_link_up`].
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    fn is_link_up(&mut self) -> bool;

    fn local_ip(&self) -> Option<Ipv4Addr>;

    /// Drop any client association or access point.
    fn leave(&mut self);

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<Ipv4Addr, RadioError>;

    fn is_access_point_up(&mut self) -> bool;

    /// Answer every name lookup with `ip`.
    fn start_captive_dns(&mut self, ip: Ipv4Addr) -> Result<(), RadioError>;

    fn process_dns(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSignal {
    Started,
}

/// Over-the-air update transport; only its start signal matters here.
pub trait UpdateTransport {
    fn poll(&mut self) -> Option<UpdateSignal>;
}

pub struct Connectivity<N, B, U> {
    net: N,
    bus: B,
    update: U,
    internet: InternetConfig,
    bus_server: String<SERVER_MAX_LEN>,
    bus_port: u16,
    budget: JoinBudget,
    state: ConnectivityState,
    attempt: u8,
    /// Start of the running attempt, `None` if it failed outright
    attempt_started: Option<Instant>,
    subscribed: bool,
    run_state: RunState,
}

impl<N, B, U> Connectivity<N, B, U>
where
    N: NetworkInterface,
    B: MessageBus,
    U: UpdateTransport,
{
    pub fn new(net: N, bus: B, update: U, config: &StationConfig, budget: JoinBudget) -> Self {
        let BusConfig { server, port } = config.bus.clone();
        Self {
            net,
            bus,
            update,
            internet: config.internet.clone(),
            bus_server: server,
            bus_port: port,
            budget,
            state: ConnectivityState::Disconnected,
            attempt: 0,
            attempt_started: None,
            subscribed: false,
            run_state: RunState::new(),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Whether upstream work (bus, weather API) may run this pass.
    pub fn upstream_available(&self) -> bool {
        self.state == ConnectivityState::ClientConnected && self.run_state.is_running()
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn update_mut(&mut self) -> &mut U {
        &mut self.update
    }

    /// Enter `ConnectingClient` right away instead of on the first poll.
    pub fn begin(&mut self, now: Instant) -> Events {
        let mut events = Events::new();
        if self.state == ConnectivityState::Disconnected {
            self.start_connecting(now, &mut events);
        }
        events
    }

    /// Take new network settings and reconnect from scratch.
    pub fn reconfigure(&mut self, config: &StationConfig) {
        info!("Applying new network settings");
        self.internet = config.internet.clone();
        self.bus_server = config.bus.server.clone();
        self.bus_port = config.bus.port;
        self.bus.disconnect();
        self.net.leave();
        self.state = ConnectivityState::Disconnected;
        self.attempt = 0;
        self.attempt_started = None;
        self.subscribed = false;
    }

    /// Run one connectivity check.
    ///
    /// Bus messages received this pass are handed to `deliver`.
    pub fn poll<F>(&mut self, now: Instant, mut deliver: F) -> Events
    where
        F: FnMut(&str, &[u8]),
    {
        let mut events = Events::new();

        if let Some(UpdateSignal::Started) = self.update.poll() {
            if self.run_state.is_running() {
                info!("Firmware update started, pausing network work");
                self.run_state.pause();
                push(&mut events, ConnectivityEvent::UpdateStarted);
            }
        }
        if self.run_state.is_paused() {
            return events;
        }

        match self.state {
            ConnectivityState::Disconnected => self.start_connecting(now, &mut events),
            ConnectivityState::ConnectingClient => self.check_join(now, &mut events),
            ConnectivityState::ClientConnected => {
                if self.net.is_link_up() {
                    self.maintain_bus(&mut events);
                    if self.subscribed {
                        self.bus.poll(&mut deliver);
                    }
                } else {
                    warn!("WiFi link lost");
                    push(&mut events, ConnectivityEvent::LinkLost);
                    self.bus.disconnect();
                    self.subscribed = false;
                    self.start_connecting(now, &mut events);
                }
            }
            ConnectivityState::AccessPointFallback => {
                if self.net.is_access_point_up() {
                    self.net.process_dns();
                } else {
                    warn!("Access point went down");
                    push(&mut events, ConnectivityEvent::LinkLost);
                    self.start_connecting(now, &mut events);
                }
            }
        }

        events
    }

    fn start_connecting(&mut self, now: Instant, events: &mut Events) {
        self.state = ConnectivityState::ConnectingClient;
        self.attempt = 0;
        self.next_attempt(now, events);
    }

    fn next_attempt(&mut self, now: Instant, events: &mut Events) {
        if self.internet.ssid.is_empty() {
            info!("No WiFi network configured");
            self.enter_access_point(events);
            return;
        }

        self.attempt += 1;
        info!(
            "Joining {} (attempt {}/{})",
            self.internet.ssid.as_str(),
            self.attempt,
            self.budget.attempts
        );
        push(events, ConnectivityEvent::Connecting { attempt: self.attempt });

        self.net.leave();
        self.attempt_started = match self
            .net
            .begin_join(&self.internet.ssid, &self.internet.password)
        {
            Ok(()) => Some(now),
            Err(e) => {
                warn!("Join attempt {} failed: {}", self.attempt, e);
                None
            }
        };
    }

    fn check_join(&mut self, now: Instant, events: &mut Events) {
        if self.net.is_link_up() {
            let ip = self.net.local_ip();
            info!("WiFi connected, IP: {:?}", ip);
            self.state = ConnectivityState::ClientConnected;
            self.subscribed = false;
            push(events, ConnectivityEvent::Connected { ip });
            return;
        }

        let expired = match self.attempt_started {
            Some(started) => now.saturating_duration_since(started) >= self.budget.attempt_timeout,
            None => true,
        };
        if !expired {
            return;
        }

        if self.attempt < self.budget.attempts {
            self.next_attempt(now, events);
        } else {
            warn!("WiFi join budget exhausted after {} attempts", self.attempt);
            push(events, ConnectivityEvent::JoinFailed);
            self.enter_access_point(events);
        }
    }

    fn enter_access_point(&mut self, events: &mut Events) {
        self.net.leave();
        self.attempt_started = None;

        let ip = match self.net.start_access_point(HOST_NAME, DEFAULT_AP_PASSWORD) {
            Ok(ip) => ip,
            Err(e) => {
                error!("Failed to open access point: {}", e);
                self.state = ConnectivityState::Disconnected;
                push(events, ConnectivityEvent::AccessPointFailed(e));
                return;
            }
        };
        if let Err(e) = self.net.start_captive_dns(ip) {
            // The form is still reachable by IP.
            warn!("Captive DNS unavailable: {}", e);
        }

        info!("Access point {} up at {}", HOST_NAME, ip);
        self.state = ConnectivityState::AccessPointFallback;
        push(events, ConnectivityEvent::AccessPoint { ip });
    }

    fn maintain_bus(&mut self, events: &mut Events) {
        if !self.bus.is_connected() {
            self.subscribed = false;
            let endpoint = BusEndpoint {
                server: &self.bus_server,
                port: self.bus_port,
            };
            if let Err(e) = self.bus.connect(endpoint, CLIENT_ID) {
                warn!("Bus connect to {}:{} failed: {}", endpoint.server, endpoint.port, e);
                push(events, ConnectivityEvent::BusFailed(e));
                return;
            }
            info!("Bus connected to {}:{}", endpoint.server, endpoint.port);
            push(events, ConnectivityEvent::BusConnected);
        }

        if self.subscribed {
            return;
        }
        for topic in RemoteTopic::ALL {
            if let Err(e) = self.bus.subscribe(topic.topic()) {
                // Retried on the next pass.
                warn!("{}", e);
                push(events, ConnectivityEvent::BusFailed(e));
                return;
            }
            debug!("Subscribed to {}", topic.topic());
        }
        self.subscribed = true;
    }
}

fn push(events: &mut Events, event: ConnectivityEvent) {
    if events.push(event).is_err() {
        debug!("Dropping connectivity event {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::bus::{BusInbox, TOPIC_OUTDOOR_TEMPERATURE};

    extern crate alloc;
    use alloc::vec::Vec;

    const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
    const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 42);

    #[derive(Default)]
    struct FakeNet {
        reachable: bool,
        joining: bool,
        link_up: bool,
        ap_up: bool,
        join_calls: u32,
        reject_joins: bool,
        dns_broken: bool,
        dns_started: bool,
        dns_requests: u32,
    }

    impl NetworkInterface for FakeNet {
        fn begin_join(&mut self, _ssid: &str, _password: &str) -> Result<(), RadioError> {
            self.join_calls += 1;
            if self.reject_joins {
                return Err(RadioError::JoinRejected);
            }
            self.joining = true;
            Ok(())
        }

        fn is_link_up(&mut self) -> bool {
            if self.joining && self.reachable {
                self.link_up = true;
            }
            self.link_up
        }

        fn local_ip(&self) -> Option<Ipv4Addr> {
            self.link_up.then_some(CLIENT_IP)
        }

        fn leave(&mut self) {
            self.joining = false;
            self.link_up = false;
            self.ap_up = false;
        }

        fn start_access_point(&mut self, ssid: &str, _password: &str) -> Result<Ipv4Addr, RadioError> {
            assert_eq!(ssid, HOST_NAME);
            self.ap_up = true;
            Ok(AP_IP)
        }

        fn is_access_point_up(&mut self) -> bool {
            self.ap_up
        }

        fn start_captive_dns(&mut self, ip: Ipv4Addr) -> Result<(), RadioError> {
            assert_eq!(ip, AP_IP);
            if self.dns_broken {
                return Err(RadioError::DnsFailed);
            }
            self.dns_started = true;
            Ok(())
        }

        fn process_dns(&mut self) {
            self.dns_requests += 1;
        }
    }

    #[derive(Default)]
    struct FakeBus {
        connected: bool,
        connect_calls: u32,
        failing_subscriptions: u32,
        subscriptions: Vec<&'static str>,
        pending: Vec<(&'static str, &'static [u8])>,
    }

    impl MessageBus for FakeBus {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn connect(&mut self, endpoint: BusEndpoint<'_>, client_id: &str) -> Result<(), BusError> {
            assert_eq!(endpoint.server, "192.168.0.3");
            assert_eq!(endpoint.port, 1883);
            assert_eq!(client_id, CLIENT_ID);
            self.connect_calls += 1;
            self.connected = true;
            Ok(())
        }

        fn subscribe(&mut self, topic: &'static str) -> Result<(), BusError> {
            if !self.connected {
                return Err(BusError::NotConnected);
            }
            if self.failing_subscriptions > 0 {
                self.failing_subscriptions -= 1;
                return Err(BusError::SubscribeFailed { topic });
            }
            self.subscriptions.push(topic);
            Ok(())
        }

        fn poll(&mut self, deliver: &mut dyn FnMut(&str, &[u8])) {
            for (topic, payload) in self.pending.drain(..) {
                deliver(topic, payload);
            }
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    #[derive(Default)]
    struct FakeUpdate {
        start_now: bool,
    }

    impl UpdateTransport for FakeUpdate {
        fn poll(&mut self) -> Option<UpdateSignal> {
            core::mem::take(&mut self.start_now).then_some(UpdateSignal::Started)
        }
    }

    type Machine = Connectivity<FakeNet, FakeBus, FakeUpdate>;

    fn configured() -> StationConfig {
        let mut config = StationConfig::default();
        config.set_named("ssid", "home").unwrap();
        config.set_named("password", "secret").unwrap();
        config
    }

    fn machine(reachable: bool) -> Machine {
        let net = FakeNet {
            reachable,
            ..FakeNet::default()
        };
        Connectivity::new(
            net,
            FakeBus::default(),
            FakeUpdate::default(),
            &configured(),
            JoinBudget::default(),
        )
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    fn ignore(_: &str, _: &[u8]) {}

    #[test]
    fn unreachable_network_falls_back_to_access_point() {
        let mut m = machine(false);

        m.poll(at(0), ignore);
        assert_eq!(m.state(), ConnectivityState::ConnectingClient);

        // Attempts are spaced by the per-attempt budget.
        m.poll(at(5), ignore);
        assert_eq!(m.network().join_calls, 1);
        m.poll(at(10), ignore);
        assert_eq!(m.network().join_calls, 2);
        m.poll(at(20), ignore);
        assert_eq!(m.network().join_calls, 3);

        let events = m.poll(at(30), ignore);
        assert_eq!(m.state(), ConnectivityState::AccessPointFallback);
        assert!(events.contains(&ConnectivityEvent::JoinFailed));
        assert!(events.contains(&ConnectivityEvent::AccessPoint { ip: AP_IP }));
        assert!(m.network().dns_started);
        assert!(!m.upstream_available());

        for secs in 31..40 {
            m.poll(at(secs), ignore);
        }
        assert_eq!(m.network().join_calls, 3);
        assert_eq!(m.network().dns_requests, 9);
        assert_eq!(m.bus().connect_calls, 0);
    }

    #[test]
    fn unconfigured_station_opens_access_point_immediately() {
        let mut m = Connectivity::new(
            FakeNet::default(),
            FakeBus::default(),
            FakeUpdate::default(),
            &StationConfig::default(),
            JoinBudget::default(),
        );
        let events = m.begin(at(0));
        assert_eq!(m.state(), ConnectivityState::AccessPointFallback);
        assert_eq!(m.network().join_calls, 0);
        assert!(events.contains(&ConnectivityEvent::AccessPoint { ip: AP_IP }));
    }

    #[test]
    fn reachable_network_connects_and_subscribes() {
        let mut m = machine(true);
        m.begin(at(0));

        let events = m.poll(at(1), ignore);
        assert_eq!(m.state(), ConnectivityState::ClientConnected);
        assert!(events.contains(&ConnectivityEvent::Connected { ip: Some(CLIENT_IP) }));

        let events = m.poll(at(2), ignore);
        assert!(events.contains(&ConnectivityEvent::BusConnected));
        assert_eq!(m.bus().subscriptions.len(), RemoteTopic::ALL.len());
        assert!(m.upstream_available());
    }

    #[test]
    fn failed_subscription_is_retried_next_pass() {
        let mut m = machine(true);
        m.bus_mut().failing_subscriptions = 1;
        m.begin(at(0));
        m.poll(at(1), ignore);

        let events = m.poll(at(2), ignore);
        assert!(m.bus().subscriptions.is_empty());
        assert!(events.iter().any(|e| matches!(e, ConnectivityEvent::BusFailed(_))));

        m.poll(at(3), ignore);
        assert_eq!(m.bus().subscriptions.len(), RemoteTopic::ALL.len());
        assert_eq!(m.bus().connect_calls, 1);
    }

    #[test]
    fn bus_messages_reach_the_handler() {
        let mut m = machine(true);
        let inbox = BusInbox::new();
        m.begin(at(0));
        m.poll(at(1), |t, p| {
            inbox.deliver(t, p);
        });
        m.bus_mut().pending.push((TOPIC_OUTDOOR_TEMPERATURE, b"-3.5".as_slice()));
        m.poll(at(2), |t, p| {
            inbox.deliver(t, p);
        });

        assert_eq!(inbox.take().unwrap().parse_f32(), Some(-3.5));
    }

    #[test]
    fn lost_link_restarts_joining() {
        let mut m = machine(true);
        m.begin(at(0));
        m.poll(at(1), ignore);
        m.poll(at(2), ignore);

        m.network_mut().reachable = false;
        m.network_mut().link_up = false;
        let events = m.poll(at(3), ignore);
        assert!(events.contains(&ConnectivityEvent::LinkLost));
        assert_eq!(m.state(), ConnectivityState::ConnectingClient);
        assert!(!m.bus().connected);
        assert_eq!(m.network().join_calls, 2);
    }

    #[test]
    fn access_point_going_down_rejoins_network() {
        let mut m = machine(false);
        for secs in [0, 10, 20, 30] {
            m.poll(at(secs), ignore);
        }
        assert_eq!(m.state(), ConnectivityState::AccessPointFallback);
        assert_eq!(m.network().join_calls, 3);

        m.network_mut().ap_up = false;
        m.network_mut().reachable = true;
        let events = m.poll(at(31), ignore);
        assert!(events.contains(&ConnectivityEvent::LinkLost));
        assert!(events.contains(&ConnectivityEvent::Connecting { attempt: 1 }));
        assert_eq!(m.state(), ConnectivityState::ConnectingClient);
        assert_eq!(m.network().join_calls, 4);

        m.poll(at(32), ignore);
        assert_eq!(m.state(), ConnectivityState::ClientConnected);
    }

    #[test]
    fn rejected_joins_use_up_the_budget_without_waiting() {
        let mut m = machine(true);
        m.network_mut().reject_joins = true;

        m.begin(at(0));
        m.poll(at(0), ignore);
        m.poll(at(0), ignore);
        assert_eq!(m.network().join_calls, 3);

        let events = m.poll(at(0), ignore);
        assert!(events.contains(&ConnectivityEvent::JoinFailed));
        assert_eq!(m.state(), ConnectivityState::AccessPointFallback);
    }

    #[test]
    fn access_point_comes_up_without_captive_dns() {
        let net = FakeNet {
            dns_broken: true,
            ..FakeNet::default()
        };
        let mut m = Connectivity::new(
            net,
            FakeBus::default(),
            FakeUpdate::default(),
            &StationConfig::default(),
            JoinBudget::default(),
        );
        let events = m.begin(at(0));
        assert!(events.contains(&ConnectivityEvent::AccessPoint { ip: AP_IP }));
        assert_eq!(m.state(), ConnectivityState::AccessPointFallback);
        assert!(!m.network().dns_started);
    }

    #[test]
    fn update_signal_pauses_network_work() {
        let mut m = machine(false);
        m.begin(at(0));
        m.update.start_now = true;

        let events = m.poll(at(1), ignore);
        assert!(events.contains(&ConnectivityEvent::UpdateStarted));
        assert!(m.run_state().is_paused());

        // No further attempts, and no way back to running.
        for secs in 2..120 {
            m.poll(at(secs), ignore);
        }
        assert_eq!(m.network().join_calls, 1);
        assert_eq!(m.state(), ConnectivityState::ConnectingClient);
        assert!(m.run_state().is_paused());
        assert!(!m.upstream_available());
    }

    #[test]
    fn reconfigure_starts_over() {
        let mut m = machine(true);
        m.begin(at(0));
        m.poll(at(1), ignore);
        m.poll(at(2), ignore);

        m.reconfigure(&configured());
        assert_eq!(m.state(), ConnectivityState::Disconnected);
        assert!(!m.bus().connected);

        m.poll(at(3), ignore);
        m.poll(at(4), ignore);
        assert_eq!(m.state(), ConnectivityState::ClientConnected);
    }
}
