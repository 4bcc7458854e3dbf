//! Message-bus interface and the inbox between transport and aggregator
//!
//! The transport hands every message to a closure supplied by the caller
//! (see [`MessageBus::poll`]); the station's closure pushes it into a
//! [`BusInbox`] which the aggregator drains on its own cadence.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};
use thiserror_no_std::Error;

/// Client identifier presented to the broker
pub const CLIENT_ID: &str = "unit1_device2";

pub const TOPIC_OUTDOOR_TEMPERATURE: &str = "unit1/device1/sensor1/status";
pub const TOPIC_OUTDOOR_HUMIDITY: &str = "unit1/device1/sensor2/status";
pub const TOPIC_OUTDOOR_PRESSURE: &str = "unit1/device1/sensor3/status";
pub const TOPIC_SENSOR_ERROR: &str = "unit1/device1/error/status";

/// Longest payload accepted; the remote sensor only sends short numbers
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Messages buffered between drains
pub const INBOX_CAPACITY: usize = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("broker connection failed")]
    ConnectFailed,
    #[error("subscription to {topic} failed")]
    SubscribeFailed { topic: &'static str },
    #[error("not connected to broker")]
    NotConnected,
}

/// The fixed topic set the station subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTopic {
    OutdoorTemperature,
    OutdoorHumidity,
    OutdoorPressure,
    SensorError,
}

impl RemoteTopic {
    pub const ALL: [RemoteTopic; 4] = [
        Self::OutdoorTemperature,
        Self::OutdoorHumidity,
        Self::OutdoorPressure,
        Self::SensorError,
    ];

    pub const fn topic(self) -> &'static str {
        match self {
            Self::OutdoorTemperature => TOPIC_OUTDOOR_TEMPERATURE,
            Self::OutdoorHumidity => TOPIC_OUTDOOR_HUMIDITY,
            Self::OutdoorPressure => TOPIC_OUTDOOR_PRESSURE,
            Self::SensorError => TOPIC_SENSOR_ERROR,
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.topic() == topic)
    }
}

/// Where the broker lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEndpoint<'a> {
    pub server: &'a str,
    pub port: u16,
}

/// Publish/subscribe client transport.
pub trait MessageBus {
    fn is_connected(&mut self) -> bool;

    fn connect(&mut self, endpoint: BusEndpoint<'_>, client_id: &str) -> Result<(), BusError>;

    fn subscribe(&mut self, topic: &'static str) -> Result<(), BusError>;

    /// Service the connection, handing every received message to `deliver`.
    fn poll(&mut self, deliver: &mut dyn FnMut(&str, &[u8]));

    fn disconnect(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: RemoteTopic,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
}

impl BusMessage {
    fn text(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok().map(str::trim)
    }

    /// Payload as an ASCII number. `None` for anything unparseable.
    pub fn parse_f32(&self) -> Option<f32> {
        self.text()?.parse().ok()
    }

    pub fn parse_i32(&self) -> Option<i32> {
        self.text()?.parse().ok()
    }
}

/// Bounded queue of received messages, filled by the bus callback.
pub struct BusInbox {
    channel: Channel<NoopRawMutex, BusMessage, INBOX_CAPACITY>,
}

impl BusInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queue a message from the transport.
    ///
    /// Messages on foreign topics, oversized payloads and messages arriving
    /// while the inbox is full are dropped. Returns whether it was queued.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(topic) = RemoteTopic::from_topic(topic) else {
            debug!("Ignoring message on unknown topic {}", topic);
            return false;
        };
        let Ok(payload) = heapless::Vec::from_slice(payload) else {
            warn!("Dropping {}-byte payload on {}", payload.len(), topic.topic());
            return false;
        };
        if self.channel.try_send(BusMessage { topic, payload }).is_err() {
            warn!("Bus inbox full, dropping message on {}", topic.topic());
            return false;
        }
        true
    }

    pub fn take(&self) -> Option<BusMessage> {
        self.channel.try_receive().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }
}

impl Default for BusInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_round_trip_by_name() {
        for topic in RemoteTopic::ALL {
            assert_eq!(RemoteTopic::from_topic(topic.topic()), Some(topic));
        }
        assert_eq!(RemoteTopic::from_topic("unit1/device1/hello/status"), None);
    }

    #[test]
    fn inbox_queues_known_topics_in_order() {
        let inbox = BusInbox::new();
        assert!(inbox.deliver(TOPIC_OUTDOOR_TEMPERATURE, b"21.5"));
        assert!(inbox.deliver(TOPIC_SENSOR_ERROR, b"3"));
        assert!(!inbox.deliver("unit1/device1/hello/status", b"hi"));
        assert_eq!(inbox.len(), 2);

        let first = inbox.take().unwrap();
        assert_eq!(first.topic, RemoteTopic::OutdoorTemperature);
        assert_eq!(first.parse_f32(), Some(21.5));

        let second = inbox.take().unwrap();
        assert_eq!(second.parse_i32(), Some(3));
        assert!(inbox.take().is_none());
        assert!(inbox.is_empty());
    }

    #[test]
    fn inbox_drops_when_full_or_oversized() {
        let inbox = BusInbox::new();
        for _ in 0..INBOX_CAPACITY {
            assert!(inbox.deliver(TOPIC_OUTDOOR_PRESSURE, b"741"));
        }
        assert!(!inbox.deliver(TOPIC_OUTDOOR_PRESSURE, b"742"));

        let inbox = BusInbox::new();
        assert!(!inbox.deliver(TOPIC_OUTDOOR_PRESSURE, &[b'7'; MAX_PAYLOAD_LEN + 1]));
    }

    #[test]
    fn payload_parsing_is_strict() {
        let inbox = BusInbox::new();
        inbox.deliver(TOPIC_OUTDOOR_HUMIDITY, b" 55.25\r\n");
        inbox.deliver(TOPIC_OUTDOOR_HUMIDITY, b"wet");
        inbox.deliver(TOPIC_OUTDOOR_HUMIDITY, &[0xff, 0xfe]);

        assert_eq!(inbox.take().unwrap().parse_f32(), Some(55.25));
        assert_eq!(inbox.take().unwrap().parse_f32(), None);
        assert_eq!(inbox.take().unwrap().parse_f32(), None);
    }
}
