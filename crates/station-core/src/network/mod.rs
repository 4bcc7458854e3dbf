//! Upstream connectivity: Wi-Fi client/access-point handling and the
//! message bus carrying the remote outdoor sensor.

mod bus;
mod connectivity;

pub use bus::{
    BusEndpoint, BusError, BusInbox, BusMessage, CLIENT_ID, INBOX_CAPACITY, MAX_PAYLOAD_LEN,
    MessageBus, RemoteTopic, TOPIC_OUTDOOR_HUMIDITY, TOPIC_OUTDOOR_PRESSURE,
    TOPIC_OUTDOOR_TEMPERATURE, TOPIC_SENSOR_ERROR,
};
pub use connectivity::{
    Connectivity, ConnectivityEvent, ConnectivityState, DEFAULT_AP_PASSWORD,
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_JOIN_ATTEMPTS, Events, HOST_NAME, JoinBudget,
    NetworkInterface, RadioError, UpdateSignal, UpdateTransport,
};
