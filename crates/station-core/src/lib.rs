//! Hardware-independent core of the weather display station
//!
//! The station reconciles three unreliable data sources into one smoothed
//! data model: the local temperature/humidity/light sensors, a remote outdoor
//! sensor publishing on a message bus, and a weather API polled over HTTP.
//! It keeps a bounded pressure history for charting and manages client vs.
//! access-point networking alongside firmware updates.
//!
//! Drivers, transports, persistence and pixel rendering are collaborators
//! behind traits ([`sensors::LocalSensors`], [`network::NetworkInterface`],
//! [`network::MessageBus`], [`network::UpdateTransport`],
//! [`weather::WeatherClient`], [`config::ConfigStore`],
//! [`display::Renderer`]), so the crate is `#![no_std]` with
//! `extern crate alloc` and runs on both the device and desktop hosts.

#![no_std]

extern crate alloc;

pub mod aggregator;
pub mod app_state;
pub mod config;
pub mod display;
pub mod network;
pub mod sensors;
pub mod station;
pub mod storage;
pub mod trigger;
pub mod weather;
