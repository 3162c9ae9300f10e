//! # iot-mqtt-bridge
//!
//! The in-process bridge between a device's application code and an
//! event-driven MQTT protocol engine. The engine (an ESP-IDF style client, a
//! hosted client running on its own thread, or a test double) owns the wire
//! protocol and the transport; this crate owns everything the application
//! actually talks to:
//!
//! - **Subscription tracking**: which topic filters the application wants,
//!   with which callbacks, and whether the broker has acknowledged them.
//! - **Acknowledgement correlation**: matching SUBACK events back to the
//!   subscribe request that caused them.
//! - **Message routing**: fanning incoming messages out to every matching
//!   subscription using MQTT wildcard matching.
//! - **Connection lifecycle**: building the engine configuration, starting and
//!   stopping the engine, and tracking connectivity.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! iot-mqtt-bridge = "0.1.0"
//! ```
//!
//! ### Subscribing and routing
//!
//! ```rust,no_run
//! use iot_mqtt_bridge::network::application::mqtt::{Client, Config, QoS};
//! # use iot_mqtt_bridge::network::application::mqtt::EngineConfig;
//! # use iot_mqtt_bridge::network::{Connect, Engine, Handle, MessageId};
//! # struct Esp;
//! # impl Engine for Esp {
//! #     type Error = ();
//! #     fn handle(&self) -> Handle { Handle(1) }
//! #     fn start(&mut self) -> Result<(), ()> { Ok(()) }
//! #     fn stop(&mut self) -> Result<(), ()> { Ok(()) }
//! #     fn destroy(self) -> Result<(), ()> { Ok(()) }
//! #     fn publish(&mut self, _: &str, _: &[u8], _: QoS, _: bool) -> Result<MessageId, ()> { Ok(0) }
//! #     fn subscribe(&mut self, _: &str, _: QoS) -> Result<MessageId, ()> { Ok(1) }
//! #     fn unsubscribe(&mut self, _: &str) -> Result<MessageId, ()> { Ok(2) }
//! # }
//! # struct EspFactory;
//! # impl Connect for EspFactory {
//! #     type Engine = Esp;
//! #     type Error = ();
//! #     fn connect(&mut self, _: &EngineConfig<'_>) -> Result<Esp, ()> { Ok(Esp) }
//! # }
//!
//! let on_temperature = |payload: &[u8]| {
//!     // parse and act on the reading
//!     let _ = payload;
//! };
//!
//! let mut config = Config::default();
//! config.uri = Some("mqtt://broker.local:1883");
//! config.client_name = Some("greenhouse-01");
//!
//! let client: Client<'_, EspFactory> = Client::new(EspFactory, config);
//! client.connect()?;
//! client.subscribe("sensors/+/temp", &on_temperature, QoS::AtLeastOnce)?;
//!
//! // The engine forwards every protocol event to `client.on_event(..)`.
//! # Ok::<(), iot_mqtt_bridge::network::error::Error>(())
//! ```
//!
//! ## Platform Support
//!
//! The crate is `no_std` and allocation free. Shared state is guarded with
//! [`critical_section`], so the target must provide a critical-section
//! implementation (hosted targets get one through the `std` feature).
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support and the hosted critical-section
//! - `defmt`: Log through `defmt` and implement `defmt::Format` for public types
//! - `log`: Log through the `log` facade

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("the `defmt` and `log` features are mutually exclusive");

#[macro_use]
mod fmt;

/// Protocol engine abstraction, error types and the MQTT application layer.
///
/// The engine itself is an external collaborator described by the
/// [`Engine`](network::Engine) and [`Connect`](network::Connect) traits; the
/// subscription and routing logic lives in [`network::application::mqtt`].
pub mod network;
