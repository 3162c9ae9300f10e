//! Protocol engine abstraction for the MQTT bridge
//!
//! The bridge never speaks the MQTT wire protocol itself. It drives an
//! external *engine* that frames packets, keeps the transport alive and
//! retransmits, and that reports back through discrete events. This module
//! describes that collaborator with two traits: [`Connect`] creates an engine
//! from a configuration and [`Engine`] accepts requests on the live handle.
//!

#![deny(unsafe_code)]

/// Common error types for bridge operations
pub mod error;

/// Application layer protocols built on top of an engine
pub mod application;

use application::mqtt::{EngineConfig, QoS};

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Connect, Engine};
}

/// Identifier the engine assigns to an outgoing request.
///
/// Subscribe acknowledgements are correlated back to their request through
/// this value.
pub type MessageId = u16;

/// Opaque identity of one engine instance.
///
/// Every event carries the handle of the engine that produced it, which lets
/// several bridges share a single event loop without seeing each other's
/// traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handle(pub usize);

/// A running protocol engine.
///
/// All request methods are fire-and-forget: they return as soon as the request
/// has been queued, and the outcome arrives later as an event.
pub trait Engine {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Identity used to tag events produced by this engine
    fn handle(&self) -> Handle;
    /// Start the engine's background processing
    fn start(&mut self) -> Result<(), Self::Error>;
    /// Stop background processing and drop the transport
    fn stop(&mut self) -> Result<(), Self::Error>;
    /// Release every resource held by the engine
    fn destroy(self) -> Result<(), Self::Error>;
    /// Queue a publish request
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Self::Error>;
    /// Queue a subscribe request, returning its message id
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<MessageId, Self::Error>;
    /// Queue an unsubscribe request
    fn unsubscribe(&mut self, topic: &str) -> Result<MessageId, Self::Error>;
}

/// Creates engines from a configuration.
pub trait Connect {
    /// Associated engine type
    type Engine: Engine;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Create a new engine; the engine is not started yet
    fn connect(&mut self, config: &EngineConfig<'_>) -> Result<Self::Engine, Self::Error>;
}
