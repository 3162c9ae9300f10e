//! # Application Layer Protocols
//!
//! Application layer (OSI Layer 7) logic that sits on top of a protocol
//! engine. The engine handles framing and transport; the code here tracks
//! application intent and routes what the engine delivers.
//!
//! ## Available Protocols
//!
//! - **[`mqtt`]**: subscription tracking, acknowledgement correlation and
//!   wildcard message routing for MQTT 3.1.1 engines
//!
//! ## Design Principles
//!
//! - **Engine Agnostic**: Work with any type implementing [`Engine`](crate::network::Engine)
//! - **No-std Compatible**: Designed for embedded systems without heap allocation
//! - **Resource Conscious**: Use fixed-size tables and bounded topic buffers
//! - **Error Handling**: Every fallible operation returns a `Result`

/// MQTT bridge implementation.
///
/// Provides the subscription table, the pending acknowledgement registry,
/// the topic matcher and the event dispatcher for MQTT engines.
pub mod mqtt;
