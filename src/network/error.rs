//! Common error types for bridge operations

use core::fmt;

/// A common error type for bridge operations.
///
/// This enum covers every failure the bridge reports to the application. It is
/// designed to be simple and portable for `no_std` environments: variants carry
/// no payload, and the engine's own error values are logged rather than
/// propagated.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No broker URI was configured before connecting.
    MissingUri,
    /// The stored configuration could not be parsed.
    InvalidConfig,
    /// The engine could not be created.
    EngineInit,
    /// The engine was created but refused to start.
    EngineStart,
    /// The engine failed to stop or to release its resources.
    EngineStop,
    /// An operation needs an engine but none is running.
    NotStarted,
    /// An operation needs a live broker connection.
    NotConnected,
    /// Another engine request from this client is still in progress.
    Busy,
    /// The engine refused the request (for example an oversized payload).
    Rejected,
    /// A topic does not fit in the bridge's fixed-size topic buffer.
    TopicTooLong,
    /// The subscription table or the pending registry is full.
    CapacityExceeded,
    /// A value outside the allowed QoS range was supplied.
    InvalidQos,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::MissingUri => "broker URI is not set",
            Error::InvalidConfig => "invalid configuration",
            Error::EngineInit => "engine creation failed",
            Error::EngineStart => "engine start failed",
            Error::EngineStop => "engine stop failed",
            Error::NotStarted => "engine is not running",
            Error::NotConnected => "not connected to the broker",
            Error::Busy => "another engine request is in progress",
            Error::Rejected => "request rejected by the engine",
            Error::TopicTooLong => "topic exceeds maximum length",
            Error::CapacityExceeded => "subscription capacity exceeded",
            Error::InvalidQos => "invalid QoS level",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::MissingUri => defmt::write!(f, "MissingUri"),
            Error::InvalidConfig => defmt::write!(f, "InvalidConfig"),
            Error::EngineInit => defmt::write!(f, "EngineInit"),
            Error::EngineStart => defmt::write!(f, "EngineStart"),
            Error::EngineStop => defmt::write!(f, "EngineStop"),
            Error::NotStarted => defmt::write!(f, "NotStarted"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Busy => defmt::write!(f, "Busy"),
            Error::Rejected => defmt::write!(f, "Rejected"),
            Error::TopicTooLong => defmt::write!(f, "TopicTooLong"),
            Error::CapacityExceeded => defmt::write!(f, "CapacityExceeded"),
            Error::InvalidQos => defmt::write!(f, "InvalidQos"),
        }
    }
}
