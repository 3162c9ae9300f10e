//! Events delivered by the protocol engine.
//!
//! The engine reports everything that happens on the connection through a
//! single [`Event`] type. Each event carries the [`Handle`] of the engine that
//! produced it so the client can ignore traffic that belongs to another
//! instance or to an engine that has already been torn down.

use crate::network::{Handle, MessageId};

/// A protocol event tagged with the engine that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    /// Engine instance the event belongs to.
    pub handle: Handle,
    /// What happened.
    pub kind: EventKind<'a>,
}

impl<'a> Event<'a> {
    /// Tag an event kind with an engine handle.
    pub fn new(handle: Handle, kind: EventKind<'a>) -> Self {
        Self { handle, kind }
    }
}

/// The kinds of event an engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    /// The broker accepted the connection.
    Connected,
    /// The connection to the broker was lost or closed.
    Disconnected,
    /// A message arrived on a subscribed topic.
    Data {
        /// Concrete topic the message was published on.
        topic: &'a str,
        /// Message payload.
        payload: &'a [u8],
        /// Packet identifier of the incoming publish (0 for QoS 0).
        message_id: MessageId,
    },
    /// The broker acknowledged a subscribe request.
    Subscribed {
        /// Message id of the acknowledged request.
        message_id: MessageId,
        /// SUBACK return code when the engine exposes it.
        return_code: Option<u8>,
    },
    /// The broker acknowledged an unsubscribe request.
    Unsubscribed {
        /// Message id of the acknowledged request.
        message_id: MessageId,
    },
    /// The broker acknowledged a QoS 1 or 2 publish.
    Published {
        /// Message id of the acknowledged publish.
        message_id: MessageId,
    },
    /// The engine hit a transport or protocol error.
    Error(ProtocolError),
}

/// Classification of an error reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// The engine signalled an error without a cause.
    None,
    /// The TCP/TLS transport failed.
    Transport {
        /// Socket level errno reported by the transport.
        errno: i32,
    },
    /// The broker refused the connection.
    ConnectionRefused(ConnectReturnCode),
    /// An error type the engine does not classify.
    Unknown(i32),
}

impl ProtocolError {
    /// Whether the failure happened below the MQTT layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Transport { .. })
    }
}

/// CONNACK return codes defined by MQTT 3.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted,
    /// The broker does not support the requested protocol level.
    UnacceptableProtocol,
    /// The client identifier is not allowed.
    IdentifierRejected,
    /// The MQTT service is unavailable.
    ServerUnavailable,
    /// Malformed or wrong user name or password.
    BadCredentials,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A code outside the 3.1.1 range.
    Unknown(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocol,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadCredentials,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Unknown(other),
        }
    }
}
