//! MQTT subscription lifecycle and message routing.
//!
//! The wire protocol belongs to the engine. This module keeps the state the
//! engine does not: which filters the application subscribed to, which
//! callbacks they carry, whether the broker acknowledged them, and where each
//! incoming message has to go.
//!
//! # Building blocks
//!
//! - [`topic`]: wildcard matching of concrete topics against filters
//! - [`subscription`]: the subscription table and the pending acknowledgement
//!   registry
//! - [`event`]: the events an engine reports
//! - [`config`]: stored connection settings and the engine configuration
//! - [`client`]: the [`Client`] façade and event dispatcher
//!
//! # Message flow
//!
//! 1. [`Client::subscribe`] forwards the request to the engine and records the
//!    filter as unacknowledged together with the request id.
//! 2. The engine reports [`EventKind::Subscribed`]; the request id is matched
//!    back to the filter, which becomes confirmed with the granted QoS.
//! 3. Every [`EventKind::Data`] is handed to the catch-all callback and then
//!    to each subscription whose filter matches, in subscription order.
//! 4. [`EventKind::Disconnected`] marks every subscription unacknowledged and
//!    forgets all outstanding requests.

pub mod client;
pub mod config;
pub mod event;
pub mod subscription;
pub mod topic;

pub use client::{Client, ConnectHook, DEFAULT_CAPACITY, QoS, SubscribeAckHook};
pub use config::{Config, EngineConfig, LastWill};
pub use event::{ConnectReturnCode, Event, EventKind, ProtocolError};
pub use subscription::{
    Callback, GrantedQos, MAX_TOPIC_LEN, MessageHandler, SubscriptionRecord, Topic,
    TopicMessageHandler,
};
