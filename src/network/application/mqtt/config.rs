//! Connection configuration.
//!
//! [`Config`] stores every field the application may set before connecting.
//! Nothing is validated until [`Config::engine_config`] turns it into the
//! [`EngineConfig`] handed to the engine factory on connect.

use serde::Deserialize;

use super::QoS;
use crate::network::error::Error;

/// Default inbound and outbound buffer size in bytes.
pub const DEFAULT_PACKET_SIZE: u16 = 512;

/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECONDS: u16 = 120;

/// Message the broker publishes on the client's behalf when it drops off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LastWill<'a> {
    /// Topic the will is published on.
    pub topic: &'a str,
    /// Will payload.
    pub message: &'a str,
    /// QoS of the will message.
    pub qos: QoS,
    /// Whether the broker retains the will message.
    pub retain: bool,
}

impl<'a> LastWill<'a> {
    /// A QoS 0 will message.
    pub fn new(topic: &'a str, message: &'a str, retain: bool) -> Self {
        Self {
            topic,
            message,
            qos: QoS::AtMostOnce,
            retain,
        }
    }
}

/// Stored connection settings.
///
/// # Examples
///
/// ```rust
/// use iot_mqtt_bridge::network::application::mqtt::Config;
///
/// let config = Config::from_json(
///     r#"{"uri":"mqtts://broker.local:8883","client_name":"pump-7","max_in_packet_size":1024}"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.uri, Some("mqtts://broker.local:8883"));
/// assert_eq!(config.max_in_packet_size, 1024);
/// assert!(config.clean_session);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config<'a> {
    /// Broker URI, for example `mqtt://broker.local:1883`. Required.
    #[serde(borrow)]
    pub uri: Option<&'a str>,
    /// MQTT client identifier. The engine picks one when unset.
    #[serde(borrow)]
    pub client_name: Option<&'a str>,
    /// User name for broker authentication.
    #[serde(borrow)]
    pub username: Option<&'a str>,
    /// Password for broker authentication.
    #[serde(borrow)]
    pub password: Option<&'a str>,
    /// Optional last-will message.
    #[serde(borrow)]
    pub last_will: Option<LastWill<'a>>,
    /// Inbound buffer size; larger messages may be truncated by the engine.
    pub max_in_packet_size: u16,
    /// Outbound buffer size; larger publishes are refused by the engine.
    pub max_out_packet_size: u16,
    /// Keep-alive interval in seconds.
    pub keep_alive_seconds: u16,
    /// Start a clean session on every connect.
    pub clean_session: bool,
    /// Let the engine reconnect on its own after a connection loss.
    pub auto_reconnect: bool,
    /// Priority of the engine's background task.
    pub task_priority: Option<u8>,
    /// PEM encoded CA certificate used to verify the broker.
    #[serde(borrow)]
    pub ca_cert: Option<&'a str>,
    /// PEM encoded client certificate.
    #[serde(borrow)]
    pub client_cert: Option<&'a str>,
    /// PEM encoded client private key.
    #[serde(borrow)]
    pub client_key: Option<&'a str>,
    /// Log every subscribe, publish and incoming message.
    pub debug: bool,
}

impl<'a> Config<'a> {
    /// Parse a configuration from a JSON document.
    ///
    /// Missing fields keep their defaults. String values are borrowed from
    /// `json`, so they must not contain escape sequences.
    pub fn from_json(json: &'a str) -> Result<Self, Error> {
        serde_json_core::from_str::<Config<'a>>(json)
            .map(|(config, _)| config)
            .map_err(|_| Error::InvalidConfig)
    }

    /// Set the broker credentials.
    pub fn set_credentials(&mut self, username: &'a str, password: &'a str) {
        self.username = Some(username);
        self.password = Some(password);
    }

    /// Set both the inbound and the outbound buffer size.
    pub fn set_max_packet_size(&mut self, size: u16) {
        self.max_in_packet_size = size;
        self.max_out_packet_size = size;
    }

    /// Ask the broker to keep the session across reconnects.
    pub fn disable_persistence(&mut self) {
        self.clean_session = false;
    }

    /// Register a QoS 0 last-will message.
    pub fn enable_last_will_message(&mut self, topic: &'a str, message: &'a str, retain: bool) {
        self.last_will = Some(LastWill::new(topic, message, retain));
    }

    /// Build the engine configuration.
    ///
    /// # Errors
    ///
    /// * [`Error::MissingUri`] - No broker URI was set
    pub fn engine_config(&self) -> Result<EngineConfig<'a>, Error> {
        let uri = self.uri.ok_or(Error::MissingUri)?;

        Ok(EngineConfig {
            uri,
            client_id: self.client_name,
            username: self.username,
            password: self.password,
            last_will: self.last_will,
            buffer_size: self.max_in_packet_size,
            out_buffer_size: self.max_out_packet_size,
            keep_alive_seconds: self.keep_alive_seconds,
            disable_clean_session: !self.clean_session,
            disable_auto_reconnect: !self.auto_reconnect,
            task_priority: self.task_priority,
            ca_cert: self.ca_cert,
            client_cert: self.client_cert,
            client_key: self.client_key,
        })
    }
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            uri: None,
            client_name: None,
            username: None,
            password: None,
            last_will: None,
            max_in_packet_size: DEFAULT_PACKET_SIZE,
            max_out_packet_size: DEFAULT_PACKET_SIZE,
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            clean_session: true,
            auto_reconnect: true,
            task_priority: None,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            debug: false,
        }
    }
}

/// Validated configuration handed to [`Connect::connect`](crate::network::Connect::connect).
///
/// Field names follow the engine's vocabulary rather than the application's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig<'a> {
    /// Broker URI.
    pub uri: &'a str,
    /// MQTT client identifier.
    pub client_id: Option<&'a str>,
    /// User name for broker authentication.
    pub username: Option<&'a str>,
    /// Password for broker authentication.
    pub password: Option<&'a str>,
    /// Last-will message.
    pub last_will: Option<LastWill<'a>>,
    /// Inbound buffer size in bytes.
    pub buffer_size: u16,
    /// Outbound buffer size in bytes.
    pub out_buffer_size: u16,
    /// Keep-alive interval in seconds.
    pub keep_alive_seconds: u16,
    /// Resume the previous session instead of starting clean.
    pub disable_clean_session: bool,
    /// Do not reconnect automatically after a connection loss.
    pub disable_auto_reconnect: bool,
    /// Priority of the engine's background task.
    pub task_priority: Option<u8>,
    /// PEM encoded CA certificate.
    pub ca_cert: Option<&'a str>,
    /// PEM encoded client certificate.
    pub client_cert: Option<&'a str>,
    /// PEM encoded client private key.
    pub client_key: Option<&'a str>,
}
