//! Connection façade and event dispatcher.
//!
//! [`Client`] is the object the application talks to. It owns the
//! subscription table, the pending acknowledgement registry and the live
//! engine, and it is also the sink the engine reports to through
//! [`Client::on_event`].
//!
//! # Concurrency
//!
//! The engine usually delivers events from its own task while the
//! application calls in from another. Every piece of shared state sits in a
//! `critical_section::Mutex<RefCell<_>>`, so all methods take `&self` and a
//! client can be shared between both sides. Critical sections only cover
//! bookkeeping. Engine requests run outside them with the engine leased out
//! of its slot, so an engine that holds its own lock while reporting events
//! cannot deadlock against the client. A second request issued while the
//! engine is leased fails with [`Error::Busy`]. User callbacks are copied out
//! first and run with no lock held, so they may call back into the client.
//!
//! # Examples
//!
//! ```rust,no_run
//! use iot_mqtt_bridge::network::application::mqtt::{Client, Config, Event, EventKind, QoS};
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
//! let on_command = |topic: &str, payload: &[u8]| {
//!     let _ = (topic, payload);
//! };
//!
//! let mut config = Config::default();
//! config.uri = Some("mqtt://broker.local:1883");
//!
//! let client: Client<'_, EspFactory, 8> = Client::new(EspFactory, config);
//! client.connect()?;
//! let request = client.subscribe_with_topic("devices/42/cmd/#", &on_command, QoS::AtLeastOnce)?;
//!
//! // Called from the engine's event task:
//! client.on_event(Event::new(Handle(1), EventKind::Connected));
//! client.on_event(Event::new(
//!     Handle(1),
//!     EventKind::Subscribed { message_id: request, return_code: Some(1) },
//! ));
//! assert!(client.is_subscription_confirmed("devices/42/cmd/#"));
//!
//! client.publish("devices/42/status", b"online", QoS::AtMostOnce, true)?;
//! # Ok::<(), iot_mqtt_bridge::network::error::Error>(())
//! ```

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Vec;
use serde::Deserialize;

use super::config::{Config, EngineConfig};
use super::event::{Event, EventKind, ProtocolError};
use super::subscription::{
    Callback, GrantedQos, MessageHandler, PendingRegistry, PendingRequest, QOS_NOT_FOUND,
    SubscriptionTable, Topic, TopicMessageHandler,
};
use crate::network::error::Error;
use crate::network::{Connect, Engine, Handle, MessageId};

/// Default number of subscriptions (and in-flight subscribe requests) a
/// client can track.
pub const DEFAULT_CAPACITY: usize = 16;

/// Fixed framing overhead added to topic and payload when estimating whether
/// an incoming message filled the inbound buffer.
const PACKET_OVERHEAD: usize = 9;

/// Quality of Service levels for MQTT messages.
///
/// # Examples
///
/// ```rust
/// use iot_mqtt_bridge::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(try_from = "u8")]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery. Duplicates can occur.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidQos),
        }
    }
}

/// Hook invoked with the engine handle once the broker accepts the connection.
pub type ConnectHook<'a> = &'a (dyn Fn(Handle) + Sync);

/// Hook invoked when a subscribe request is acknowledged.
pub type SubscribeAckHook<'a> = &'a (dyn Fn(MessageId, &str, GrantedQos) + Sync);

type Delivery<'a> = (Option<MessageHandler<'a>>, Option<TopicMessageHandler<'a>>);

type Acknowledgement<'a> = (Topic, GrantedQos, Option<SubscribeAckHook<'a>>);

struct State<'a, const N: usize> {
    table: SubscriptionTable<'a, N>,
    pending: PendingRegistry<N>,
    connected: bool,
    handle: Option<Handle>,
    on_message: Option<TopicMessageHandler<'a>>,
    on_connect: Option<ConnectHook<'a>>,
    on_subscribe_ack: Option<SubscribeAckHook<'a>>,
}

impl<const N: usize> State<'_, N> {
    const fn new() -> Self {
        Self {
            table: SubscriptionTable::new(),
            pending: PendingRegistry::new(),
            connected: false,
            handle: None,
            on_message: None,
            on_connect: None,
            on_subscribe_ack: None,
        }
    }

    fn connection_lost(&mut self) {
        self.connected = false;
        self.table.reset_all();
        self.pending.clear();
    }
}

/// A value that can be lent out of its cell for the duration of a call.
struct Slot<T> {
    value: Option<T>,
    leased: bool,
}

impl<T> Slot<T> {
    const fn new(value: Option<T>) -> Self {
        Self {
            value,
            leased: false,
        }
    }

    fn lease(&mut self) -> Result<T, Error> {
        if self.leased {
            return Err(Error::Busy);
        }
        let value = self.value.take().ok_or(Error::NotStarted)?;
        self.leased = true;
        Ok(value)
    }

    fn release(&mut self, value: T) {
        self.value = Some(value);
        self.leased = false;
    }

    fn take(&mut self) -> Result<Option<T>, Error> {
        if self.leased {
            return Err(Error::Busy);
        }
        Ok(self.value.take())
    }

    fn put(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }
}

/// MQTT bridge between application code and a protocol engine.
///
/// # Type Parameters
///
/// * `C` - Factory creating the engine on [`connect`](Client::connect)
/// * `N` - Capacity of the subscription table and of the pending registry
pub struct Client<'a, C: Connect, const N: usize = DEFAULT_CAPACITY> {
    config: Config<'a>,
    connector: Mutex<RefCell<Slot<C>>>,
    engine: Mutex<RefCell<Slot<C::Engine>>>,
    state: Mutex<RefCell<State<'a, N>>>,
}

impl<'a, C: Connect, const N: usize> Client<'a, C, N> {
    /// Create a disconnected client.
    pub fn new(connector: C, config: Config<'a>) -> Self {
        Self {
            config,
            connector: Mutex::new(RefCell::new(Slot::new(Some(connector)))),
            engine: Mutex::new(RefCell::new(Slot::new(None))),
            state: Mutex::new(RefCell::new(State::new())),
        }
    }

    /// Stored configuration.
    pub fn config(&self) -> &Config<'a> {
        &self.config
    }

    /// Mutable access to the stored configuration. Changes apply on the next
    /// [`connect`](Client::connect).
    pub fn config_mut(&mut self) -> &mut Config<'a> {
        &mut self.config
    }

    /// Configured broker URI.
    pub fn uri(&self) -> Option<&'a str> {
        self.config.uri
    }

    /// Configured client identifier.
    pub fn client_name(&self) -> Option<&'a str> {
        self.config.client_name
    }

    /// Create and start a new engine from the stored configuration.
    ///
    /// An engine left over from a previous call is stopped and destroyed
    /// first. Subscriptions survive but are marked unacknowledged.
    ///
    /// # Errors
    ///
    /// * [`Error::MissingUri`] - No broker URI is configured
    /// * [`Error::EngineInit`] - The factory could not create an engine
    /// * [`Error::EngineStart`] - The engine was created but did not start
    /// * [`Error::EngineStop`] - The previous engine could not be torn down
    /// * [`Error::Busy`] - Another connect or engine request is in progress
    pub fn connect(&self) -> Result<(), Error> {
        let engine_config = self.config.engine_config().inspect_err(|_| {
            error!("Cannot connect: broker URI is not set");
        })?;

        let mut connector = critical_section::with(|cs| self.connector.borrow_ref_mut(cs).lease())
            .inspect_err(|_| {
                error!("Cannot connect: another connect is in progress");
            })?;
        let result = self.restart(&mut connector, &engine_config);
        critical_section::with(|cs| self.connector.borrow_ref_mut(cs).release(connector));
        result
    }

    fn restart(&self, connector: &mut C, engine_config: &EngineConfig<'_>) -> Result<(), Error> {
        self.teardown()?;

        let mut engine = connector.connect(engine_config).map_err(|_| {
            error!("Failed to create the MQTT engine");
            Error::EngineInit
        })?;

        let handle = engine.handle();
        // Register the handle first so events raised while starting are accepted.
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).handle = Some(handle));

        if engine.start().is_err() {
            error!("Failed to start the MQTT engine");
            critical_section::with(|cs| self.state.borrow_ref_mut(cs).handle = None);
            if engine.destroy().is_err() {
                error!("Failed to release the MQTT engine");
            }
            return Err(Error::EngineStart);
        }

        let stale = critical_section::with(|cs| self.engine.borrow_ref_mut(cs).put(engine));
        if let Some(stale) = stale {
            warn!("Replacing an engine installed concurrently");
            if stale.destroy().is_err() {
                error!("Failed to release the MQTT engine");
            }
        }
        if self.config.debug {
            info!("MQTT engine started for {}", engine_config.uri);
        }
        Ok(())
    }

    /// Stop and destroy the engine. Calling it without an engine is a no-op.
    ///
    /// # Errors
    ///
    /// * [`Error::EngineStop`] - The engine reported a failure while stopping
    /// * [`Error::Busy`] - An engine request is in progress
    pub fn disconnect(&self) -> Result<(), Error> {
        self.teardown()
    }

    /// Whether the broker connection is currently up.
    pub fn is_connected(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).connected)
    }

    /// Override the connectivity flag.
    ///
    /// Intended for tests and for engines that report connectivity out of
    /// band.
    pub fn set_connection_state(&self, connected: bool) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).connected = connected);
    }

    /// Whether `handle` identifies this client's current engine.
    pub fn is_my_turn(&self, handle: Handle) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).handle == Some(handle))
    }

    /// Publish a message.
    ///
    /// # Errors
    ///
    /// * [`Error::NotConnected`] - The broker connection is down; the engine is not asked
    /// * [`Error::NotStarted`] - No engine exists
    /// * [`Error::Rejected`] - The engine refused the request
    /// * [`Error::Busy`] - Another engine request is in progress
    pub fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Error> {
        let result = if self.is_connected() {
            self.with_engine(|engine| engine.publish(topic, payload, qos, retain))
                .and_then(|sent| sent.map_err(|_| Error::Rejected))
        } else {
            Err(Error::NotConnected)
        };

        match result {
            Ok(message_id) => {
                if self.config.debug {
                    debug!("Published to {} (id {})", topic, message_id);
                }
            }
            Err(err) => error!("Failed to publish to {}: {:?}", topic, err),
        }
        result
    }

    /// Subscribe with a callback receiving only the payload.
    ///
    /// Returns the message id of the subscribe request. See
    /// [`subscribe_with_topic`](Client::subscribe_with_topic) for the
    /// details shared by both forms.
    pub fn subscribe(
        &self,
        topic: &str,
        callback: MessageHandler<'a>,
        qos: QoS,
    ) -> Result<MessageId, Error> {
        self.subscribe_callback(topic, Callback::Message(callback), qos)
    }

    /// Subscribe with a callback receiving the concrete topic and the payload.
    ///
    /// The request is forwarded to the engine whenever one exists, even if the
    /// connection is down. Only when the engine accepts it is the
    /// subscription recorded: a new record starts unacknowledged, an existing
    /// one is reset to unacknowledged and only the callback slot of this
    /// shape is replaced.
    ///
    /// # Errors
    ///
    /// * [`Error::TopicTooLong`] - The filter does not fit the topic buffer
    /// * [`Error::CapacityExceeded`] - The table or the pending registry is full
    /// * [`Error::NotStarted`] - No engine exists
    /// * [`Error::Rejected`] - The engine refused the request
    /// * [`Error::Busy`] - Another engine request is in progress
    pub fn subscribe_with_topic(
        &self,
        topic: &str,
        callback: TopicMessageHandler<'a>,
        qos: QoS,
    ) -> Result<MessageId, Error> {
        self.subscribe_callback(topic, Callback::TopicMessage(callback), qos)
    }

    fn subscribe_callback(
        &self,
        topic: &str,
        callback: Callback<'a>,
        qos: QoS,
    ) -> Result<MessageId, Error> {
        let pattern = Topic::try_from(topic).map_err(|_| {
            error!("Subscribe topic too long ({} bytes)", topic.len());
            Error::TopicTooLong
        })?;

        let result = self.register_subscription(topic, pattern, callback, qos);
        match &result {
            Ok((request_id, _)) => {
                if self.config.debug {
                    debug!("Subscribe sent for {} (id {})", topic, request_id);
                }
            }
            Err(err) => error!("Failed to subscribe to {}: {:?}", topic, err),
        }
        let (request_id, early_ack) = result?;

        if let Some((pattern, granted, hook)) = early_ack {
            self.acknowledged(request_id, &pattern, granted, hook);
        }
        Ok(request_id)
    }

    fn register_subscription(
        &self,
        topic: &str,
        pattern: Topic,
        callback: Callback<'a>,
        qos: QoS,
    ) -> Result<(MessageId, Option<Acknowledgement<'a>>), Error> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            if !state.table.has_room_for(topic) || state.pending.is_full() {
                return Err(Error::CapacityExceeded);
            }
            Ok(())
        })?;

        let request_id = self
            .with_engine(|engine| engine.subscribe(topic, qos))?
            .map_err(|_| Error::Rejected)?;

        critical_section::with(|cs| -> Result<_, Error> {
            let mut state = self.state.borrow_ref_mut(cs);
            state.table.upsert(topic, callback)?;
            // The engine may have acknowledged before the request got here.
            if let Some(granted) = state.pending.take_parked(request_id) {
                state.table.confirm(topic, granted);
                let hook = state.on_subscribe_ack;
                return Ok((request_id, Some((pattern, granted, hook))));
            }
            state.pending.push(PendingRequest {
                request_id,
                pattern,
                requested_qos: qos,
            })?;
            Ok((request_id, None))
        })
    }

    /// Remove the subscription for an exact filter.
    ///
    /// Unsubscribing a filter that was never subscribed succeeds without
    /// contacting the engine.
    ///
    /// # Errors
    ///
    /// * [`Error::NotConnected`] - The broker connection is down
    /// * [`Error::NotStarted`] - No engine exists
    /// * [`Error::Rejected`] - The engine refused the request; the record is kept
    /// * [`Error::Busy`] - Another engine request is in progress
    pub fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let result = self.remove_subscription(topic);

        match result {
            Ok(Some(request_id)) => {
                if self.config.debug {
                    debug!("Unsubscribed from {} (id {})", topic, request_id);
                }
            }
            Ok(None) => {}
            Err(err) => error!("Failed to unsubscribe from {}: {:?}", topic, err),
        }
        result.map(|_| ())
    }

    fn remove_subscription(&self, topic: &str) -> Result<Option<MessageId>, Error> {
        let known = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            Ok(state.table.get(topic).is_some())
        })?;
        if !known {
            return Ok(None);
        }

        let request_id = self
            .with_engine(|engine| engine.unsubscribe(topic))?
            .map_err(|_| Error::Rejected)?;
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).table.remove(topic));
        Ok(Some(request_id))
    }

    /// Whether the broker accepted the latest subscribe request for `topic`.
    pub fn is_subscription_confirmed(&self, topic: &str) -> bool {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .table
                .get(topic)
                .is_some_and(|record| {
                    record.is_confirmed() && record.granted_qos() != GrantedQos::Rejected
                })
        })
    }

    /// Acknowledgement state of the subscription for `topic`, if any.
    pub fn subscription_qos(&self, topic: &str) -> Option<GrantedQos> {
        critical_section::with(|cs| {
            self.state
                .borrow_ref(cs)
                .table
                .get(topic)
                .map(|record| record.granted_qos())
        })
    }

    /// Numeric acknowledgement state of the subscription for `topic`.
    ///
    /// `-2` no subscription, `-1` not acknowledged yet, `0..=2` granted QoS,
    /// `0x80` rejected.
    pub fn subscription_qos_code(&self, topic: &str) -> i16 {
        self.subscription_qos(topic)
            .map_or(QOS_NOT_FOUND, GrantedQos::code)
    }

    /// Number of subscribed filters.
    pub fn subscription_count(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).table.len())
    }

    /// Visit every subscribed filter in table order with its acknowledgement
    /// state.
    ///
    /// One filter is copied out at a time and `f` runs with no lock held, so
    /// it may call back into the client. Re-subscribing keeps the table order;
    /// unsubscribing from within `f` may skip the filter that follows.
    ///
    /// Subscriptions are not replayed automatically after a reconnect; an
    /// application that needs them again can re-issue them from its connect
    /// hook.
    pub fn for_each_subscription(&self, mut f: impl FnMut(&str, GrantedQos)) {
        let mut index = 0;
        loop {
            let entry = critical_section::with(|cs| {
                let state = self.state.borrow_ref(cs);
                let record = state.table.iter().nth(index)?;
                let pattern = Topic::try_from(record.pattern()).ok()?;
                Some((pattern, record.granted_qos()))
            });
            let Some((pattern, granted)) = entry else {
                break;
            };
            f(pattern.as_str(), granted);
            index += 1;
        }
    }

    /// Register the catch-all callback, invoked for every incoming message
    /// before any subscription callback.
    pub fn set_on_message_callback(&self, callback: TopicMessageHandler<'a>) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).on_message = Some(callback));
    }

    /// Register the hook invoked when the broker accepts the connection.
    pub fn set_on_connect(&self, hook: ConnectHook<'a>) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).on_connect = Some(hook));
    }

    /// Register the hook invoked when a subscribe request is acknowledged.
    pub fn set_on_subscribe_ack(&self, hook: SubscribeAckHook<'a>) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).on_subscribe_ack = Some(hook));
    }

    /// Process one event reported by the engine.
    ///
    /// Events tagged with a handle other than the current engine's are
    /// dropped.
    pub fn on_event(&self, event: Event<'_>) {
        if !self.is_my_turn(event.handle) {
            if self.config.debug {
                debug!("Ignoring event from foreign engine {:?}", event.handle);
            }
            return;
        }

        match event.kind {
            EventKind::Connected => self.on_connected(event.handle),
            EventKind::Disconnected => self.on_disconnected(),
            EventKind::Data {
                topic,
                payload,
                message_id,
            } => self.on_data(topic, payload, message_id),
            EventKind::Subscribed {
                message_id,
                return_code,
            } => self.on_subscribed(message_id, return_code),
            EventKind::Unsubscribed { message_id } => {
                if self.config.debug {
                    debug!("Unsubscribe acknowledged (id {})", message_id);
                }
            }
            EventKind::Published { message_id } => {
                if self.config.debug {
                    debug!("Publish acknowledged (id {})", message_id);
                }
            }
            EventKind::Error(err) => log_protocol_error(err),
        }
    }

    fn on_connected(&self, handle: Handle) {
        let hook = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.pending.clear();
            state.connected = true;
            state.on_connect
        });

        if self.config.debug {
            info!("Connected to the MQTT broker");
        }
        if let Some(hook) = hook {
            hook(handle);
        }
    }

    fn on_disconnected(&self) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).connection_lost());
        warn!("Disconnected from the MQTT broker");
    }

    fn on_data(&self, topic: &str, payload: &[u8], message_id: MessageId) {
        if self.config.debug {
            debug!(
                "Message on {} ({} bytes, id {})",
                topic,
                payload.len(),
                message_id
            );
        }
        if topic.len() + payload.len() + PACKET_OVERHEAD >= self.config.max_in_packet_size as usize
        {
            warn!(
                "Message on {} may have been truncated, raise max_in_packet_size",
                topic
            );
        }

        let (catch_all, deliveries) = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            let deliveries: Vec<Delivery<'a>, N> = state
                .table
                .matching(topic)
                .map(|record| record.callbacks())
                .collect();
            (state.on_message, deliveries)
        });

        if let Some(on_message) = catch_all {
            on_message(topic, payload);
        }
        for (on_message, on_message_with_topic) in deliveries {
            if let Some(on_message) = on_message {
                on_message(payload);
            }
            if let Some(on_message_with_topic) = on_message_with_topic {
                on_message_with_topic(topic, payload);
            }
        }
    }

    fn on_subscribed(&self, message_id: MessageId, return_code: Option<u8>) {
        // Engines that do not expose the SUBACK payload are assumed to grant QoS 0.
        let granted = return_code.map_or(
            GrantedQos::Granted(QoS::AtMostOnce),
            GrantedQos::from_return_code,
        );

        let acknowledged = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let Some(request) = state.pending.take(message_id) else {
                state.pending.park(message_id, granted);
                return None;
            };
            if !state.table.confirm(&request.pattern, granted) {
                warn!(
                    "Acknowledged subscription {} no longer exists",
                    request.pattern.as_str()
                );
            }
            Some((request.pattern, state.on_subscribe_ack))
        });

        match acknowledged {
            Some((pattern, hook)) => self.acknowledged(message_id, &pattern, granted, hook),
            None => warn!("Subscribe acknowledgement for unknown id {}", message_id),
        }
    }

    fn acknowledged(
        &self,
        message_id: MessageId,
        pattern: &Topic,
        granted: GrantedQos,
        hook: Option<SubscribeAckHook<'a>>,
    ) {
        if granted == GrantedQos::Rejected {
            error!("Broker rejected subscription to {}", pattern.as_str());
        } else if self.config.debug {
            debug!("Subscribed to {} with {:?}", pattern.as_str(), granted);
        }
        if let Some(hook) = hook {
            hook(message_id, pattern.as_str(), granted);
        }
    }

    /// Run `f` against the engine with no critical section held.
    fn with_engine<R>(&self, f: impl FnOnce(&mut C::Engine) -> R) -> Result<R, Error> {
        let mut engine = critical_section::with(|cs| self.engine.borrow_ref_mut(cs).lease())?;
        let result = f(&mut engine);
        critical_section::with(|cs| self.engine.borrow_ref_mut(cs).release(engine));
        Ok(result)
    }

    fn teardown(&self) -> Result<(), Error> {
        let engine = critical_section::with(|cs| {
            let engine = self.engine.borrow_ref_mut(cs).take()?;
            let mut state = self.state.borrow_ref_mut(cs);
            state.handle = None;
            state.connection_lost();
            Ok::<_, Error>(engine)
        })
        .inspect_err(|_| {
            error!("Cannot stop the MQTT engine while a request is in progress");
        })?;

        let Some(mut engine) = engine else {
            return Ok(());
        };
        let stopped = engine.stop();
        let destroyed = engine.destroy();
        if stopped.is_err() || destroyed.is_err() {
            error!("Failed to stop the MQTT engine");
            return Err(Error::EngineStop);
        }
        if self.config.debug {
            info!("MQTT engine stopped");
        }
        Ok(())
    }
}

fn log_protocol_error(err: ProtocolError) {
    match err {
        ProtocolError::Transport { errno } => {
            error!("Transport error (errno {})", errno);
        }
        ProtocolError::ConnectionRefused(code) => {
            error!("Connection refused by the broker: {:?}", code);
        }
        ProtocolError::None => warn!("Engine reported an error without a cause"),
        ProtocolError::Unknown(kind) => error!("Unknown engine error type {}", kind),
    }
}

impl<C: Connect, const N: usize> Drop for Client<'_, C, N> {
    fn drop(&mut self) {
        // Failures are already logged by `teardown`.
        let _ = self.teardown();
    }
}

impl<C: Connect, const N: usize> fmt::Debug for Client<'_, C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            f.debug_struct("Client")
                .field("config", &self.config)
                .field("connected", &state.connected)
                .field("handle", &state.handle)
                .field("subscriptions", &state.table.len())
                .field("pending", &state.pending.len())
                .finish()
        })
    }
}
