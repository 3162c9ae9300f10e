//! Subscription table and pending acknowledgement registry.
//!
//! The [`SubscriptionTable`] is the durable view of what the application wants
//! to receive: one [`SubscriptionRecord`] per distinct topic filter, holding
//! the callbacks and the broker's acknowledgement state. The
//! [`PendingRegistry`] is transient: it remembers which subscribe request id
//! belongs to which filter until the SUBACK arrives or the connection drops.
//!
//! Both are fixed-capacity `heapless` collections sized by the owning client.

use core::fmt;

use heapless::{String, Vec};

use super::QoS;
use super::topic;
use crate::network::MessageId;
use crate::network::error::Error;

/// Maximum topic filter length stored by the bridge.
pub const MAX_TOPIC_LEN: usize = 256;

/// Fixed-capacity topic buffer.
pub type Topic = String<MAX_TOPIC_LEN>;

/// Numeric QoS code reported for a topic that has no subscription record.
pub const QOS_NOT_FOUND: i16 = -2;

/// Callback receiving only the payload of a matching message.
pub type MessageHandler<'a> = &'a (dyn Fn(&[u8]) + Sync);

/// Callback receiving the concrete topic and the payload of a matching message.
pub type TopicMessageHandler<'a> = &'a (dyn Fn(&str, &[u8]) + Sync);

/// One of the two callback shapes a subscription can register.
#[derive(Clone, Copy)]
pub enum Callback<'a> {
    /// Payload-only callback.
    Message(MessageHandler<'a>),
    /// Topic and payload callback.
    TopicMessage(TopicMessageHandler<'a>),
}

impl fmt::Debug for Callback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Message(_) => f.write_str("Callback::Message"),
            Callback::TopicMessage(_) => f.write_str("Callback::TopicMessage"),
        }
    }
}

/// Acknowledgement state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GrantedQos {
    /// No acknowledgement received yet.
    Pending,
    /// The broker accepted the subscription at this QoS.
    Granted(QoS),
    /// The broker refused the subscription.
    Rejected,
}

impl GrantedQos {
    /// Numeric code for [`GrantedQos::Pending`].
    pub const PENDING_CODE: i16 = -1;
    /// Numeric code for [`GrantedQos::Rejected`], the SUBACK failure value.
    pub const REJECTED_CODE: i16 = 0x80;

    /// Interpret a SUBACK return code.
    ///
    /// `0..=2` is a granted QoS; `0x80` and any other value are treated as a
    /// refusal.
    pub fn from_return_code(code: u8) -> Self {
        match QoS::try_from(code) {
            Ok(qos) => GrantedQos::Granted(qos),
            Err(_) => GrantedQos::Rejected,
        }
    }

    /// Numeric representation: `-1` pending, `0..=2` granted, `0x80` rejected.
    pub fn code(self) -> i16 {
        match self {
            GrantedQos::Pending => Self::PENDING_CODE,
            GrantedQos::Granted(qos) => qos as i16,
            GrantedQos::Rejected => Self::REJECTED_CODE,
        }
    }
}

/// What the application wants to receive on one topic filter.
pub struct SubscriptionRecord<'a> {
    pattern: Topic,
    on_message: Option<MessageHandler<'a>>,
    on_message_with_topic: Option<TopicMessageHandler<'a>>,
    confirmed: bool,
    granted_qos: GrantedQos,
}

impl<'a> SubscriptionRecord<'a> {
    fn new(pattern: Topic, callback: Callback<'a>) -> Self {
        let mut record = Self {
            pattern,
            on_message: None,
            on_message_with_topic: None,
            confirmed: false,
            granted_qos: GrantedQos::Pending,
        };
        record.set_callback(callback);
        record
    }

    /// The topic filter this record was created for.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether the engine has acknowledged the latest subscribe request.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Acknowledgement state of the latest subscribe request.
    pub fn granted_qos(&self) -> GrantedQos {
        self.granted_qos
    }

    /// Whether a payload-only callback is registered.
    pub fn has_message_callback(&self) -> bool {
        self.on_message.is_some()
    }

    /// Whether a topic and payload callback is registered.
    pub fn has_topic_message_callback(&self) -> bool {
        self.on_message_with_topic.is_some()
    }

    /// Copy of both callback slots.
    pub fn callbacks(&self) -> (Option<MessageHandler<'a>>, Option<TopicMessageHandler<'a>>) {
        (self.on_message, self.on_message_with_topic)
    }

    /// Whether a concrete topic matches this record's filter.
    pub fn matches(&self, topic: &str) -> bool {
        topic::matches(self.pattern(), topic)
    }

    // Only the slot matching the callback shape is replaced.
    fn set_callback(&mut self, callback: Callback<'a>) {
        match callback {
            Callback::Message(handler) => self.on_message = Some(handler),
            Callback::TopicMessage(handler) => self.on_message_with_topic = Some(handler),
        }
    }

    fn reset(&mut self) {
        self.confirmed = false;
        self.granted_qos = GrantedQos::Pending;
    }

    fn confirm(&mut self, granted: GrantedQos) {
        self.confirmed = true;
        self.granted_qos = granted;
    }
}

impl fmt::Debug for SubscriptionRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("pattern", &self.pattern)
            .field("on_message", &self.on_message.is_some())
            .field("on_message_with_topic", &self.on_message_with_topic.is_some())
            .field("confirmed", &self.confirmed)
            .field("granted_qos", &self.granted_qos)
            .finish()
    }
}

/// Ordered collection of subscription records, at most one per pattern.
#[derive(Debug)]
pub struct SubscriptionTable<'a, const N: usize> {
    records: Vec<SubscriptionRecord<'a>, N>,
}

impl<'a, const N: usize> SubscriptionTable<'a, N> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `pattern` can be upserted without exceeding the capacity.
    pub fn has_room_for(&self, pattern: &str) -> bool {
        !self.records.is_full() || self.get(pattern).is_some()
    }

    /// Look up the record for an exact pattern.
    pub fn get(&self, pattern: &str) -> Option<&SubscriptionRecord<'a>> {
        self.records.iter().find(|record| record.pattern() == pattern)
    }

    /// Iterate over records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionRecord<'a>> {
        self.records.iter()
    }

    /// Records whose filter matches a concrete topic, in table order.
    pub fn matching<'t>(
        &'t self,
        topic: &'t str,
    ) -> impl Iterator<Item = &'t SubscriptionRecord<'a>> + 't {
        self.records.iter().filter(move |record| record.matches(topic))
    }

    /// Create or refresh the record for `pattern`.
    ///
    /// A new record starts unconfirmed. An existing record is reset to
    /// unconfirmed and only the callback slot of the given shape is replaced,
    /// so a payload callback and a topic callback can coexist on one filter.
    pub fn upsert(&mut self, pattern: &str, callback: Callback<'a>) -> Result<(), Error> {
        if let Some(record) = self.get_mut(pattern) {
            record.reset();
            record.set_callback(callback);
            return Ok(());
        }

        let pattern = Topic::try_from(pattern).map_err(|_| Error::TopicTooLong)?;
        self.records
            .push(SubscriptionRecord::new(pattern, callback))
            .map_err(|_| Error::CapacityExceeded)
    }

    /// Remove and return the record for an exact pattern.
    pub fn remove(&mut self, pattern: &str) -> Option<SubscriptionRecord<'a>> {
        let index = self
            .records
            .iter()
            .position(|record| record.pattern() == pattern)?;
        Some(self.records.remove(index))
    }

    /// Mark the record for `pattern` as acknowledged.
    ///
    /// Returns `false` when no such record exists, for example because it was
    /// unsubscribed while the request was in flight.
    pub fn confirm(&mut self, pattern: &str, granted: GrantedQos) -> bool {
        match self.get_mut(pattern) {
            Some(record) => {
                record.confirm(granted);
                true
            }
            None => false,
        }
    }

    /// Mark every record as unacknowledged, keeping patterns and callbacks.
    pub fn reset_all(&mut self) {
        self.records.iter_mut().for_each(SubscriptionRecord::reset);
    }

    fn get_mut(&mut self, pattern: &str) -> Option<&mut SubscriptionRecord<'a>> {
        self.records
            .iter_mut()
            .find(|record| record.pattern() == pattern)
    }
}

impl<const N: usize> Default for SubscriptionTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscribe request waiting for its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Message id returned by the engine for the subscribe request.
    pub request_id: MessageId,
    /// Topic filter the request was issued for.
    pub pattern: Topic,
    /// QoS that was requested.
    pub requested_qos: QoS,
}

/// Outstanding subscribe requests in issue order.
///
/// The engine may acknowledge a request before the client has registered it.
/// Such acknowledgements are parked, oldest evicted first, and handed back
/// when the matching request is registered.
///
/// Request ids are only meaningful within one engine session, so the whole
/// registry is dropped whenever the connection is (re)established or lost.
#[derive(Debug)]
pub struct PendingRegistry<const N: usize> {
    requests: Vec<PendingRequest, N>,
    parked: Vec<(MessageId, GrantedQos), N>,
}

impl<const N: usize> PendingRegistry<N> {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
            parked: Vec::new(),
        }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Whether another request can be tracked.
    pub fn is_full(&self) -> bool {
        self.requests.is_full()
    }

    /// Track a new request.
    pub fn push(&mut self, request: PendingRequest) -> Result<(), Error> {
        self.requests
            .push(request)
            .map_err(|_| Error::CapacityExceeded)
    }

    /// Remove and return the first request with the given id.
    pub fn take(&mut self, request_id: MessageId) -> Option<PendingRequest> {
        let index = self
            .requests
            .iter()
            .position(|request| request.request_id == request_id)?;
        Some(self.requests.remove(index))
    }

    /// Iterate over outstanding requests in issue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.iter()
    }

    /// Keep an acknowledgement that matched no outstanding request.
    pub fn park(&mut self, request_id: MessageId, granted: GrantedQos) {
        if N == 0 {
            return;
        }
        if self.parked.is_full() {
            self.parked.remove(0);
        }
        // Cannot fail: a slot was freed above.
        let _ = self.parked.push((request_id, granted));
    }

    /// Remove and return a parked acknowledgement for `request_id`.
    pub fn take_parked(&mut self, request_id: MessageId) -> Option<GrantedQos> {
        let index = self
            .parked
            .iter()
            .position(|(id, _)| *id == request_id)?;
        Some(self.parked.remove(index).1)
    }

    /// Forget every outstanding request and parked acknowledgement.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.parked.clear();
    }
}

impl<const N: usize> Default for PendingRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
