use super::mock::*;
use iot_mqtt_bridge::network::application::mqtt::{
    ConnectReturnCode, Event, EventKind, GrantedQos, ProtocolError, QoS,
};
use iot_mqtt_bridge::network::{Handle, MessageId};
use std::sync::{Mutex, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_suback_confirms_with_granted_qos() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("a/b", &noop, QoS::ExactlyOnce).unwrap();
    assert!(!client.is_subscription_confirmed("a/b"));
    assert_eq!(client.subscription_qos_code("a/b"), -1);

    client.on_event(suback(id, Some(1)));

    assert!(client.is_subscription_confirmed("a/b"));
    assert_eq!(
        client.subscription_qos("a/b"),
        Some(GrantedQos::Granted(QoS::AtLeastOnce))
    );
    assert_eq!(client.subscription_qos_code("a/b"), 1);
}

#[test]
fn test_suback_without_return_code_grants_qos_zero() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("a/b", &noop, QoS::AtLeastOnce).unwrap();

    client.on_event(suback(id, None));

    assert!(client.is_subscription_confirmed("a/b"));
    assert_eq!(client.subscription_qos_code("a/b"), 0);
}

#[test]
fn test_rejected_subscription_is_not_confirmed() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("secret/#", &noop, QoS::AtMostOnce).unwrap();

    client.on_event(suback(id, Some(0x80)));

    assert!(!client.is_subscription_confirmed("secret/#"));
    assert_eq!(client.subscription_qos("secret/#"), Some(GrantedQos::Rejected));
    assert_eq!(client.subscription_qos_code("secret/#"), 0x80);
}

#[test]
fn test_unknown_topic_is_not_confirmed() {
    let (client, _shared) = connected_client();

    assert!(!client.is_subscription_confirmed("nothing/here"));
    assert_eq!(client.subscription_qos("nothing/here"), None);
    assert_eq!(client.subscription_qos_code("nothing/here"), -2);
}

#[test]
fn test_suback_with_unknown_id_changes_nothing() {
    let noop = |_: &[u8]| {};
    let acks = AtomicUsize::new(0);
    let on_ack = |_: MessageId, _: &str, _: GrantedQos| {
        acks.fetch_add(1, Ordering::SeqCst);
    };
    let (client, _shared) = connected_client();
    client.set_on_subscribe_ack(&on_ack);
    let id = client.subscribe("a/b", &noop, QoS::AtMostOnce).unwrap();

    client.on_event(suback(id + 100, Some(0)));

    assert!(!client.is_subscription_confirmed("a/b"));
    assert_eq!(client.subscription_qos_code("a/b"), -1);
    assert_eq!(acks.load(Ordering::SeqCst), 0);

    // The real acknowledgement still lands afterwards.
    client.on_event(suback(id, Some(0)));
    assert!(client.is_subscription_confirmed("a/b"));
}

#[test]
fn test_suback_is_consumed_once() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("a/b", &noop, QoS::AtLeastOnce).unwrap();
    client.on_event(suback(id, Some(1)));

    // Re-subscribing resets the record; a replayed ack for the old id is ignored.
    client.subscribe("a/b", &noop, QoS::AtLeastOnce).unwrap();
    client.on_event(suback(id, Some(1)));

    assert!(!client.is_subscription_confirmed("a/b"));
    assert_eq!(client.subscription_qos_code("a/b"), -1);
}

#[test]
fn test_suback_before_registration_confirms_on_subscribe() {
    let noop = |_: &[u8]| {};
    let seen: Mutex<Vec<(MessageId, String, GrantedQos)>> = Mutex::new(Vec::new());
    let on_ack = |id: MessageId, pattern: &str, granted: GrantedQos| {
        seen.lock().unwrap().push((id, pattern.to_string(), granted));
    };
    let (client, _shared) = connected_client();
    client.set_on_subscribe_ack(&on_ack);

    // The mock engine hands out id 1 to the next request.
    client.on_event(suback(1, Some(1)));
    let id = client.subscribe("a/b", &noop, QoS::AtLeastOnce).unwrap();

    assert_eq!(id, 1);
    assert!(client.is_subscription_confirmed("a/b"));
    assert_eq!(client.subscription_qos_code("a/b"), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, "a/b".to_string(), GrantedQos::Granted(QoS::AtLeastOnce))]
    );

    // The parked acknowledgement was consumed.
    client.subscribe("a/b", &noop, QoS::AtLeastOnce).unwrap();
    assert_eq!(client.subscription_qos_code("a/b"), -1);
}

#[test]
fn test_subscribe_ack_hook() {
    let noop = |_: &[u8]| {};
    let seen: Mutex<Vec<(MessageId, String, GrantedQos)>> = Mutex::new(Vec::new());
    let on_ack = |id: MessageId, pattern: &str, granted: GrantedQos| {
        seen.lock().unwrap().push((id, pattern.to_string(), granted));
    };
    let (client, _shared) = connected_client();
    client.set_on_subscribe_ack(&on_ack);

    let id = client.subscribe("sensors/#", &noop, QoS::ExactlyOnce).unwrap();
    client.on_event(suback(id, Some(2)));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            id,
            "sensors/#".to_string(),
            GrantedQos::Granted(QoS::ExactlyOnce)
        )]
    );
}

#[test]
fn test_disconnect_resets_subscriptions_and_pending() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let confirmed = client.subscribe("a", &noop, QoS::AtMostOnce).unwrap();
    let in_flight = client.subscribe("b", &noop, QoS::AtMostOnce).unwrap();
    client.on_event(suback(confirmed, Some(0)));

    client.on_event(event(EventKind::Disconnected));

    assert!(!client.is_connected());
    assert_eq!(client.subscription_qos_code("a"), -1);
    assert_eq!(client.subscription_qos_code("b"), -1);
    assert_eq!(client.subscription_count(), 2);

    // The registry was cleared, so the late ack no longer correlates.
    client.on_event(suback(in_flight, Some(0)));
    assert!(!client.is_subscription_confirmed("b"));
}

#[test]
fn test_connected_clears_pending_but_keeps_confirmations() {
    let noop = |_: &[u8]| {};
    let connects = AtomicUsize::new(0);
    let on_connect = |handle: Handle| {
        assert_eq!(handle, Handle(1));
        connects.fetch_add(1, Ordering::SeqCst);
    };
    let (client, _shared) = started_client();
    client.set_on_connect(&on_connect);
    let confirmed = client.subscribe("a", &noop, QoS::AtMostOnce).unwrap();
    let in_flight = client.subscribe("b", &noop, QoS::AtMostOnce).unwrap();
    client.on_event(suback(confirmed, Some(0)));

    client.on_event(event(EventKind::Connected));

    assert!(client.is_connected());
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert!(client.is_subscription_confirmed("a"));
    client.on_event(suback(in_flight, Some(0)));
    assert!(!client.is_subscription_confirmed("b"));
}

#[test]
fn test_end_to_end_single_level_routing() {
    let received: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
    let on_temperature = |payload: &[u8]| {
        received.lock().unwrap().push(payload.to_vec());
    };
    let (client, _shared) = connected_client();
    let id = client
        .subscribe("sensors/+/temp", &on_temperature, QoS::AtLeastOnce)
        .unwrap();
    client.on_event(suback(id, Some(1)));

    client.on_event(data("sensors/room1/temp", b"21.5"));
    client.on_event(data("sensors/room1/humidity/temp", b"99"));

    assert_eq!(*received.lock().unwrap(), vec![b"21.5".to_vec()]);
}

#[test]
fn test_delivery_order_and_callback_shapes() {
    let log: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let catch_all = |topic: &str, _: &[u8]| {
        log.lock().unwrap().push(format!("all:{topic}"));
    };
    let wide = |_: &[u8]| {
        log.lock().unwrap().push("wide".to_string());
    };
    let wide_with_topic = |topic: &str, _: &[u8]| {
        log.lock().unwrap().push(format!("wide:{topic}"));
    };
    let narrow = |_: &[u8]| {
        log.lock().unwrap().push("narrow".to_string());
    };
    let other = |_: &[u8]| {
        log.lock().unwrap().push("other".to_string());
    };
    let (client, _shared) = connected_client();
    client.set_on_message_callback(&catch_all);
    client.subscribe("home/#", &wide, QoS::AtMostOnce).unwrap();
    client.subscribe("garden/+", &other, QoS::AtMostOnce).unwrap();
    client
        .subscribe_with_topic("home/#", &wide_with_topic, QoS::AtMostOnce)
        .unwrap();
    client.subscribe("home/+/lamp", &narrow, QoS::AtMostOnce).unwrap();

    client.on_event(data("home/kitchen/lamp", b"on"));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "all:home/kitchen/lamp".to_string(),
            "wide".to_string(),
            "wide:home/kitchen/lamp".to_string(),
            "narrow".to_string(),
        ]
    );
}

#[test]
fn test_catch_all_sees_unmatched_messages() {
    let hits = AtomicUsize::new(0);
    let catch_all = |_: &str, _: &[u8]| {
        hits.fetch_add(1, Ordering::SeqCst);
    };
    let (client, _shared) = connected_client();
    client.set_on_message_callback(&catch_all);

    client.on_event(data("nobody/listens", b"x"));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_oversized_message_is_still_delivered() {
    let hits = AtomicUsize::new(0);
    let on_blob = |payload: &[u8]| {
        assert_eq!(payload.len(), 600);
        hits.fetch_add(1, Ordering::SeqCst);
    };
    let payload = vec![0u8; 600];
    let (client, _shared) = connected_client();
    client.subscribe("blob", &on_blob, QoS::AtMostOnce).unwrap();

    client.on_event(data("blob", &payload));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_foreign_handle_is_ignored() {
    let hits = AtomicUsize::new(0);
    let on_any = |_: &[u8]| {
        hits.fetch_add(1, Ordering::SeqCst);
    };
    let (client, _shared) = started_client();
    client.subscribe("#", &on_any, QoS::AtMostOnce).unwrap();

    assert!(!client.is_my_turn(Handle(7)));
    client.on_event(Event::new(Handle(7), EventKind::Connected));
    client.on_event(Event::new(
        Handle(7),
        EventKind::Data {
            topic: "a",
            payload: b"x",
            message_id: 0,
        },
    ));

    assert!(!client.is_connected());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_events_from_replaced_engine_are_ignored() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("a", &noop, QoS::AtMostOnce).unwrap();

    client.connect().unwrap();
    client.on_event(Event::new(Handle(2), EventKind::Connected));
    client.on_event(suback(id, Some(0)));
    client.on_event(event(EventKind::Disconnected));

    assert!(client.is_connected());
    assert!(!client.is_subscription_confirmed("a"));
}

#[test]
fn test_informational_events_do_not_mutate() {
    let noop = |_: &[u8]| {};
    let (client, _shared) = connected_client();
    let id = client.subscribe("a", &noop, QoS::AtMostOnce).unwrap();
    client.on_event(suback(id, Some(0)));

    client.on_event(event(EventKind::Published { message_id: 3 }));
    client.on_event(event(EventKind::Unsubscribed { message_id: 4 }));
    client.on_event(event(EventKind::Error(ProtocolError::Transport { errno: 104 })));
    client.on_event(event(EventKind::Error(ProtocolError::ConnectionRefused(
        ConnectReturnCode::BadCredentials,
    ))));
    client.on_event(event(EventKind::Error(ProtocolError::None)));
    client.on_event(event(EventKind::Error(ProtocolError::Unknown(42))));

    assert!(client.is_connected());
    assert!(client.is_subscription_confirmed("a"));
}

static REENTRANT: OnceLock<TestClient<'static>> = OnceLock::new();
static ECHOES: AtomicUsize = AtomicUsize::new(0);

fn ignore(_: &[u8]) {}

fn echo(payload: &[u8]) {
    if let Some(client) = REENTRANT.get() {
        client
            .publish("echo", payload, QoS::AtMostOnce, false)
            .unwrap();
        client
            .subscribe("late/topic", &ignore, QoS::AtMostOnce)
            .unwrap();
        ECHOES.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_callbacks_may_reenter_the_client() {
    let (client, shared) = connected_client();
    let client = REENTRANT.get_or_init(|| client);
    client.subscribe("ping", &echo, QoS::AtMostOnce).unwrap();

    client.on_event(data("ping", b"hi"));

    assert_eq!(ECHOES.load(Ordering::SeqCst), 1);
    assert_eq!(shared.lock().publish_count(), 1);
    assert_eq!(client.subscription_qos_code("late/topic"), -1);
}

#[test]
fn test_concurrent_delivery_and_subscription() {
    let hits = AtomicUsize::new(0);
    let on_reading = |_: &[u8]| {
        hits.fetch_add(1, Ordering::SeqCst);
    };
    let (client, _shared) = connected_client();
    client.subscribe("sensors/#", &on_reading, QoS::AtMostOnce).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..100 {
                client.on_event(data("sensors/room1/temp", b"20"));
            }
        });
        scope.spawn(|| {
            for i in 0..6 {
                let topic = format!("sensors/extra{i}");
                client.subscribe(&topic, &on_reading, QoS::AtMostOnce).unwrap();
            }
        });
    });

    // Messages on sensors/room1/temp only ever match the first filter.
    assert_eq!(hits.load(Ordering::SeqCst), 100);
    assert_eq!(client.subscription_count(), 7);
}
