use super::mock::*;
use iot_mqtt_bridge::network::application::mqtt::QoS;
use iot_mqtt_bridge::network::error::Error;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn ignore(_: &[u8]) {}

#[test]
fn test_subscribe_while_engine_reports_under_its_lock() {
    let (client, shared) = connected_client();
    let client: &'static TestClient<'static> = Box::leak(Box::new(client));

    let (locked_tx, locked_rx) = mpsc::channel();
    let engine_task = {
        let shared = shared.clone();
        thread::spawn(move || {
            let _api = shared.api_lock();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            client.on_event(data("a", b"x"));
        })
    };
    locked_rx.recv().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let _ = done_tx.send(client.subscribe("a", &ignore, QoS::AtMostOnce));
    });

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(3)), Ok(Ok(1)));
    engine_task.join().unwrap();
    assert_eq!(client.subscription_qos_code("a"), -1);
}

#[test]
fn test_requests_during_engine_call_report_busy() {
    let (client, shared) = connected_client();
    let client: &'static TestClient<'static> = Box::leak(Box::new(client));

    let api = shared.api_lock();
    let subscriber = thread::spawn(move || client.subscribe("a", &ignore, QoS::AtMostOnce));
    while shared.lock().subscribe_calls == 0 {
        thread::yield_now();
    }

    assert_eq!(
        client.publish("b", b"x", QoS::AtMostOnce, false),
        Err(Error::Busy)
    );
    assert_eq!(client.disconnect(), Err(Error::Busy));
    assert_eq!(client.connect(), Err(Error::Busy));
    assert!(client.is_connected());

    drop(api);
    assert_eq!(subscriber.join().unwrap(), Ok(1));
    assert_eq!(client.publish("b", b"x", QoS::AtMostOnce, false), Ok(2));
}
