// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end scenarios driving a real broker with the companion client
//! crate: basic pub/sub, retained-message replay, and will delivery on an
//! abnormal disconnect. Mirrors the shape of `hebo`'s bin-level smoke
//! tests but exercised through `mqtt_client` instead of raw sockets.

use std::time::Duration;

use mqtt_broker::config::Config;
use mqtt_broker::plugin::{AllowAllAcl, AllowAllAuth, PluginHost};
use mqtt_broker::{dispatcher, server};
use mqtt_client::{Client, ConnectOptions, Event, QoS};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const DISPATCHER_CHANNEL_CAPACITY: usize = 256;

/// Spins up a broker bound to `addr` and returns a shutdown handle. The
/// broker task is aborted (not gracefully drained) when the handle drops,
/// which is fine for test teardown.
struct TestBroker {
    shutdown_tx: watch::Sender<bool>,
    server_task: tokio::task::JoinHandle<()>,
    dispatcher_task: tokio::task::JoinHandle<()>,
}

impl TestBroker {
    async fn start(addr: &str) -> Self {
        let toml = format!(
            r#"
            [[listeners]]
            address = "{addr}"
            keep_alive = 2
            "#
        );
        let config = Config::from_toml(&toml).unwrap();

        let plugins = PluginHost::new(Box::new(AllowAllAuth), vec![Box::new(AllowAllAcl)], 1000);
        let (dispatcher_tx, dispatcher_rx) = mpsc::channel(DISPATCHER_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher_config = config.clone();
        let dispatcher_task = tokio::spawn(async move {
            dispatcher::Dispatcher::new(dispatcher_config, plugins, dispatcher_rx)
                .run()
                .await;
        });

        let server_task = tokio::spawn(async move {
            let _ = server::run(config, dispatcher_tx, shutdown_rx).await;
        });

        // Give the listener a moment to bind before clients dial it.
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            shutdown_tx,
            server_task,
            dispatcher_task,
        }
    }

    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.server_task.abort();
        self.dispatcher_task.abort();
    }
}

#[tokio::test]
async fn qos0_publish_is_delivered_to_subscriber() {
    let broker = TestBroker::start("127.0.0.1:18830").await;

    let (sub, mut sub_events) = Client::connect(
        ConnectOptions::new("127.0.0.1:18830").with_client_id("subscriber-1"),
    )
    .await
    .unwrap();
    assert!(matches!(sub_events.recv().await.unwrap(), Event::Connected { .. }));
    sub.subscribe(vec![("sensors/temp".to_string(), QoS::AtMostOnce)])
        .await
        .unwrap();

    let (publisher, mut pub_events) = Client::connect(
        ConnectOptions::new("127.0.0.1:18830").with_client_id("publisher-1"),
    )
    .await
    .unwrap();
    assert!(matches!(pub_events.recv().await.unwrap(), Event::Connected { .. }));
    publisher
        .publish("sensors/temp", b"21.5".to_vec(), QoS::AtMostOnce, false)
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), sub_events.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match event {
        Event::Message { topic, payload, qos, .. } => {
            assert_eq!(topic, "sensors/temp");
            assert_eq!(payload, b"21.5");
            assert_eq!(qos, QoS::AtMostOnce);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    broker.stop();
}

#[tokio::test]
async fn qos1_publish_is_acknowledged() {
    let broker = TestBroker::start("127.0.0.1:18831").await;

    let (client, mut events) =
        Client::connect(ConnectOptions::new("127.0.0.1:18831").with_client_id("qos1-client")).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Connected { .. }));

    client
        .subscribe(vec![("a/b".to_string(), QoS::AtLeastOnce)])
        .await
        .unwrap();
    client
        .publish("a/b", b"hello".to_vec(), QoS::AtLeastOnce, false)
        .await
        .unwrap();

    broker.stop();
}

#[tokio::test]
async fn retained_message_replays_to_new_subscriber() {
    let broker = TestBroker::start("127.0.0.1:18832").await;

    let (publisher, mut pub_events) =
        Client::connect(ConnectOptions::new("127.0.0.1:18832").with_client_id("retain-pub")).await.unwrap();
    assert!(matches!(pub_events.recv().await.unwrap(), Event::Connected { .. }));
    publisher
        .publish("home/status", b"online".to_vec(), QoS::AtMostOnce, true)
        .await
        .unwrap();

    // Give the dispatcher a moment to record the retained message before a
    // second client subscribes.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (subscriber, mut sub_events) =
        Client::connect(ConnectOptions::new("127.0.0.1:18832").with_client_id("retain-sub")).await.unwrap();
    assert!(matches!(sub_events.recv().await.unwrap(), Event::Connected { .. }));
    subscriber
        .subscribe(vec![("home/status".to_string(), QoS::AtMostOnce)])
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(5), sub_events.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match event {
        Event::Message { topic, payload, retain, .. } => {
            assert_eq!(topic, "home/status");
            assert_eq!(payload, b"online");
            assert!(retain);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    broker.stop();
}

#[tokio::test]
async fn will_message_fires_on_abnormal_disconnect() {
    let broker = TestBroker::start("127.0.0.1:18833").await;

    let (watcher, mut watcher_events) =
        Client::connect(ConnectOptions::new("127.0.0.1:18833").with_client_id("watcher")).await.unwrap();
    assert!(matches!(watcher_events.recv().await.unwrap(), Event::Connected { .. }));
    watcher
        .subscribe(vec![("clients/gone/status".to_string(), QoS::AtMostOnce)])
        .await
        .unwrap();

    let options = ConnectOptions::new("127.0.0.1:18833")
        .with_client_id("dying-client")
        .with_will("clients/gone/status", b"offline".to_vec(), QoS::AtMostOnce, false);
    let (dying, mut dying_events) = Client::connect(options).await.unwrap();
    assert!(matches!(dying_events.recv().await.unwrap(), Event::Connected { .. }));

    // Drop the client without sending DISCONNECT: the connection task sees
    // an abrupt TCP close, which the dispatcher treats as abnormal.
    drop(dying);
    drop(dying_events);

    let event = timeout(Duration::from_secs(5), watcher_events.recv())
        .await
        .expect("timed out waiting for will message")
        .expect("channel closed");
    match event {
        Event::Message { topic, payload, .. } => {
            assert_eq!(topic, "clients/gone/status");
            assert_eq!(payload, b"offline");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    broker.stop();
}
