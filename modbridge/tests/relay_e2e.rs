//! End-to-end tests: commands in over Zenoh, events out over Zenoh.
//!
//! Note: Zenoh requires multi-thread tokio runtime.
//! Each test uses a unique key prefix to avoid interference.

use std::sync::Arc;
use std::time::Duration;

use modbridge::config::ModbusBridgeConfig;
use modbridge::{BridgeCore, CommandRelay, SimulatedDevice, assemble, forward_events};
use modbridge_common::{
    BridgeCommand, BridgeEvent, CommandEnvelope, Format, KeyExprBuilder, ReadRequest,
    RegisterData, decode_auto, encode,
};
use modbridge_framework::{LivelinessManager, Publisher};

/// Generate a unique test prefix to avoid test interference.
fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{}", nanos)
}

struct TestBridge {
    keys: KeyExprBuilder,
    session: Arc<zenoh::Session>,
    relay: CommandRelay,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    _liveliness: LivelinessManager,
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn start_bridge() -> TestBridge {
    let prefix = unique_prefix();
    let config: ModbusBridgeConfig = json5::from_str(&format!(
        r#"{{ modbus: {{ key_prefix: "{}", cache: {{ poll_interval_ms: 20 }} }} }}"#,
        prefix
    ))
    .expect("Invalid config");

    let session = Arc::new(
        zenoh::open(zenoh::Config::default())
            .await
            .expect("Failed to open Zenoh session"),
    );
    let publisher = Publisher::new(session.clone(), prefix.clone(), Format::Json);
    let liveliness = LivelinessManager::new(session.clone(), prefix.clone())
        .await
        .expect("Failed to declare bridge token");
    let watcher = liveliness
        .watch_clients()
        .await
        .expect("Failed to watch clients");

    let BridgeCore {
        bridge,
        worker,
        scheduler,
    } = assemble(&config.modbus, Box::new(SimulatedDevice::new()));
    let events = bridge.emitter().subscribe();
    let relay = CommandRelay::new(bridge);

    let mut tasks = vec![
        tokio::spawn(worker.run()),
        tokio::spawn(forward_events(events, publisher.clone())),
        tokio::spawn(relay.clone().watch_clients(watcher)),
    ];
    if let Some(scheduler) = scheduler {
        tasks.push(tokio::spawn(scheduler.run()));
    }
    let commands = relay.clone();
    tasks.push(tokio::spawn(async move {
        commands
            .run_commands(publisher)
            .await
            .expect("Command relay failed");
    }));

    // Give subscribers time to set up
    tokio::time::sleep(Duration::from_millis(200)).await;

    TestBridge {
        keys: KeyExprBuilder::new(prefix),
        session,
        relay,
        tasks,
        _liveliness: liveliness,
    }
}

fn read_inputs() -> BridgeCommand {
    BridgeCommand::ReadInputRegisters(ReadRequest {
        unit: 1,
        address: 8,
        length: 3,
    })
}

/// A read command over Zenoh is answered by a polled data event.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_command_round_trip() {
    let bridge = start_bridge().await;

    let subscriber = bridge
        .session
        .declare_subscriber(bridge.keys.data_wildcard())
        .await
        .expect("Failed to create subscriber");

    let command = encode(&CommandEnvelope::once(read_inputs()), Format::Cbor).unwrap();
    bridge
        .session
        .put(bridge.keys.commands(), command)
        .await
        .expect("Failed to send command");

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for data event")
        .expect("Failed to receive data event");

    assert_eq!(
        sample.key_expr().as_str(),
        format!("{}/data/1/input/8", bridge.keys.prefix())
    );
    let event: BridgeEvent = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert_eq!(
        event.as_data().unwrap().data,
        RegisterData::Words(vec![8, 9, 10])
    );
}

/// A malformed command produces an error event.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_command_reports_error() {
    let bridge = start_bridge().await;

    let subscriber = bridge
        .session
        .declare_subscriber(bridge.keys.error())
        .await
        .expect("Failed to create subscriber");

    bridge
        .session
        .put(bridge.keys.commands(), r#"{"command": "readEverything"}"#)
        .await
        .expect("Failed to send command");

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for error event")
        .expect("Failed to receive error event");

    let event: BridgeEvent = decode_auto(&sample.payload().to_bytes()).unwrap();
    assert!(event.as_error().is_some());
}

/// Interval timers stop when the client's liveliness token goes away.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_disconnect_cancels_interval() {
    let bridge = start_bridge().await;

    let token = bridge
        .session
        .liveliness()
        .declare_token(bridge.keys.client_alive("panel"))
        .await
        .expect("Failed to declare client token");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !bridge.relay.timers().is_present("panel") {
        assert!(tokio::time::Instant::now() < deadline, "Client never seen");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let command = encode(
        &CommandEnvelope::repeating(read_inputs(), "panel", 50),
        Format::Json,
    )
    .unwrap();
    bridge
        .session
        .put(bridge.keys.commands(), command)
        .await
        .expect("Failed to send command");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while bridge.relay.timers().count("panel") == 0 {
        assert!(tokio::time::Instant::now() < deadline, "Timer never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    token.undeclare().await.expect("Failed to undeclare token");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while bridge.relay.timers().count("panel") > 0 {
        assert!(tokio::time::Instant::now() < deadline, "Timer never cancelled");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A repeating command from a client without a token runs once only.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interval_without_token_is_not_kept() {
    let bridge = start_bridge().await;

    let subscriber = bridge
        .session
        .declare_subscriber(bridge.keys.data_wildcard())
        .await
        .expect("Failed to create subscriber");

    let command = encode(
        &CommandEnvelope::repeating(read_inputs(), "ghost", 20),
        Format::Json,
    )
    .unwrap();
    bridge
        .session
        .put(bridge.keys.commands(), command)
        .await
        .expect("Failed to send command");

    tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for data event")
        .expect("Failed to receive data event");
    assert_eq!(bridge.relay.timers().count("ghost"), 0);
}
