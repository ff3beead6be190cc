//! Demand-driven caching bridge between Modbus devices and Zenoh.

use anyhow::{Context, Result};
use modbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use modbridge::config::ModbusBridgeConfig;
use modbridge::{BridgeCore, CommandRelay, assemble, forward_events, master};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let config = ModbusBridgeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut runner = BridgeRunner::start("modbus", config, &args)
        .await
        .context("starting bridge")?
        .with_status_publishing();

    let modbus = runner.config().modbus.clone();
    let BridgeCore {
        bridge,
        worker,
        scheduler,
    } = assemble(&modbus, master::open(&modbus.connection));

    tracing::info!(
        prefix = %modbus.key_prefix,
        connection = %modbus.connection.describe(),
        cached = bridge.is_cached(),
        "Modbus bridge configured"
    );

    let publisher = runner.publisher();
    let events = bridge.emitter().subscribe();
    let relay = CommandRelay::new(bridge);
    let watcher = runner
        .liveliness()
        .watch_clients()
        .await
        .context("watching client tokens")?;

    runner.spawn("device", worker.run());
    if let Some(scheduler) = scheduler {
        runner.spawn("scheduler", scheduler.run());
    }
    runner.spawn("events", forward_events(events, publisher.clone()));
    runner.spawn("clients", relay.clone().watch_clients(watcher));
    runner.spawn_fallible("commands", relay.run_commands(publisher));

    let cache = &modbus.cache;
    let metadata = serde_json::json!({
        "connection": modbus.connection.describe(),
        "timeout_ms": modbus.timeout_ms,
        "cache": {
            "enabled": cache.enabled,
            "valid_answer_window_ms": cache.valid_answer_window_ms,
            "forget_ask_window_ms": cache.forget_ask_window_ms,
            "resend_wait_window_ms": cache.resend_wait_window_ms,
            "max_batch_length": cache.max_batch_length,
            "poll_interval_ms": cache.poll_interval_ms,
            "idle_eviction_ms": cache.idle_eviction_ms,
        },
    });

    runner.run(metadata).await.context("running bridge")
}
