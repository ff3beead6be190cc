//! Zenoh side of the bridge.
//!
//! - commands arrive on `<prefix>/@/commands` (JSON or CBOR)
//! - events from the emitter are published under `<prefix>/data/...` and
//!   `<prefix>/error`
//! - interval commands repeat only for clients holding a token at
//!   `<prefix>/@/clients/<id>`; the token leaving cancels them

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use zenoh::sample::SampleKind;

use modbridge_common::{BridgeEvent, CommandEnvelope, decode_auto};
use modbridge_framework::{BridgeError, ClientPresence, ClientWatcher, Publisher};

use crate::bridge::Bridge;

/// Clients currently holding a liveliness token, and their interval tasks.
#[derive(Debug, Clone, Default)]
pub struct ClientTimers {
    inner: Arc<Mutex<Clients>>,
}

#[derive(Debug, Default)]
struct Clients {
    present: HashSet<String>,
    timers: HashMap<String, Vec<AbortHandle>>,
}

impl ClientTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joined(&self, client: &str) {
        match self.inner.lock() {
            Ok(mut clients) => {
                clients.present.insert(client.to_string());
            }
            Err(e) => warn!(client, error = %e, "Client registry unavailable"),
        }
    }

    /// Forget `client` and abort its timers. Returns how many were running.
    pub fn left(&self, client: &str) -> usize {
        let handles = match self.inner.lock() {
            Ok(mut clients) => {
                clients.present.remove(client);
                clients.timers.remove(client).unwrap_or_default()
            }
            Err(_) => Vec::new(),
        };
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    pub fn is_present(&self, client: &str) -> bool {
        self.inner
            .lock()
            .map(|clients| clients.present.contains(client))
            .unwrap_or(false)
    }

    /// Start a timer for `client` if it holds a token.
    ///
    /// The check and the registration happen under one lock, so a departure
    /// cannot slip in between and leave the timer without an owner.
    pub fn start_if_present(&self, client: &str, start: impl FnOnce() -> AbortHandle) -> bool {
        match self.inner.lock() {
            Ok(mut clients) if clients.present.contains(client) => {
                let handle = start();
                clients.timers.entry(client.to_string()).or_default().push(handle);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(client, error = %e, "Client registry unavailable");
                false
            }
        }
    }

    /// Number of timers registered for `client`.
    pub fn count(&self, client: &str) -> usize {
        self.inner
            .lock()
            .map(|clients| clients.timers.get(client).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn cancel_all(&self) {
        let handles: Vec<AbortHandle> = match self.inner.lock() {
            Ok(mut clients) => clients.timers.drain().flat_map(|(_, h)| h).collect(),
            Err(_) => return,
        };
        for handle in handles {
            handle.abort();
        }
    }
}

/// Feeds client commands to the bridge core.
#[derive(Debug, Clone)]
pub struct CommandRelay {
    bridge: Bridge,
    timers: ClientTimers,
}

impl CommandRelay {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            timers: ClientTimers::new(),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn timers(&self) -> &ClientTimers {
        &self.timers
    }

    /// Decode and dispatch one command payload.
    ///
    /// Undecodable payloads are reported as error events.
    pub async fn handle_payload(&self, payload: &[u8]) {
        match decode_auto::<CommandEnvelope>(payload) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => {
                debug!(payload_len = payload.len(), error = %e, "Invalid command");
                self.bridge
                    .emitter()
                    .emit_error(format!("Invalid command: {}", e));
            }
        }
    }

    /// Start repeating a command for its client, or run it once.
    ///
    /// One-shot commands complete before this returns, so commands from the
    /// subscriber reach the device in arrival order.
    pub async fn dispatch(&self, envelope: CommandEnvelope) {
        let CommandEnvelope {
            client,
            interval,
            command,
        } = envelope;

        match (interval, client.as_deref()) {
            (Some(0), _) => warn!(?command, "Zero interval, running command once"),
            (Some(ms), Some(client)) => {
                let bridge = self.bridge.clone();
                let repeated = command.clone();
                let started = self.timers.start_if_present(client, move || {
                    tokio::spawn(async move {
                        let mut ticker = tokio::time::interval(Duration::from_millis(ms));
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        loop {
                            ticker.tick().await;
                            // Errors were already broadcast.
                            let _ = bridge.execute(&repeated).await;
                        }
                    })
                    .abort_handle()
                });
                if started {
                    debug!(client, interval_ms = ms, ?command, "Started interval command");
                    return;
                }
                warn!(client, ?command, "Client holds no liveliness token, running once");
            }
            (Some(_), None) => warn!(?command, "Interval command without a client id, running once"),
            (None, _) => {}
        }

        // Errors were already broadcast.
        let _ = self.bridge.execute(&command).await;
    }

    /// Receive commands until the subscriber closes.
    pub async fn run_commands(self, publisher: Publisher) -> Result<(), BridgeError> {
        let key = publisher.keys().commands();
        let subscriber = publisher
            .session()
            .declare_subscriber(&key)
            .await
            .map_err(|e| BridgeError::Subscribe {
                key: key.clone(),
                message: e.to_string(),
            })?;

        info!(key = %key, "Listening for commands");

        while let Ok(sample) = subscriber.recv_async().await {
            if sample.kind() == SampleKind::Delete {
                trace!(key = %sample.key_expr(), "Ignoring delete sample");
                continue;
            }
            self.handle_payload(&sample.payload().to_bytes()).await;
        }

        self.timers.cancel_all();
        debug!(key = %key, "Command subscriber closed");
        Ok(())
    }

    /// Track client tokens. A departing client's interval timers are cancelled.
    pub async fn watch_clients(self, watcher: ClientWatcher) {
        while let Some(presence) = watcher.next().await {
            match presence {
                ClientPresence::Joined(client) => {
                    self.timers.joined(&client);
                    debug!(client = %client, "Client connected");
                }
                ClientPresence::Left(client) => {
                    let cancelled = self.timers.left(&client);
                    info!(client = %client, cancelled, "Client disconnected");
                }
            }
        }
    }
}

/// Publish every emitted event to Zenoh.
pub async fn forward_events(mut events: broadcast::Receiver<BridgeEvent>, publisher: Publisher) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(e) = publisher.publish_event(&event).await {
                    warn!(error = %e, "Failed to publish event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event forwarder lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
