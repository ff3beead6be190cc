//! Liveliness tokens for presence detection.
//!
//! The bridge holds a token so subscribers can see it come and go, and it
//! watches the tokens its clients hold: a client token disappearing is how
//! the bridge learns that a client disconnected.
//!
//! # Key Expressions
//!
//! - Bridge liveliness: `<prefix>/@/alive`
//! - Client liveliness: `<prefix>/@/clients/<client_id>`
//!
//! # Example
//!
//! ```ignore
//! use modbridge_framework::{ClientPresence, LivelinessManager};
//!
//! let manager = LivelinessManager::new(session.clone(), "modbridge").await?;
//! let watcher = manager.watch_clients().await?;
//!
//! while let Some(presence) = watcher.next().await {
//!     if let ClientPresence::Left(client) = presence {
//!         // cancel the client's timers
//!     }
//! }
//! ```

use std::sync::Arc;

use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::liveliness::LivelinessToken;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};

use modbridge_common::KeyExprBuilder;

use crate::error::{BridgeError, Result};

/// A change in client presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPresence {
    /// The client declared its token.
    Joined(String),
    /// The client's token went away (clean close or lost session).
    Left(String),
}

/// Manages the bridge liveliness token.
///
/// The bridge token is declared on creation and automatically undeclared on drop.
#[derive(Debug)]
pub struct LivelinessManager {
    /// Zenoh session.
    session: Arc<Session>,
    keys: KeyExprBuilder,
    /// Bridge-level liveliness token.
    /// Kept alive for the lifetime of the manager.
    #[allow(dead_code)]
    bridge_token: LivelinessToken,
}

impl LivelinessManager {
    /// Create a new liveliness manager and declare the bridge as alive.
    ///
    /// The bridge liveliness token is declared immediately at
    /// `<key_prefix>/@/alive`.
    pub async fn new(session: Arc<Session>, key_prefix: impl Into<String>) -> Result<Self> {
        let keys = KeyExprBuilder::new(key_prefix);
        let bridge_key = format!("{}/@/alive", keys.prefix());

        let bridge_token = session
            .liveliness()
            .declare_token(&bridge_key)
            .await
            .map_err(|e| {
                BridgeError::liveliness(format!("Failed to declare bridge token: {}", e))
            })?;

        tracing::info!(key = %bridge_key, "Bridge liveliness token declared");

        Ok(Self {
            session,
            keys,
            bridge_token,
        })
    }

    /// Get the key prefix.
    pub fn key_prefix(&self) -> &str {
        self.keys.prefix()
    }

    /// Start watching client liveliness tokens under `<prefix>/@/clients/*`.
    ///
    /// Tokens already declared when watching starts are reported as joined.
    pub async fn watch_clients(&self) -> Result<ClientWatcher> {
        let key = self.keys.clients_wildcard();
        let subscriber = self
            .session
            .liveliness()
            .declare_subscriber(&key)
            .history(true)
            .await
            .map_err(|e| {
                BridgeError::liveliness(format!("Failed to watch clients on {}: {}", key, e))
            })?;

        tracing::debug!(key = %key, "Watching client liveliness");

        Ok(ClientWatcher {
            subscriber,
            keys: self.keys.clone(),
        })
    }
}

/// Stream of client presence changes.
pub struct ClientWatcher {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    keys: KeyExprBuilder,
}

impl ClientWatcher {
    /// Wait for the next presence change.
    ///
    /// Returns `None` once the underlying subscriber is closed. Samples on
    /// keys that are not client tokens are skipped.
    pub async fn next(&self) -> Option<ClientPresence> {
        loop {
            let sample = self.subscriber.recv_async().await.ok()?;
            match presence_from_sample(&self.keys, sample.kind(), sample.key_expr().as_str()) {
                Some(presence) => return Some(presence),
                None => {
                    tracing::trace!(key = %sample.key_expr(), "Ignoring liveliness sample");
                }
            }
        }
    }
}

fn presence_from_sample(
    keys: &KeyExprBuilder,
    kind: SampleKind,
    key: &str,
) -> Option<ClientPresence> {
    let client = keys.parse_client_key(key)?.to_string();
    Some(match kind {
        SampleKind::Put => ClientPresence::Joined(client),
        SampleKind::Delete => ClientPresence::Left(client),
    })
}
