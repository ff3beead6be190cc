//! Bridge lifecycle: startup, supervised tasks and shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinSet;

use modbridge_common::{connect, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::liveliness::LivelinessManager;
use crate::publisher::Publisher;
use crate::status::{BridgeState, BridgeStatus};

/// Owns the Zenoh session and the long-running bridge tasks.
///
/// Startup initializes logging, opens the session and declares the bridge
/// token. [`run`](Self::run) then waits for Ctrl+C or for any task to stop
/// on its own, whichever comes first, and tears everything down.
pub struct BridgeRunner<C: BridgeConfig> {
    name: String,
    version: String,
    config: C,
    session: Arc<zenoh::Session>,
    publisher: Publisher,
    liveliness: LivelinessManager,
    publish_status: bool,
    /// Each task yields its own name when it finishes.
    tasks: JoinSet<String>,
}

/// Why [`BridgeRunner::run`] stopped waiting.
enum Shutdown {
    Signal,
    TaskExited(String),
}

impl<C: BridgeConfig> BridgeRunner<C> {
    pub async fn start(name: impl Into<String>, config: C, args: &BridgeArgs) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        init_tracing(&args.logging(config.logging()))
            .map_err(|e| BridgeError::Logging(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let session = Arc::new(connect(config.zenoh()).await?);
        let liveliness = LivelinessManager::new(session.clone(), config.key_prefix()).await?;
        let publisher = Publisher::new(session.clone(), config.key_prefix(), config.format());

        Ok(Self {
            name,
            version,
            config,
            session,
            publisher,
            liveliness,
            publish_status: false,
            tasks: JoinSet::new(),
        })
    }

    /// Publish running, failed and offline reports on `<prefix>/@/status`.
    pub fn with_status_publishing(mut self) -> Self {
        self.publish_status = true;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn liveliness(&self) -> &LivelinessManager {
        &self.liveliness
    }

    /// Spawn a supervised task. The bridge shuts down if it ever returns.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        self.tasks.spawn(async move {
            future.await;
            name
        });
    }

    /// Like [`spawn`](Self::spawn), logging the error a task returns.
    pub fn spawn_fallible<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        self.tasks.spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(task = %name, error = %e, "Bridge task failed");
            }
            name
        });
    }

    /// Run until Ctrl+C or until a supervised task stops.
    pub async fn run(mut self, metadata: serde_json::Value) -> Result<()> {
        self.report(BridgeState::Running, None, metadata.clone()).await;

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        let shutdown = tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                Shutdown::Signal
            }
            Some(joined) = self.tasks.join_next() => {
                let task = match joined {
                    Ok(name) => name,
                    Err(e) => format!("panicked task ({})", e),
                };
                Shutdown::TaskExited(task)
            }
        };

        match &shutdown {
            Shutdown::Signal => tracing::info!(bridge = %self.name, "Received shutdown signal"),
            Shutdown::TaskExited(task) => {
                tracing::error!(bridge = %self.name, task = %task, "Bridge task stopped");
                self.report(
                    BridgeState::Failed,
                    Some(format!("task '{}' stopped", task)),
                    metadata,
                )
                .await;
            }
        }

        self.tasks.shutdown().await;
        self.report(BridgeState::Offline, None, serde_json::Value::Null).await;

        drop(self.liveliness);
        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Bridge stopped");
        Ok(())
    }

    async fn report(&self, state: BridgeState, reason: Option<String>, metadata: serde_json::Value) {
        if !self.publish_status {
            return;
        }

        let mut status =
            BridgeStatus::new(&self.name, &self.version, state).with_metadata(metadata);
        if let Some(reason) = reason {
            status = status.with_reason(reason);
        }

        if let Err(e) = self.publisher.publish_status(&status).await {
            tracing::warn!(state = ?state, error = %e, "Failed to publish bridge status");
        }
    }
}
