//! Process plumbing for the modbridge binary.
//!
//! - [`BridgeArgs`] parses the command line.
//! - [`BridgeConfig`] loads and validates the JSON5 configuration file.
//! - [`BridgeRunner`] opens the Zenoh session, supervises the bridge tasks
//!   and shuts down on Ctrl+C or when a task stops.
//! - [`Publisher`] routes events and status reports to their keys.
//! - [`LivelinessManager`] declares the bridge token and reports client
//!   departures.
//!
//! ```ignore
//! let args = BridgeArgs::parse();
//! let config = ModbusBridgeConfig::load(&args.config)?;
//! let mut runner = BridgeRunner::start("modbus", config, &args).await?;
//! runner.spawn("events", forward_events(events, runner.publisher()));
//! runner.run(serde_json::Value::Null).await?;
//! ```

mod args;
mod config;
mod error;
mod liveliness;
mod publisher;
mod runner;
mod status;

pub use args::{BridgeArgs, DEFAULT_CONFIG};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use liveliness::{ClientPresence, ClientWatcher, LivelinessManager};
pub use publisher::Publisher;
pub use runner::BridgeRunner;
pub use status::{BridgeState, BridgeStatus};

pub use modbridge_common::{Format, KeyExprBuilder, LoggingConfig, ZenohConfig};
