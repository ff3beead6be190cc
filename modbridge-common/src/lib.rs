//! Wire types shared by the modbridge bridge and its Zenoh clients.
//!
//! Clients send [`CommandEnvelope`]s to `<prefix>/@/commands` and receive
//! [`BridgeEvent`]s on `<prefix>/data/**` and `<prefix>/error`. The
//! [`config`] and [`session`] modules hold the Zenoh and logging sections
//! every process in the system reads.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod keyexpr;
pub mod register;
pub mod serialization;
pub mod session;

pub use command::{
    BridgeCommand, CommandEnvelope, ReadRequest, WriteCoilRequest, WriteRegistersRequest,
};
pub use config::{LogFormat, LoggingConfig, ZenohConfig, ZenohMode};
pub use error::{Error, Result};
pub use event::{BridgeEvent, DataEvent, ErrorEvent, Flag, current_timestamp_millis};
pub use keyexpr::{KEY_PREFIX, KeyExprBuilder, ParsedDataKey};
pub use register::{RegisterData, RegisterType};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init(),
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}
