//! Demand-driven caching bridge between Modbus devices and Zenoh subscribers.
//!
//! Clients publish read and write commands; the bridge answers reads from a
//! register cache when it can and otherwise queues them for a periodic poll
//! that batches adjacent registers into a single bus transaction. Every
//! fresh poll, write and cache hit is broadcast to all subscribers.
//!
//! # Key Expressions
//!
//! ```text
//! <prefix>/data/<unit>/<type>/<address>   register values
//! <prefix>/error                          transaction failures
//! <prefix>/@/commands                     client commands
//! <prefix>/@/clients/<client_id>          client liveliness tokens
//! ```
//!
//! Where `<type>` is `coil`, `discrete`, `holding`, or `input`.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod device;
pub mod emitter;
pub mod error;
pub mod master;
pub mod passthrough;
pub mod relay;
pub mod scheduler;
pub mod simulator;
pub mod store;

pub use bridge::Bridge;
pub use cache::{PollOutcome, RegisterCache};
pub use config::{CacheConfig, ConnectionConfig, ModbusBridgeConfig, ModbusConfig};
pub use device::{DeviceHandle, DeviceWorker, device_channel};
pub use emitter::EventEmitter;
pub use error::{CacheError, TransportError};
pub use master::{ModbusMaster, TokioModbusMaster};
pub use passthrough::Passthrough;
pub use relay::{ClientTimers, CommandRelay, forward_events};
pub use scheduler::PollScheduler;
pub use simulator::SimulatedDevice;
pub use store::{CachePolicy, CellKey, CellRange, RegisterCell, RegisterStore};

/// The parts of a bridge that still need to be spawned.
pub struct BridgeCore {
    pub bridge: Bridge,
    pub worker: DeviceWorker,
    /// Present in cached mode only.
    pub scheduler: Option<PollScheduler>,
}

/// Wire the device worker, cache or passthrough, and scheduler around `master`.
pub fn assemble(config: &ModbusConfig, master: Box<dyn ModbusMaster>) -> BridgeCore {
    let (worker, device) = device_channel(master, config.timeout(), config.queue_depth);
    let emitter = EventEmitter::new(config.event_capacity);

    if config.cache.enabled {
        let cache = RegisterCache::new(CachePolicy::from(&config.cache), device, emitter);
        let scheduler = PollScheduler::new(cache.clone(), &config.cache);
        BridgeCore {
            bridge: Bridge::Cached(cache),
            worker,
            scheduler: Some(scheduler),
        }
    } else {
        BridgeCore {
            bridge: Bridge::Passthrough(Passthrough::new(device, emitter)),
            worker,
            scheduler: None,
        }
    }
}
