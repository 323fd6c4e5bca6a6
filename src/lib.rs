pub mod channel;
mod config;
mod edge;
mod error;
mod gpio;
mod link;
mod protocol;
mod pulse;
mod registry;
mod routes;

pub use config::{
    Access, AppConfig, Encoding, FilterConfig, GpioConfig, HttpConfig, LineMode, MetricsConfig,
    RegisterConfig, SerialConfig,
};
pub use edge::{EdgeEvent, EdgeSource, MockEdgeSource};
pub use error::AppError;
pub use gpio::{DebounceFilter, GpioSampler};
pub use link::{DeviceLink, SerialChannel};
pub use pulse::PulseTimer;
pub use registry::{MemoryRegisters, NodeId, RegisterIo, RegisterTree, Source, epoch_secs};
pub use routes::AppState;

#[cfg(feature = "hardware-gpio")]
pub use edge::LibgpiodSource;
