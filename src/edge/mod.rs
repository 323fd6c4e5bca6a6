use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct EdgeEvent {
    pub line: u32,
    pub timestamp_ms: u64,
}

/// Blocking edge-event supplier with a bounded wait.
pub trait EdgeSource: Send {
    fn wait_edges(&mut self, timeout: Duration) -> Result<Vec<EdgeEvent>, AppError>;
}

#[cfg(feature = "hardware-gpio")]
pub mod libgpiod;
pub mod mock;

#[cfg(feature = "hardware-gpio")]
pub use libgpiod::LibgpiodSource;
pub use mock::MockEdgeSource;
