use std::sync::Arc;

use crate::registry::{NodeId, RegisterTree};

/// Auto-off driver for momentary "pulse" registers. A pulse write arms
/// the leaf's deadline; the once-per-second tick reverts it to zero.
pub struct PulseTimer {
    registry: Arc<RegisterTree>,
    armed: Vec<NodeId>,
}

impl PulseTimer {
    pub fn new(registry: Arc<RegisterTree>) -> Self {
        let armed = registry.pulse_leaves();
        Self { registry, armed }
    }

    pub fn tick(&self, now: u64) {
        for &id in &self.armed {
            self.registry.expire_pulse(id, now);
        }
    }
}
