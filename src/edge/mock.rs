use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use crate::edge::{EdgeEvent, EdgeSource};
use crate::error::AppError;

/// Scripted edge source. Each poll pops one pre-loaded batch; once the
/// script is drained it sleeps out the timeout and reports no events,
/// which keeps the poll loop's cadence intact.
#[derive(Default)]
pub struct MockEdgeSource {
    batches: VecDeque<Vec<EdgeEvent>>,
}

impl MockEdgeSource {
    pub fn push_batch(&mut self, events: Vec<EdgeEvent>) {
        self.batches.push_back(events);
    }
}

impl EdgeSource for MockEdgeSource {
    fn wait_edges(&mut self, timeout: Duration) -> Result<Vec<EdgeEvent>, AppError> {
        match self.batches.pop_front() {
            Some(batch) => Ok(batch),
            None => {
                thread::sleep(timeout);
                Ok(Vec::new())
            }
        }
    }
}
