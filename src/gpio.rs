use std::sync::Arc;
use std::time::Duration;

use log::trace;
use rustc_hash::FxHashMap;

use crate::config::FilterConfig;
use crate::edge::EdgeSource;
use crate::error::AppError;
use crate::registry::{NodeId, RegisterTree};

const HISTORY: usize = 4;

/// Bounded wait per poll so the loop stays responsive to shutdown.
pub const POLL_WAIT: Duration = Duration::from_millis(999);

/// Per-line edge acceptance policy. Edges closer than `min_gap_ms` to
/// the last recorded one are contact bounce and dropped outright; after
/// warm-up an edge is surfaced only when its gap beats the worst gap in
/// recent history by `ratio`. Favors precision over recall.
pub struct DebounceFilter {
    history: [u64; HISTORY],
    fill: u8,
    min_gap_ms: u64,
    ratio: u32,
    last_reported: u64,
}

impl DebounceFilter {
    pub fn new(min_gap_ms: u64, ratio: u32) -> Self {
        Self {
            history: [0; HISTORY],
            fill: 0,
            min_gap_ms,
            ratio: ratio.max(1),
            last_reported: 0,
        }
    }

    /// Feed one physical edge at `ts` milliseconds. Returns the elapsed
    /// time since the previously surfaced edge, or 0 for "no event".
    pub fn feed(&mut self, ts: u64) -> u64 {
        if self.min_gap_ms > 0 && ts.saturating_sub(self.history[0]) < self.min_gap_ms {
            return 0; // bounce, history untouched
        }

        self.history.copy_within(0..HISTORY - 1, 1);
        self.history[0] = ts;
        self.fill = self.fill.saturating_add(1);
        if (self.fill as usize) < HISTORY {
            return 0;
        }

        let mut max_gap = 0;
        for i in 0..HISTORY - 1 {
            max_gap = max_gap.max(self.history[i] - self.history[i + 1]);
        }
        let d0 = ts - self.history[1];
        trace!("filter fill={} max={max_gap} d0={d0}", self.fill);

        if self.fill as usize == HISTORY {
            // first full buffer: report the longest gap so the initial
            // signal is not lost
            self.last_reported = ts;
            return max_gap;
        }

        if d0 * self.ratio as u64 > max_gap {
            let elapsed = ts - self.last_reported;
            self.last_reported = ts;
            return elapsed;
        }
        0
    }
}

/// Drives edge acquisition: polls the source with a bounded wait,
/// debounces per line and feeds accepted edges to the bound register
/// leaves. Runs the once-per-second frequency decay pass as a side job.
pub struct GpioSampler {
    registry: Arc<RegisterTree>,
    source: Box<dyn EdgeSource>,
    filters: FxHashMap<u32, DebounceFilter>,
    bindings: FxHashMap<u32, Vec<NodeId>>,
    last_decay: u64,
}

impl GpioSampler {
    pub fn new(
        registry: Arc<RegisterTree>,
        source: Box<dyn EdgeSource>,
        filter_cfg: &[FilterConfig],
    ) -> Self {
        let mut bindings: FxHashMap<u32, Vec<NodeId>> = FxHashMap::default();
        for (line, id) in registry.gpio_leaves() {
            bindings.entry(line).or_default().push(id);
        }

        let mut filters = FxHashMap::default();
        for f in filter_cfg {
            filters.insert(f.line, DebounceFilter::new(f.min_gap_ms, f.ratio));
        }

        Self {
            registry,
            source,
            filters,
            bindings,
            last_decay: 0,
        }
    }

    /// Monitored line offsets, for the edge-source request.
    pub fn lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.bindings.keys().copied().collect();
        lines.sort_unstable();
        lines
    }

    pub fn poll(&mut self, now: u64) -> Result<(), AppError> {
        if now != self.last_decay {
            self.registry.decay_frequencies(now);
            self.last_decay = now;
        }

        for event in self.source.wait_edges(POLL_WAIT)? {
            let filter = self
                .filters
                .entry(event.line)
                .or_insert_with(|| DebounceFilter::new(0, 1));
            let elapsed = filter.feed(event.timestamp_ms);
            trace!("line {} d={elapsed}", event.line);
            if elapsed == 0 {
                continue;
            }
            if let Some(ids) = self.bindings.get(&event.line) {
                for &id in ids {
                    self.registry.record_edge(id, elapsed, now);
                }
            }
        }
        Ok(())
    }
}
