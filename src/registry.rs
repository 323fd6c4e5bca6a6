use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::config::{Access, Encoding, LineMode, RegisterConfig};
use crate::error::AppError;
use crate::protocol::hex;

/// Read/write collaborator for device-backed registers. Production is the
/// serial link; tests use an in-memory register file.
pub trait RegisterIo: Send + Sync {
    /// Fill `buf` from the register at `addr`. Returns the device's length
    /// byte; zero means no physical channel (cached values stay in force).
    fn read_register(&self, addr: u16, buf: &mut [u8]) -> Result<i32, AppError>;
    fn write_register(&self, addr: u16, bytes: &[u8]) -> Result<i32, AppError>;
}

pub type NodeId = usize;

pub const CACHE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Device,
    Counter,
    Frequency,
}

/// Hierarchical register description doubling as the value cache. The
/// topology is fixed at startup; only per-leaf cache fields mutate, each
/// behind its own mutex. Device leaves are refilled by readers, GPIO
/// leaves by the polling thread — the two sets are disjoint.
pub struct RegisterTree {
    nodes: Vec<Node>,
    io: Arc<dyn RegisterIo>,
}

struct Node {
    name: String,
    kind: NodeKind,
}

enum NodeKind {
    Group(Vec<NodeId>),
    Leaf(Leaf),
}

struct Leaf {
    addr: u16,
    len: usize,
    encoding: Encoding,
    scale: i32,
    access: Access,
    source: Source,
    /// Cache validity in seconds; auto-off delay for pulse leaves.
    refresh: u64,
    line: u32,
    cache: Mutex<LeafCache>,
}

#[derive(Default)]
struct LeafCache {
    value: i32,
    raw: [u8; CACHE_BYTES],
    expiry: u64,
    last_edge: u64,
}

impl RegisterTree {
    pub fn from_config(
        cfg: &RegisterConfig,
        default_refresh: u64,
        io: Arc<dyn RegisterIo>,
    ) -> Result<Self, AppError> {
        let mut nodes = Vec::new();
        Self::load(&mut nodes, cfg, default_refresh)?;
        Ok(Self { nodes, io })
    }

    fn load(
        nodes: &mut Vec<Node>,
        cfg: &RegisterConfig,
        default_refresh: u64,
    ) -> Result<NodeId, AppError> {
        let id = nodes.len();
        nodes.push(Node {
            name: cfg.name.clone(),
            kind: NodeKind::Group(Vec::new()),
        });

        if !cfg.children.is_empty() {
            if cfg.addr.is_some() || cfg.line.is_some() {
                return Err(AppError::Config(format!(
                    "node {} has both children and leaf fields",
                    cfg.name
                )));
            }
            let mut children = Vec::with_capacity(cfg.children.len());
            for (i, child) in cfg.children.iter().enumerate() {
                if cfg.children[..i].iter().any(|c| c.name == child.name) {
                    return Err(AppError::Config(format!(
                        "duplicate child {} under {}",
                        child.name, cfg.name
                    )));
                }
                children.push(Self::load(nodes, child, default_refresh)?);
            }
            nodes[id].kind = NodeKind::Group(children);
            return Ok(id);
        }

        let encoding = cfg.encoding.unwrap_or(Encoding::Int);
        let len = cfg.len.unwrap_or(encoding.default_len());
        if !(1..=CACHE_BYTES).contains(&len) {
            return Err(AppError::Config(format!(
                "leaf {} length {len} out of range",
                cfg.name
            )));
        }
        let access = cfg.access.unwrap_or(Access::ReadOnly);
        if encoding == Encoding::Hex && access.is_writable() {
            return Err(AppError::Config(format!(
                "hex leaf {} cannot be writable",
                cfg.name
            )));
        }
        let scale = cfg.scale.unwrap_or(encoding.scale());
        if scale < 1 {
            return Err(AppError::Config(format!(
                "leaf {} scale must be positive",
                cfg.name
            )));
        }
        let refresh = match access {
            Access::Pulse => cfg.duration.ok_or_else(|| {
                AppError::Config(format!("pulse leaf {} missing duration", cfg.name))
            })?,
            _ => cfg.refresh.unwrap_or(default_refresh),
        };

        let (source, addr, line) = match (cfg.line, cfg.source) {
            (Some(line), mode) => {
                let source = match mode.unwrap_or(LineMode::Counter) {
                    LineMode::Counter => Source::Counter,
                    LineMode::Frequency => Source::Frequency,
                };
                (source, 0u16, line)
            }
            (None, Some(_)) => {
                return Err(AppError::Config(format!(
                    "leaf {} has a gpio source but no line",
                    cfg.name
                )));
            }
            (None, None) => {
                let text = cfg.addr.as_deref().ok_or_else(|| {
                    AppError::Config(format!("leaf {} missing addr", cfg.name))
                })?;
                let addr = u16::from_str_radix(text.trim_start_matches("0x"), 16)
                    .map_err(|_| {
                        AppError::Config(format!("leaf {} bad addr {text}", cfg.name))
                    })?;
                (Source::Device, addr, 0)
            }
        };

        nodes[id].kind = NodeKind::Leaf(Leaf {
            addr,
            len,
            encoding,
            scale,
            access,
            source,
            refresh,
            line,
            cache: Mutex::new(LeafCache::default()),
        });
        Ok(id)
    }

    /// Resolve a '/'-separated path to a node. Empty segments are
    /// skipped, so "", "/" and "a//b" behave as expected from URLs.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut id = 0;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let NodeKind::Group(children) = &self.nodes[id].kind else {
                return None;
            };
            id = *children
                .iter()
                .find(|&&c| self.nodes[c].name == segment)?;
        }
        Some(id)
    }

    /// TTL refill: device leaves read into the cached raw buffer in
    /// place, so a simulated zero-byte read keeps the prior value.
    fn refreshed_cache<'a>(
        &self,
        leaf: &'a Leaf,
        now: u64,
    ) -> Result<MutexGuard<'a, LeafCache>, AppError> {
        let mut cache = leaf.cache.lock();
        if leaf.source == Source::Device && cache.expiry <= now {
            self.io.read_register(leaf.addr, &mut cache.raw[..leaf.len])?;
            cache.value = decode(&cache.raw[..leaf.len]);
            cache.expiry = now + leaf.refresh;
        }
        Ok(cache)
    }

    fn leaf_value(&self, name: &str, leaf: &Leaf, now: u64) -> Result<Value, AppError> {
        if !leaf.access.is_readable() {
            return Err(AppError::WriteOnly(name.to_string()));
        }
        let cache = self.refreshed_cache(leaf, now)?;
        Ok(match leaf.encoding {
            Encoding::Bool => Value::Bool(cache.value != 0),
            Encoding::Hex => Value::String(hex(&cache.raw[..leaf.len])),
            _ if leaf.scale == 1 => json!(cache.value),
            _ => json!(cache.value as f64 / leaf.scale as f64),
        })
    }

    /// Recursive group rendering shared by REST and metrics. Groups
    /// become name-to-value maps; write-only leaves are omitted from
    /// groups but rejected when addressed directly.
    pub fn render_json(&self, id: NodeId, now: u64) -> Result<Value, AppError> {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Leaf(leaf) => self.leaf_value(&node.name, leaf, now),
            NodeKind::Group(children) => {
                let mut map = serde_json::Map::new();
                for &c in children {
                    let child = &self.nodes[c];
                    if let NodeKind::Leaf(leaf) = &child.kind
                        && !leaf.access.is_readable()
                    {
                        continue;
                    }
                    map.insert(child.name.clone(), self.render_json(c, now)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    /// OpenMetrics text: one `# TYPE` line and one sample per readable
    /// leaf, path segments joined with '_' under `prefix`.
    pub fn render_metrics(
        &self,
        prefix: &str,
        id: NodeId,
        now: u64,
    ) -> Result<String, AppError> {
        let mut out = String::new();
        self.metrics_node(&mut out, prefix, id, now)?;
        Ok(out)
    }

    fn metrics_node(
        &self,
        out: &mut String,
        base: &str,
        id: NodeId,
        now: u64,
    ) -> Result<(), AppError> {
        let node = &self.nodes[id];
        let path = format!("{base}_{}", node.name);
        match &node.kind {
            NodeKind::Group(children) => {
                for &c in children {
                    self.metrics_node(out, &path, c, now)?;
                }
            }
            NodeKind::Leaf(leaf) => {
                if !leaf.access.is_readable() {
                    return Ok(());
                }
                let cache = self.refreshed_cache(leaf, now)?;
                let _ = write!(out, "# TYPE {path} gauge\n{path} ");
                match leaf.encoding {
                    Encoding::Bool => out.push(if cache.value != 0 { '1' } else { '0' }),
                    _ => {
                        let _ = write!(out, "{}", cache.value as f64 / leaf.scale as f64);
                    }
                }
                out.push('\n');
            }
        }
        Ok(())
    }

    /// Parse `text` as a decimal value, encode it per the leaf's rule and
    /// write it through the collaborator. The written bytes are mirrored
    /// into the cache so simulation reads return them. Write-only leaves
    /// arm their auto-off deadline.
    pub fn apply_write(&self, id: NodeId, text: &str, now: u64) -> Result<(), AppError> {
        let node = &self.nodes[id];
        let leaf = match &node.kind {
            NodeKind::Group(_) => return Err(AppError::ComplexWrite(node.name.clone())),
            NodeKind::Leaf(leaf) => leaf,
        };
        if !leaf.access.is_writable() {
            return Err(AppError::ReadOnly(node.name.clone()));
        }

        let text = text.trim();
        let value = match leaf.encoding {
            Encoding::Bool => i32::from(text.starts_with('t')),
            _ => {
                let v: f64 = text
                    .parse()
                    .map_err(|_| AppError::InvalidValue(format!("not a number: {text}")))?;
                // Matches the deployed device's rounding, truncation and all.
                if leaf.scale == 1 {
                    v as i32
                } else {
                    (v * leaf.scale as f64 + 0.5) as i32
                }
            }
        };

        let mut bytes = [0u8; CACHE_BYTES];
        let n = leaf.len.min(4);
        bytes[..n].copy_from_slice(&value.to_le_bytes()[..n]);
        self.io.write_register(leaf.addr, &bytes[..leaf.len])?;

        let mut cache = leaf.cache.lock();
        cache.raw[..leaf.len].copy_from_slice(&bytes[..leaf.len]);
        cache.value = decode(&cache.raw[..leaf.len]);
        if !leaf.access.is_readable() {
            cache.expiry = now + leaf.refresh;
        }
        Ok(())
    }

    /// Apply a debounced edge to the bound leaf: counters increment,
    /// frequency leaves store `scale * 1000 / elapsed_ms`.
    pub(crate) fn record_edge(&self, id: NodeId, elapsed_ms: u64, now: u64) {
        let node = &self.nodes[id];
        let NodeKind::Leaf(leaf) = &node.kind else {
            return;
        };
        let mut cache = leaf.cache.lock();
        match leaf.source {
            Source::Counter => cache.value = cache.value.wrapping_add(1),
            Source::Frequency => {
                cache.value = (leaf.scale as i64 * 1000 / elapsed_ms as i64) as i32;
            }
            Source::Device => return,
        }
        cache.last_edge = now;
        debug!("line {} update {} => {}", leaf.line, node.name, cache.value);
    }

    /// Once a second: lower frequency estimates whose line has gone
    /// quiet. Never raises a value; a new edge does that.
    pub(crate) fn decay_frequencies(&self, now: u64) {
        for node in &self.nodes {
            let NodeKind::Leaf(leaf) = &node.kind else {
                continue;
            };
            if leaf.source != Source::Frequency {
                continue;
            }
            let mut cache = leaf.cache.lock();
            if cache.last_edge == 0 || cache.last_edge >= now {
                continue;
            }
            let value = (leaf.scale as u64 / (now - cache.last_edge)) as i32;
            if value < cache.value {
                debug!(
                    "line {} timeout {} {} => {}",
                    leaf.line, node.name, cache.value, value
                );
                cache.value = value;
            }
        }
    }

    /// Switch an expired pulse off: one all-zero write, then disarm.
    pub(crate) fn expire_pulse(&self, id: NodeId, now: u64) {
        let NodeKind::Leaf(leaf) = &self.nodes[id].kind else {
            return;
        };
        let expired = {
            let mut cache = leaf.cache.lock();
            if cache.expiry != 0 && cache.expiry < now {
                cache.expiry = 0;
                true
            } else {
                false
            }
        };
        if expired {
            let zeros = [0u8; CACHE_BYTES];
            if let Err(e) = self.io.write_register(leaf.addr, &zeros[..leaf.len]) {
                warn!("pulse off {:04x} {e}", leaf.addr);
            }
        }
    }

    /// (line, leaf) pairs for every GPIO-backed leaf.
    pub fn gpio_leaves(&self) -> Vec<(u32, NodeId)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match &node.kind {
                NodeKind::Leaf(leaf) if leaf.source != Source::Device => {
                    Some((leaf.line, id))
                }
                _ => None,
            })
            .collect()
    }

    pub fn pulse_leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match &node.kind {
                NodeKind::Leaf(leaf) if leaf.access == Access::Pulse => Some(id),
                _ => None,
            })
            .collect()
    }
}

/// Little-endian decode into the 32-bit cache slot; 16-bit registers are
/// sign-extended, single bytes stay unsigned.
fn decode(raw: &[u8]) -> i32 {
    match raw.len() {
        1 => raw[0] as i32,
        2 => i16::from_le_bytes([raw[0], raw[1]]) as i32,
        _ => {
            let mut bytes = [0u8; 4];
            let n = raw.len().min(4);
            bytes[..n].copy_from_slice(&raw[..n]);
            i32::from_le_bytes(bytes)
        }
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-memory register file. Stands in for the serial link in tests;
/// read and write calls are counted for cache assertions.
#[derive(Default)]
pub struct MemoryRegisters {
    regs: Mutex<FxHashMap<u16, [u8; CACHE_BYTES]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRegisters {
    pub fn preload(&self, addr: u16, bytes: &[u8]) {
        let mut regs = self.regs.lock();
        let slot = regs.entry(addr).or_default();
        slot[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn get(&self, addr: u16, len: usize) -> Vec<u8> {
        let regs = self.regs.lock();
        regs.get(&addr)
            .map(|slot| slot[..len].to_vec())
            .unwrap_or_else(|| vec![0; len])
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl RegisterIo for MemoryRegisters {
    fn read_register(&self, addr: u16, buf: &mut [u8]) -> Result<i32, AppError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let regs = self.regs.lock();
        if let Some(slot) = regs.get(&addr) {
            buf.copy_from_slice(&slot[..buf.len()]);
        }
        Ok(buf.len() as i32)
    }

    fn write_register(&self, addr: u16, bytes: &[u8]) -> Result<i32, AppError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut regs = self.regs.lock();
        let slot = regs.entry(addr).or_default();
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, addr: &str, encoding: Encoding, access: Access) -> RegisterConfig {
        RegisterConfig {
            name: name.to_string(),
            children: Vec::new(),
            addr: Some(addr.to_string()),
            encoding: Some(encoding),
            len: None,
            access: Some(access),
            refresh: None,
            duration: None,
            scale: None,
            line: None,
            source: None,
        }
    }

    fn group(name: &str, children: Vec<RegisterConfig>) -> RegisterConfig {
        RegisterConfig {
            name: name.to_string(),
            children,
            addr: None,
            encoding: None,
            len: None,
            access: None,
            refresh: None,
            duration: None,
            scale: None,
            line: None,
            source: None,
        }
    }

    fn sample_tree(io: Arc<MemoryRegisters>) -> RegisterTree {
        let cfg = group(
            "api",
            vec![group(
                "boiler",
                vec![
                    leaf("flowTemp", "0810", Encoding::Centi, Access::ReadOnly),
                    leaf("targetTemp", "2306", Encoding::Deci, Access::ReadWrite),
                    leaf("enable", "2301", Encoding::Bool, Access::WriteOnly),
                ],
            )],
        );
        RegisterTree::from_config(&cfg, 10, io).unwrap()
    }

    #[test]
    fn lookup_resolves_nested_paths() {
        let tree = sample_tree(Arc::new(MemoryRegisters::default()));
        assert!(tree.lookup("boiler/flowTemp").is_some());
        assert!(tree.lookup("boiler").is_some());
        assert!(tree.lookup("").is_some());
        assert!(tree.lookup("boiler/missing").is_none());
        assert!(tree.lookup("missing/flowTemp").is_none());
        // leaves have no descendants
        assert!(tree.lookup("boiler/flowTemp/x").is_none());
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let tree = sample_tree(Arc::new(MemoryRegisters::default()));
        assert!(tree.lookup("boiler/flowtemp").is_none());
    }

    #[test]
    fn cached_read_honors_ttl() {
        let io = Arc::new(MemoryRegisters::default());
        io.preload(0x0810, &2150i16.to_le_bytes());
        let tree = sample_tree(io.clone());
        let id = tree.lookup("boiler/flowTemp").unwrap();

        assert_eq!(tree.render_json(id, 1000).unwrap(), json!(21.5));
        assert_eq!(io.read_count(), 1);

        // within the 10s window the cache answers
        assert_eq!(tree.render_json(id, 1005).unwrap(), json!(21.5));
        assert_eq!(io.read_count(), 1);

        // expired: exactly one more device read
        io.preload(0x0810, &2200i16.to_le_bytes());
        assert_eq!(tree.render_json(id, 1010).unwrap(), json!(22.0));
        assert_eq!(io.read_count(), 2);
    }

    #[test]
    fn sixteen_bit_reads_sign_extend() {
        let io = Arc::new(MemoryRegisters::default());
        io.preload(0x0810, &(-50i16).to_le_bytes());
        let tree = sample_tree(io);
        let id = tree.lookup("boiler/flowTemp").unwrap();
        assert_eq!(tree.render_json(id, 0).unwrap(), json!(-0.5));
    }

    #[test]
    fn write_then_read_round_trips() {
        let io = Arc::new(MemoryRegisters::default());
        let tree = sample_tree(io.clone());
        let id = tree.lookup("boiler/targetTemp").unwrap();

        tree.apply_write(id, "45.5", 0).unwrap();
        assert_eq!(io.get(0x2306, 2), 455i16.to_le_bytes());
        assert_eq!(tree.render_json(id, 0).unwrap(), json!(45.5));
    }

    #[test]
    fn encode_rounds_to_resolution() {
        let io = Arc::new(MemoryRegisters::default());
        let tree = sample_tree(io.clone());
        let id = tree.lookup("boiler/targetTemp").unwrap();

        // deci resolution: 45.57 rounds to 45.6
        tree.apply_write(id, "45.57", 0).unwrap();
        assert_eq!(io.get(0x2306, 2), 456i16.to_le_bytes());
    }

    #[test]
    fn access_faults() {
        let tree = sample_tree(Arc::new(MemoryRegisters::default()));
        let flow = tree.lookup("boiler/flowTemp").unwrap();
        let enable = tree.lookup("boiler/enable").unwrap();
        let boiler = tree.lookup("boiler").unwrap();

        assert!(matches!(
            tree.apply_write(flow, "1", 0),
            Err(AppError::ReadOnly(_))
        ));
        assert!(matches!(
            tree.render_json(enable, 0),
            Err(AppError::WriteOnly(_))
        ));
        assert!(matches!(
            tree.apply_write(boiler, "1", 0),
            Err(AppError::ComplexWrite(_))
        ));
    }

    #[test]
    fn group_rendering_omits_write_only_leaves() {
        let io = Arc::new(MemoryRegisters::default());
        io.preload(0x0810, &2150i16.to_le_bytes());
        let tree = sample_tree(io);
        let id = tree.lookup("boiler").unwrap();

        let body = tree.render_json(id, 0).unwrap();
        let map = body.as_object().unwrap();
        assert!(map.contains_key("flowTemp"));
        assert!(!map.contains_key("enable"));
    }

    #[test]
    fn bool_writes_parse_leading_t() {
        let cfg = group(
            "api",
            vec![leaf("enable", "2301", Encoding::Bool, Access::ReadWrite)],
        );
        let io = Arc::new(MemoryRegisters::default());
        let tree = RegisterTree::from_config(&cfg, 10, io.clone()).unwrap();
        let id = tree.lookup("enable").unwrap();

        tree.apply_write(id, "true", 0).unwrap();
        assert_eq!(io.get(0x2301, 1), vec![1]);
        tree.apply_write(id, "false", 0).unwrap();
        assert_eq!(io.get(0x2301, 1), vec![0]);
    }

    #[test]
    fn garbage_write_payload_is_rejected() {
        let io = Arc::new(MemoryRegisters::default());
        let tree = sample_tree(io.clone());
        let id = tree.lookup("boiler/targetTemp").unwrap();

        assert!(matches!(
            tree.apply_write(id, "warm", 0),
            Err(AppError::InvalidValue(_))
        ));
        assert_eq!(io.write_count(), 0);
    }

    #[test]
    fn hex_leaf_renders_raw_bytes() {
        let cfg = group(
            "api",
            vec![RegisterConfig {
                len: Some(4),
                ..leaf("deviceId", "00f8", Encoding::Hex, Access::ReadOnly)
            }],
        );
        let io = Arc::new(MemoryRegisters::default());
        io.preload(0x00f8, &[0x20, 0x92, 0x01, 0x07]);
        let tree = RegisterTree::from_config(&cfg, 10, io).unwrap();
        let id = tree.lookup("deviceId").unwrap();

        assert_eq!(tree.render_json(id, 0).unwrap(), json!("20920107"));
    }

    #[test]
    fn metrics_rendering() {
        let io = Arc::new(MemoryRegisters::default());
        io.preload(0x0810, &2150i16.to_le_bytes());
        let tree = sample_tree(io);

        let text = tree.render_metrics("vito", 0, 0).unwrap();
        assert!(text.contains("# TYPE vito_api_boiler_flowTemp gauge\n"));
        assert!(text.contains("vito_api_boiler_flowTemp 21.5\n"));
        // write-only leaves are omitted by name
        assert!(!text.contains("enable"));
    }

    #[test]
    fn config_rejects_malformed_trees() {
        let mut bad = leaf("x", "0810", Encoding::Int, Access::ReadOnly);
        bad.children = vec![leaf("y", "0811", Encoding::Int, Access::ReadOnly)];
        let io: Arc<dyn RegisterIo> = Arc::new(MemoryRegisters::default());
        assert!(RegisterTree::from_config(&group("api", vec![bad]), 10, io.clone()).is_err());

        let mut no_addr = leaf("x", "0810", Encoding::Int, Access::ReadOnly);
        no_addr.addr = None;
        assert!(
            RegisterTree::from_config(&group("api", vec![no_addr]), 10, io.clone()).is_err()
        );

        let bad_addr = leaf("x", "zz", Encoding::Int, Access::ReadOnly);
        assert!(
            RegisterTree::from_config(&group("api", vec![bad_addr]), 10, io.clone()).is_err()
        );

        let mut pulse = leaf("x", "2301", Encoding::Bool, Access::Pulse);
        pulse.duration = None;
        assert!(RegisterTree::from_config(&group("api", vec![pulse]), 10, io.clone()).is_err());

        let dup = group(
            "api",
            vec![
                leaf("x", "0810", Encoding::Int, Access::ReadOnly),
                leaf("x", "0811", Encoding::Int, Access::ReadOnly),
            ],
        );
        assert!(RegisterTree::from_config(&dup, 10, io).is_err());
    }

    #[test]
    fn encode_decode_round_trip_per_encoding() {
        for (encoding, step) in [
            (Encoding::Int, 1.0),
            (Encoding::Half, 0.5),
            (Encoding::Deci, 0.1),
            (Encoding::Centi, 0.01),
            (Encoding::Milli, 0.001),
        ] {
            let cfg = group("api", vec![leaf("v", "0100", encoding, Access::ReadWrite)]);
            let io = Arc::new(MemoryRegisters::default());
            let tree = RegisterTree::from_config(&cfg, 10, io).unwrap();
            let id = tree.lookup("v").unwrap();

            for i in [-100i32, -1, 0, 1, 99] {
                let value = i as f64 * step;
                tree.apply_write(id, &format!("{value}"), 0).unwrap();
                let back = tree.render_json(id, 0).unwrap();
                let got = back.as_f64().unwrap_or_else(|| back.as_i64().unwrap() as f64);
                assert!(
                    (got - value).abs() <= step + 1e-9,
                    "{encoding:?}: wrote {value}, read {got}"
                );
            }
        }
    }
}
