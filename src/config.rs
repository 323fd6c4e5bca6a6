use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub timeout: u64,
}

/// Fixed-point, boolean or hex conversion rule applied between raw
/// register bytes and the value served over HTTP.
#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Int,
    Half,
    Deci,
    Centi,
    Milli,
    Bool,
    Hex,
}

impl Encoding {
    pub fn scale(self) -> i32 {
        match self {
            Encoding::Half => 2,
            Encoding::Deci => 10,
            Encoding::Centi => 100,
            Encoding::Milli => 1000,
            Encoding::Int | Encoding::Bool | Encoding::Hex => 1,
        }
    }

    pub fn default_len(self) -> usize {
        match self {
            Encoding::Bool | Encoding::Hex => 1,
            _ => 2,
        }
    }
}

/// Pulse is write-only with an auto-off duration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    Pulse,
}

impl Access {
    pub fn is_readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LineMode {
    Counter,
    Frequency,
}

/// One node of the register description. A node is either a group
/// (non-empty `children`) or a leaf; leaves are device-backed (`addr`)
/// or GPIO-backed (`line` + `source`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegisterConfig {
    pub name: String,
    #[serde(default)]
    pub children: Vec<RegisterConfig>,
    /// Hex register address, e.g. "0810".
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub encoding: Option<Encoding>,
    #[serde(default)]
    pub len: Option<usize>,
    #[serde(default)]
    pub access: Option<Access>,
    /// Cache validity in seconds. Defaults to the tree-wide default.
    #[serde(default)]
    pub refresh: Option<u64>,
    /// Auto-off delay in seconds, required for pulse leaves.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Divisor override; frequency leaves use it as the rate numerator.
    #[serde(default)]
    pub scale: Option<i32>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub source: Option<LineMode>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    pub line: u32,
    #[serde(default)]
    pub min_gap_ms: u64,
    #[serde(default = "default_ratio")]
    pub ratio: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GpioConfig {
    #[serde(default = "default_chip")]
    pub chip: String,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: default_chip(),
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
    /// Register path the scrape walks; empty serves the whole tree.
    #[serde(default)]
    pub root: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: default_metrics_prefix(),
            root: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    pub device: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub serial: Option<SerialConfig>,
    #[serde(default = "default_refresh")]
    pub default_refresh: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    pub registers: RegisterConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))
    }
}

fn default_ratio() -> u32 {
    1
}

fn default_chip() -> String {
    "/dev/gpiochip0".to_string()
}

fn default_metrics_prefix() -> String {
    "vito".to_string()
}

fn default_refresh() -> u64 {
    10
}
