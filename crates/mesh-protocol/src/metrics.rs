//! TPU metrics probe
//!
//! The probe is a Python snippet run on each host. It prints exactly one
//! JSON object on stdout: either the chip metrics or `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote command printing the host's TPU metrics as JSON
pub const TPU_METRICS_PROBE: &str = r#"python3 -c "
import json
import sys
try:
    from tpu_info import device, metrics
    chips = device.get_local_chips()
    if not chips:
        print(json.dumps({'error': 'no TPU chips found'}))
        sys.exit(1)
    chip_type = chips[0]['type']
    usage = metrics.get_chip_usage(chip_type)
    print(json.dumps({
        'chip_type': chip_type,
        'chip_count': len(chips),
        'chips': usage
    }))
except ImportError as e:
    print(json.dumps({'error': f'tpu-info not installed: {e}'}))
    sys.exit(1)
except Exception as e:
    print(json.dumps({'error': str(e)}))
    sys.exit(1)
""#;

/// Errors decoding probe output
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe printed no JSON object
    #[error("probe produced no JSON output")]
    NoOutput,

    /// The JSON did not match the expected shape
    #[error("invalid probe output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metrics for a single TPU chip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TpuChipMetrics {
    #[serde(default)]
    pub device_id: i64,
    /// Bytes in use
    #[serde(default)]
    pub memory_usage: i64,
    /// Bytes available in total
    #[serde(default)]
    pub total_memory: i64,
    #[serde(default)]
    pub duty_cycle_pct: f64,
    #[serde(default)]
    pub chip_type: String,
}

/// Metrics for every chip on one host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TpuHostMetrics {
    #[serde(default)]
    pub chip_type: String,
    #[serde(default)]
    pub chip_count: usize,
    #[serde(default)]
    pub chips: Vec<TpuChipMetrics>,
    /// Set when the host could not report metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TpuHostMetrics {
    /// A row for a host that failed to report
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Decode probe output.
    ///
    /// The last line that looks like a JSON object wins, so stray
    /// warnings printed by the interpreter before the result are ignored.
    pub fn parse(output: &str) -> Result<Self, ProbeError> {
        let line = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| line.starts_with('{'))
            .ok_or(ProbeError::NoOutput)?;
        Ok(serde_json::from_str(line)?)
    }

    /// Memory in use, in gigabytes
    pub fn memory_usage_gb(&self) -> f64 {
        self.chips.iter().map(|c| c.memory_usage).sum::<i64>() as f64 / 1e9
    }

    /// Total memory, in gigabytes
    pub fn total_memory_gb(&self) -> f64 {
        self.chips.iter().map(|c| c.total_memory).sum::<i64>() as f64 / 1e9
    }

    /// Mean duty cycle across chips
    pub fn avg_utilization(&self) -> f64 {
        if self.chips.is_empty() {
            return 0.0;
        }
        self.chips.iter().map(|c| c.duty_cycle_pct).sum::<f64>() / self.chips.len() as f64
    }
}
