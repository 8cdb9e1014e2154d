use serde::{Deserialize, Serialize};

use foundation::DEFAULT_DETAIL_BIAS;

/// Tunables for one streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum queries awaiting a response (backpressure).
    pub max_outstanding: usize,

    /// Maximum populated cells kept rendered before FIFO eviction.
    pub max_cells: usize,

    /// Largest compressed or decoded array accepted from the server.
    pub max_array_bytes: u64,

    /// Depth down to which traversal always expands.
    pub unconditional_depth: usize,

    /// Additive term of the ideal-depth falloff.
    pub detail_bias: f64,

    /// Server-side expansion hint carried by every queried address.
    pub span: u8,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_outstanding: 512,
            max_cells: 4096,
            max_array_bytes: 256 * 1024 * 1024,
            unconditional_depth: 3,
            detail_bias: DEFAULT_DETAIL_BIAS,
            span: 0,
        }
    }
}

impl StreamingConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::StreamingConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = StreamingConfig::from_json_str(r#"{ "max_cells": 16, "detail_bias": 9.7 }"#)
            .expect("parse");
        assert_eq!(
            cfg,
            StreamingConfig {
                max_cells: 16,
                detail_bias: 9.7,
                ..StreamingConfig::default()
            }
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(StreamingConfig::from_json_str("{ max_cells: 16 }").is_err());
        assert!(StreamingConfig::from_json_str(r#"{ "span": 300 }"#).is_err());
    }
}
