//! The metric domain model shared by agent and server.
//!
//! A metric is a tagged union over two kinds: `counter` carries an integer
//! `delta` and accumulates server-side; `gauge` carries a float `value` and
//! overwrites. Identity is the `(id, type)` pair, so the same id under
//! different kinds names two distinct entities.

use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two supported metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| VigilError::UnknownKind(s.to_string()))
    }
}

/// A single metric as it travels the wire.
///
/// Serialized as `{"id": .., "type": .., "delta": ..}` for counters and
/// `{"id": .., "type": .., "value": ..}` for gauges; the absent field is
/// omitted entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self { id: id.into(), kind: MetricKind::Counter, delta: Some(delta), value: None }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self { id: id.into(), kind: MetricKind::Gauge, delta: None, value: Some(value) }
    }

    /// Enforce the per-kind payload invariant.
    ///
    /// A counter without a delta (or a gauge without a value) is rejected at
    /// every boundary; an empty id never identifies anything.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(VigilError::EmptyId);
        }
        match self.kind {
            MetricKind::Counter if self.delta.is_none() => Err(VigilError::MissingPayload {
                id: self.id.clone(),
                kind: "counter",
                field: "delta",
            }),
            MetricKind::Gauge if self.value.is_none() => Err(VigilError::MissingPayload {
                id: self.id.clone(),
                kind: "gauge",
                field: "value",
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_json_shape() {
        let m = Metric::counter("PollCount", 7);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":7}"#);
    }

    #[test]
    fn gauge_json_shape() {
        let m = Metric::gauge("Alloc", 1024.5);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":1024.5}"#);
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let gauge = Metric::gauge("g", 0.1 + 0.2);
        let back: Metric = serde_json::from_str(&serde_json::to_string(&gauge).unwrap()).unwrap();
        assert_eq!(back.value.unwrap().to_bits(), (0.1f64 + 0.2).to_bits());

        let counter = Metric::counter("c", i64::MIN);
        let back: Metric = serde_json::from_str(&serde_json::to_string(&counter).unwrap()).unwrap();
        assert_eq!(back, counter);
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let err = serde_json::from_str::<Metric>(r#"{"id":"x","type":"histogram"}"#);
        assert!(err.is_err());
        assert!(matches!(
            "histogram".parse::<MetricKind>(),
            Err(VigilError::UnknownKind(_))
        ));
    }

    #[test]
    fn validate_rejects_missing_payload() {
        let m = Metric { id: "c".into(), kind: MetricKind::Counter, delta: None, value: None };
        assert!(matches!(m.validate(), Err(VigilError::MissingPayload { field: "delta", .. })));

        let m = Metric { id: "g".into(), kind: MetricKind::Gauge, delta: None, value: None };
        assert!(matches!(m.validate(), Err(VigilError::MissingPayload { field: "value", .. })));
    }

    #[test]
    fn validate_rejects_empty_id() {
        let m = Metric::gauge("", 1.0);
        assert!(matches!(m.validate(), Err(VigilError::EmptyId)));
    }

    #[test]
    fn validate_accepts_well_formed() {
        assert!(Metric::counter("c", -3).validate().is_ok());
        assert!(Metric::gauge("g", f64::MAX).validate().is_ok());
    }
}
