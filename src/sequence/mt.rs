//! bSSFP acquisitions with varying pulse timing, used for magnetization transfer.
//!
//! JSON: `{"TR": [s], "Trf": [s], "FA": [deg], "pulse": {"p1": .., "p2": ..}}`
//!
//! `TR`, `Trf` and `FA` are parallel arrays; changing `Trf` at fixed flip
//! angle changes the RF power and therefore the bound-pool saturation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::sequence::{
    Sequence, degrees_to_radians, ensure_finite, ensure_positive, parse_fields, radians_to_degrees,
};

/// Shape integrals of the excitation pulse, normalised to a hard pulse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RfPulse {
    /// Normalised ∫B1 dt.
    pub p1: f64,
    /// Normalised ∫B1² dt.
    pub p2: f64,
}

impl Default for RfPulse {
    fn default() -> Self {
        Self {
            p1: 1.0,
            p2: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SsfpMtFields {
    #[serde(rename = "TR")]
    tr: Vec<f64>,
    #[serde(rename = "Trf")]
    trf: Vec<f64>,
    #[serde(rename = "FA")]
    fa: Vec<f64>,
    pulse: RfPulse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsfpMtSequence {
    pub tr: Vec<f64>,
    pub trf: Vec<f64>,
    /// Flip angles (rad).
    pub flip: Vec<f64>,
    pub pulse: RfPulse,
}

impl SsfpMtSequence {
    pub const NAME: &'static str = "SSFPMT";

    pub fn new(tr: Vec<f64>, trf: Vec<f64>, flip: Vec<f64>, pulse: RfPulse) -> Result<Self, AppError> {
        let name = Self::NAME;
        if tr.len() != trf.len() || tr.len() != flip.len() {
            return Err(AppError::config(format!(
                "While reading {name} sequence: parameters had differing lengths (TR={}, FA={}, Trf={})",
                tr.len(),
                flip.len(),
                trf.len()
            )));
        }
        if tr.is_empty() {
            return Err(AppError::config(format!(
                "While reading {name} sequence: TR, Trf and FA must not be empty"
            )));
        }
        ensure_finite(name, "FA", &flip)?;
        for (i, (&t, &rf)) in tr.iter().zip(trf.iter()).enumerate() {
            ensure_positive(name, &format!("TR[{i}]"), t)?;
            ensure_positive(name, &format!("Trf[{i}]"), rf)?;
            if rf >= t {
                return Err(AppError::config(format!(
                    "While reading {name} sequence: Trf[{i}] ({rf}) must be shorter than TR[{i}] ({t})"
                )));
            }
        }
        ensure_positive(name, "pulse.p1", pulse.p1)?;
        ensure_positive(name, "pulse.p2", pulse.p2)?;
        Ok(Self {
            tr,
            trf,
            flip,
            pulse,
        })
    }

    pub fn from_json(json: &Value) -> Result<Self, AppError> {
        let f: SsfpMtFields = parse_fields(Self::NAME, json)?;
        Self::new(f.tr, f.trf, degrees_to_radians(&f.fa), f.pulse)
    }
}

impl Sequence for SsfpMtSequence {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.flip.len()
    }

    fn to_json(&self) -> Value {
        serde_json::json!(SsfpMtFields {
            tr: self.tr.clone(),
            trf: self.trf.clone(),
            fa: radians_to_degrees(&self.flip),
            pulse: self.pulse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn differing_lengths_are_reported_with_counts() {
        let json = serde_json::json!({
            "TR": [0.004, 0.005],
            "Trf": [0.0005],
            "FA": [20, 30],
            "pulse": { "p1": 1.0, "p2": 1.0 },
        });
        let err = SsfpMtSequence::from_json(&json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("TR=2"));
        assert!(err.message().contains("Trf=1"));
    }

    #[test]
    fn pulse_is_required_and_extra_keys_are_ignored() {
        let json = serde_json::json!({ "TR": [0.004], "Trf": [0.0005], "FA": [20] });
        assert!(SsfpMtSequence::from_json(&json).is_err());

        let json = serde_json::json!({
            "TR": [0.004], "Trf": [0.0005], "FA": [20], "pulse": { "p1": 0.5, "p2": 0.4, "bandwidth": 2.0 },
        });
        let seq = SsfpMtSequence::from_json(&json).unwrap();
        assert_eq!(seq.size(), 1);
        assert_eq!(seq.pulse, RfPulse { p1: 0.5, p2: 0.4 });
        assert_eq!(seq.to_json()["pulse"], serde_json::json!({ "p1": 0.5, "p2": 0.4 }));
        assert!(seq.weights(0.0).is_none());
    }
}
