use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PipelineError, Result, Stage};
use crate::models::irradiance::{PanelGeometry, PipelineResult, TimeIndex, TimeSeries};

// ─── Input ───────────────────────────────────────────────────────────────────

/// Raw request as received on the GHI topic. Every field is optional here so
/// that a missing one becomes a validation error instead of a decode error.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputRecord {
    pub time: Option<Vec<Value>>,
    pub ghi: Option<Vec<Value>>,
    pub tilt: Option<Value>,
    pub azimuth: Option<Value>,
}

/// A request that passed validation: aligned timestamps, GHI and panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub ghi: TimeSeries<f64>,
    pub panel: PanelGeometry,
}

impl Batch {
    pub fn new(times: Vec<DateTime<Tz>>, ghi: Vec<f64>, panel: PanelGeometry) -> Result<Self> {
        if times.len() != ghi.len() {
            return Err(PipelineError::malformed("List length mismatch."));
        }
        if let Some(i) = ghi.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::malformed(format!("ghi[{}] is not a finite number", i)));
        }
        let index = TimeIndex::new(times)?;
        Ok(Self { ghi: TimeSeries::new(index, ghi)?, panel })
    }

    pub fn index(&self) -> &TimeIndex {
        self.ghi.index()
    }
}

impl InputRecord {
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| PipelineError::malformed(format!("Failed to decode payload: {}", e)))
    }

    /// Single validation step run before any numeric stage.
    /// Timestamps are converted into the location's time zone.
    pub fn validate(&self, timezone: Tz) -> Result<Batch> {
        let time = self.time.as_ref().ok_or_else(|| PipelineError::malformed("Time missing in input."))?;
        let ghi = self.ghi.as_ref().ok_or_else(|| PipelineError::malformed("GHI missing in input."))?;
        let tilt = self.tilt.as_ref().ok_or_else(|| PipelineError::malformed("Tilt missing in input."))?;
        let azimuth = self
            .azimuth
            .as_ref()
            .ok_or_else(|| PipelineError::malformed("Azimuth missing in input."))?;

        if time.len() != ghi.len() {
            return Err(PipelineError::malformed("List length mismatch."));
        }
        if time.is_empty() {
            return Err(PipelineError::malformed("Input lists are empty."));
        }

        let times = time
            .iter()
            .enumerate()
            .map(|(index, v)| {
                let s = v.as_str().ok_or_else(|| PipelineError::InvalidTimestamp {
                    stage: Stage::Validation,
                    index,
                    reason: format!("expected a string, got {}", v),
                })?;
                parse_timestamp(s, timezone).map_err(|reason| PipelineError::InvalidTimestamp {
                    stage: Stage::Validation,
                    index,
                    reason,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ghi = ghi
            .iter()
            .enumerate()
            .map(|(i, v)| parse_number(v).map_err(|e| PipelineError::malformed(format!("ghi[{}]: {}", i, e))))
            .collect::<Result<Vec<_>>>()?;

        let tilt = parse_number(tilt).map_err(|e| PipelineError::malformed(format!("tilt: {}", e)))?;
        let azimuth = parse_number(azimuth).map_err(|e| PipelineError::malformed(format!("azimuth: {}", e)))?;

        Batch::new(times, ghi, PanelGeometry::new(tilt, azimuth)?)
    }
}

/// Parses an instant that carries an explicit UTC offset.
pub fn parse_timestamp(s: &str, timezone: Tz) -> std::result::Result<DateTime<Tz>, String> {
    let s = s.trim();
    // accept the space separated form pandas and Python's isoformat emit
    DateTime::parse_from_rfc3339(&s.replacen(' ', "T", 1))
        .map(|t| t.with_timezone(&timezone))
        .map_err(|e| {
            let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"));
            if naive.is_ok() {
                format!("'{}' has no UTC offset", s)
            } else {
                format!("'{}' is not a timestamp: {}", s, e)
            }
        })
}

fn parse_number(v: &Value) -> std::result::Result<f64, String> {
    let x = match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not representable as f64", n))?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| format!("'{}': {}", s, e))?,
        other => return Err(format!("expected a number, got {}", other)),
    };
    if x.is_finite() { Ok(x) } else { Err(format!("{} is not finite", x)) }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Result payload published on the irradiance topic. Each list is aligned
/// one-to-one with the request's `time` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub sun_elevation: Vec<f64>,
    pub sun_azimuth: Vec<f64>,
    pub sun_zenith: Vec<f64>,
    pub clearsky_ghi: Vec<f64>,
    pub clearsky_dni: Vec<f64>,
    pub clearsky_dhi: Vec<f64>,
    pub global_ghi: Vec<f64>,
    pub global_dni: Vec<f64>,
    pub global_dhi: Vec<f64>,
    pub panel_total: Vec<f64>,
    pub panel_direct: Vec<f64>,
    pub panel_diffuse: Vec<f64>,
    pub panel_sky_diffuse: Vec<f64>,
    pub panel_ground_diffuse: Vec<f64>,
}

impl From<&PipelineResult> for OutputRecord {
    fn from(r: &PipelineResult) -> Self {
        let sp = r.solar_position.values();
        let cs = r.clear_sky.values();
        let gl = r.global.values();
        let pn = r.panel.values();
        Self {
            sun_elevation: sp.iter().map(|p| p.elevation).collect(),
            sun_azimuth: sp.iter().map(|p| p.azimuth).collect(),
            sun_zenith: sp.iter().map(|p| p.zenith).collect(),
            clearsky_ghi: cs.iter().map(|t| t.ghi).collect(),
            clearsky_dni: cs.iter().map(|t| t.dni).collect(),
            clearsky_dhi: cs.iter().map(|t| t.dhi).collect(),
            global_ghi: gl.iter().map(|t| t.ghi).collect(),
            global_dni: gl.iter().map(|t| t.dni).collect(),
            global_dhi: gl.iter().map(|t| t.dhi).collect(),
            panel_total: pn.iter().map(|p| p.poa_global).collect(),
            panel_direct: pn.iter().map(|p| p.poa_direct).collect(),
            panel_diffuse: pn.iter().map(|p| p.poa_diffuse).collect(),
            panel_sky_diffuse: pn.iter().map(|p| p.poa_sky_diffuse).collect(),
            panel_ground_diffuse: pn.iter().map(|p| p.poa_ground_diffuse).collect(),
        }
    }
}

/// Failure payload published on the error topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: String,
    pub kind: String,
    pub message: String,
}

impl From<&PipelineError> for ErrorRecord {
    fn from(e: &PipelineError) -> Self {
        Self {
            stage: e.stage().to_string(),
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Berlin;
    use serde_json::json;

    fn record(v: Value) -> InputRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_valid_record() {
        let r = record(json!({
            "time": ["2024-06-21T12:00:00+02:00", "2024-06-21 13:00:00+02:00"],
            "ghi": [800.5, "812"],
            "tilt": 30,
            "azimuth": 180.0
        }));
        let batch = r.validate(Berlin).unwrap();
        assert_eq!(batch.ghi.values(), &[800.5, 812.0]);
        assert_eq!(batch.index().times()[1].hour(), 13);
        assert_eq!(batch.panel, PanelGeometry { tilt: 30.0, azimuth: 180.0 });
    }

    #[test]
    fn test_utc_input_is_converted_to_location_zone() {
        let t = parse_timestamp("2024-06-21T10:00:00Z", Berlin).unwrap();
        assert_eq!(t.hour(), 12);
    }

    #[test]
    fn test_missing_fields() {
        let err = record(json!({"ghi": [1], "tilt": 0, "azimuth": 0})).validate(Berlin).unwrap_err();
        assert_eq!(err, PipelineError::malformed("Time missing in input."));
        let err = record(json!({"time": [], "ghi": [], "azimuth": 0})).validate(Berlin).unwrap_err();
        assert_eq!(err, PipelineError::malformed("Tilt missing in input."));
    }

    #[test]
    fn test_length_mismatch() {
        let r = record(json!({
            "time": ["2024-06-21T10:00:00Z", "2024-06-21T11:00:00Z", "2024-06-21T12:00:00Z"],
            "ghi": [1.0, 2.0],
            "tilt": 30,
            "azimuth": 180
        }));
        let err = r.validate(Berlin).unwrap_err();
        assert_eq!(err.kind(), "MalformedInput");
    }

    #[test]
    fn test_naive_timestamp_is_invalid() {
        let r = record(json!({
            "time": ["2024-06-21T10:00:00"],
            "ghi": [1.0],
            "tilt": 30,
            "azimuth": 180
        }));
        match r.validate(Berlin).unwrap_err() {
            PipelineError::InvalidTimestamp { index, reason, .. } => {
                assert_eq!(index, 0);
                assert!(reason.contains("no UTC offset"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bad_numbers() {
        let r = record(json!({
            "time": ["2024-06-21T10:00:00Z"],
            "ghi": ["abc"],
            "tilt": 30,
            "azimuth": 180
        }));
        assert_eq!(r.validate(Berlin).unwrap_err().kind(), "MalformedInput");

        let r = record(json!({
            "time": ["2024-06-21T10:00:00Z"],
            "ghi": [1.0],
            "tilt": 120,
            "azimuth": 180
        }));
        assert_eq!(r.validate(Berlin).unwrap_err().kind(), "MalformedInput");
    }

    #[test]
    fn test_undecodable_payload() {
        let err = InputRecord::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.stage(), Stage::Validation);
    }
}
