use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::errors::{PipelineError, Result, Stage};

// ─── Time index & series ─────────────────────────────────────────────────────

/// Strictly increasing, timezone-aware timestamps shared by every series of
/// one pipeline invocation.
#[derive(Debug, Clone)]
pub struct TimeIndex(Arc<[DateTime<Tz>]>);

impl TimeIndex {
    pub fn new(times: Vec<DateTime<Tz>>) -> Result<Self> {
        if times.is_empty() {
            return Err(PipelineError::malformed("time index is empty"));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PipelineError::InvalidTimestamp {
                stage: Stage::Validation,
                index: i + 1,
                reason: format!("{} does not follow {}", times[i + 1].to_rfc3339(), times[i].to_rfc3339()),
            });
        }
        Ok(Self(times.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn times(&self) -> &[DateTime<Tz>] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Tz>> {
        self.0.iter()
    }

    pub fn same_as(&self, other: &TimeIndex) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl PartialEq for TimeIndex {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

/// One value per timestamp of a [`TimeIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    index: TimeIndex,
    values: Vec<T>,
}

impl<T> TimeSeries<T> {
    pub fn new(index: TimeIndex, values: Vec<T>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(PipelineError::malformed(format!(
                "{} values for {} timestamps",
                values.len(),
                index.len()
            )));
        }
        Ok(Self { index, values })
    }

    pub fn try_from_fn<F>(index: &TimeIndex, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, &DateTime<Tz>) -> Result<T>,
    {
        let values = index
            .iter()
            .enumerate()
            .map(|(i, t)| f(i, t))
            .collect::<Result<Vec<T>>>()?;
        Ok(Self { index: index.clone(), values })
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Tz>, &T)> {
        self.index.iter().zip(self.values.iter())
    }

    pub fn map<U, F>(&self, f: F) -> TimeSeries<U>
    where
        F: FnMut(&T) -> U,
    {
        TimeSeries {
            index: self.index.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Fails unless `other` is indexed by the same timestamps.
    pub fn ensure_aligned<U>(&self, other: &TimeSeries<U>, stage: Stage) -> Result<()> {
        if self.index.same_as(&other.index) {
            Ok(())
        } else {
            Err(PipelineError::MalformedInput {
                stage,
                reason: "series are not aligned to the same time index".to_string(),
            })
        }
    }
}

// ─── Clamping contract ───────────────────────────────────────────────────────

/// Irradiance post-condition: non-finite or negative values become 0.
#[inline]
pub fn clamp_irradiance(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

/// Counts how many values the clamping contract had to mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClampStats {
    pub clamped: usize,
    pub total: usize,
}

impl ClampStats {
    pub fn apply(&mut self, value: f64) -> f64 {
        let out = clamp_irradiance(value);
        self.total += 1;
        if out != value {
            self.clamped += 1;
        }
        out
    }
}

/// Fails with `NumericDegeneracy` on the first non-finite value.
pub fn ensure_finite(stage: Stage, field: &'static str, values: impl IntoIterator<Item = f64>) -> Result<()> {
    match values.into_iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, value)) => Err(PipelineError::NumericDegeneracy { stage, field, index, value }),
        None => Ok(()),
    }
}

// ─── Per-timestamp records ───────────────────────────────────────────────────

/// Sun position in degrees. Azimuth is measured clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolarPosition {
    /// Geometric zenith, without refraction
    pub zenith: f64,
    pub elevation: f64,
    pub azimuth: f64,
    /// Zenith corrected for atmospheric refraction
    pub apparent_zenith: f64,
    pub apparent_elevation: f64,
}

impl SolarPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.zenith < 90.0
    }
}

/// Horizontal irradiance components (W/m²).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IrradianceTriplet {
    pub ghi: f64,
    pub dni: f64,
    pub dhi: f64,
}

impl IrradianceTriplet {
    pub const ZERO: IrradianceTriplet = IrradianceTriplet { ghi: 0.0, dni: 0.0, dhi: 0.0 };

    /// Applies the clamping contract to all three components.
    pub fn clamped(self, stats: &mut ClampStats) -> Self {
        Self {
            ghi: stats.apply(self.ghi),
            dni: stats.apply(self.dni),
            dhi: stats.apply(self.dhi),
        }
    }
}

/// Fixed panel orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanelGeometry {
    /// Degrees from horizontal, 0..=90
    pub tilt: f64,
    /// Facing direction, degrees clockwise from north (180 = south)
    pub azimuth: f64,
}

impl PanelGeometry {
    pub fn new(tilt: f64, azimuth: f64) -> Result<Self> {
        if !tilt.is_finite() || !(0.0..=90.0).contains(&tilt) {
            return Err(PipelineError::malformed(format!("tilt {} outside 0..=90 degrees", tilt)));
        }
        if !azimuth.is_finite() {
            return Err(PipelineError::malformed(format!("azimuth {} is not a finite angle", azimuth)));
        }
        Ok(Self { tilt, azimuth: azimuth.rem_euclid(360.0) })
    }
}

/// Plane-of-array irradiance (W/m²).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PanelIrradiance {
    pub poa_global: f64,
    pub poa_direct: f64,
    /// Sky plus ground diffuse
    pub poa_diffuse: f64,
    pub poa_sky_diffuse: f64,
    pub poa_ground_diffuse: f64,
}

impl PanelIrradiance {
    pub fn from_components(direct: f64, sky_diffuse: f64, ground_diffuse: f64) -> Self {
        let diffuse = sky_diffuse + ground_diffuse;
        Self {
            poa_global: direct + diffuse,
            poa_direct: direct,
            poa_diffuse: diffuse,
            poa_sky_diffuse: sky_diffuse,
            poa_ground_diffuse: ground_diffuse,
        }
    }
}

/// Everything one pipeline invocation produces, on a single time index.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub solar_position: TimeSeries<SolarPosition>,
    pub clear_sky: TimeSeries<IrradianceTriplet>,
    pub global: TimeSeries<IrradianceTriplet>,
    pub panel: TimeSeries<PanelIrradiance>,
}

impl PipelineResult {
    pub fn index(&self) -> &TimeIndex {
        self.solar_position.index()
    }

    pub fn len(&self) -> usize {
        self.solar_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solar_position.is_empty()
    }
}
