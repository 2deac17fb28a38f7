/// ============================================================
///  Irradiance pipeline
///
///   Geometry → Clear-sky → Decomposition → Completion → Transposition
///
///  Each stage consumes the complete output of the previous one.
///  The first failing stage aborts the batch; nothing partial is
///  returned. The pipeline holds only immutable configuration and
///  can be shared between threads.
/// ============================================================

use log::debug;

use crate::config::ModelConfig;
use crate::errors::{Result, Stage};
use crate::models::irradiance::{PipelineResult, TimeSeries};
use crate::models::location::Location;
use crate::models::message::{Batch, InputRecord};
use crate::services::atmosphere::{altitude_to_pressure, SEA_LEVEL_PRESSURE};
use crate::services::clear_sky::clear_sky;
use crate::services::completion::complete_irradiance;
use crate::services::decomposition::{dirindex, DirintCoefficients};
use crate::services::solar_geometry::{solar_positions, GeometryParams};
use crate::services::transposition::transpose;

#[derive(Debug, Clone)]
pub struct IrradiancePipeline {
    location: Location,
    model: ModelConfig,
    /// Station pressure from the site elevation, Pa
    pressure: f64,
    dirint: DirintCoefficients,
}

impl IrradiancePipeline {
    /// Pipeline with the unit DIRINT table.
    pub fn new(location: Location, model: ModelConfig) -> Self {
        let pressure = altitude_to_pressure(location.elevation);
        Self { location, model, pressure, dirint: DirintCoefficients::unit() }
    }

    pub fn with_dirint_coefficients(mut self, coefficients: DirintCoefficients) -> Self {
        self.dirint = coefficients;
        self
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    /// Decodes, validates and runs one raw payload.
    pub fn process_payload(&self, payload: &[u8]) -> Result<PipelineResult> {
        self.process(&InputRecord::from_slice(payload)?)
    }

    /// Validates one input record and runs it.
    pub fn process(&self, record: &InputRecord) -> Result<PipelineResult> {
        let batch = record.validate(self.location.timezone)?;
        self.run(&batch)
    }

    /// Runs all stages over a validated batch.
    pub fn run(&self, batch: &Batch) -> Result<PipelineResult> {
        let index = batch.index();
        debug!(
            "{}: {} samples from {} to {}",
            self.location.name,
            index.len(),
            index.times()[0].to_rfc3339(),
            index.times()[index.len() - 1].to_rfc3339()
        );
        dump(Stage::Validation, &batch.ghi);

        let geometry = GeometryParams {
            delta_t: self.model.delta_t,
            pressure: self.pressure,
            temperature: self.model.temperature_c,
        };
        let solar_position = solar_positions(&self.location, index, &geometry)?;
        dump(Stage::SolarGeometry, &solar_position);

        let clear_sky = clear_sky(
            &solar_position,
            self.pressure,
            self.location.elevation,
            &self.model.linke_turbidity,
            self.model.perez_enhancement,
        )?;
        dump(Stage::ClearSky, &clear_sky);

        // decomposition runs at standard pressure, the site pressure only
        // enters geometry and clear sky
        let dni = dirindex(&batch.ghi, &clear_sky, &solar_position, SEA_LEVEL_PRESSURE, &self.dirint)?;
        dump(Stage::Decomposition, &dni);

        let global = complete_irradiance(&solar_position, &batch.ghi, &dni)?;
        dump(Stage::Completion, &global);

        let panel = transpose(
            self.model.transposition,
            &batch.panel,
            &solar_position,
            &global,
            self.model.albedo(),
        )?;
        dump(Stage::Transposition, &panel);

        Ok(PipelineResult { solar_position, clear_sky, global, panel })
    }
}

#[cfg(feature = "verbose_log")]
fn dump<T: std::fmt::Debug>(stage: Stage, series: &TimeSeries<T>) {
    for (t, v) in series.iter() {
        debug!("[{}] {} {:?}", stage, t.to_rfc3339(), v);
    }
}

#[cfg(not(feature = "verbose_log"))]
fn dump<T: std::fmt::Debug>(_stage: Stage, _series: &TimeSeries<T>) {}
