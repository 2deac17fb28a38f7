use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::location::Location;
use crate::services::clear_sky::LinkeTurbidity;
use crate::services::decomposition::DirintCoefficients;
use crate::services::transposition::{SkyDiffuseModel, SurfaceType};

fn default_broker_port() -> u16 { 1883 }
fn default_base_topic() -> String { "pv_model".to_string() }
fn default_keep_alive_s() -> u64 { 30 }
fn default_max_packet_size() -> usize { 1024 * 1024 }
fn default_delta_t() -> f64 { 69.0 }
fn default_temperature_c() -> f64 { 12.0 }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub location: LocationConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
    pub timezone: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// Empty → `pv_model-<uuid>`
    #[serde(default)]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    #[serde(default = "default_keep_alive_s")]
    pub keep_alive_s: u64,
    /// Upper bound for incoming and outgoing packets, bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

/// Model choices and atmospheric parameters of the pipeline.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub transposition: SkyDiffuseModel,
    #[serde(default)]
    pub surface_type: SurfaceType,
    /// Overrides the albedo of `surface_type`
    #[serde(default)]
    pub albedo: Option<f64>,
    #[serde(default)]
    pub linke_turbidity: LinkeTurbidity,
    /// TT − UT in seconds
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,
    /// Air temperature for refraction, °C
    #[serde(default = "default_temperature_c")]
    pub temperature_c: f64,
    /// Perez low-sun enhancement of the clear-sky GHI
    #[serde(default)]
    pub perez_enhancement: bool,
    /// JSON file with the 6×6×7×5 DIRINT coefficient table
    #[serde(default)]
    pub dirint_coefficients: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            transposition: SkyDiffuseModel::default(),
            surface_type: SurfaceType::default(),
            albedo: None,
            linke_turbidity: LinkeTurbidity::default(),
            delta_t: default_delta_t(),
            temperature_c: default_temperature_c(),
            perez_enhancement: false,
            dirint_coefficients: None,
        }
    }
}

impl ModelConfig {
    pub fn albedo(&self) -> f64 {
        self.albedo.unwrap_or_else(|| self.surface_type.albedo())
    }

    /// The configured DIRINT table, or the unit table when none is set.
    pub fn load_dirint_coefficients(&self) -> Result<DirintCoefficients, ConfigError> {
        match &self.dirint_coefficients {
            Some(path) => DirintCoefficients::load(path),
            None => Ok(DirintCoefficients::unit()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(a) = self.albedo {
            if !a.is_finite() || !(0.0..=1.0).contains(&a) {
                return Err(invalid("albedo", a.to_string(), "must be within 0..=1"));
            }
        }
        if !self.linke_turbidity.is_valid() {
            return Err(invalid(
                "linke_turbidity",
                format!("{:?}", self.linke_turbidity),
                "every value must be finite and at least 1",
            ));
        }
        if !self.delta_t.is_finite() {
            return Err(invalid("delta_t", self.delta_t.to_string(), "must be finite"));
        }
        if !self.temperature_c.is_finite() || self.temperature_c <= -273.0 {
            return Err(invalid("temperature_c", self.temperature_c.to_string(), "must be above -273 °C"));
        }
        Ok(())
    }
}

impl LocationConfig {
    pub fn to_location(&self) -> Result<Location, ConfigError> {
        Location::new(&self.name, self.latitude, self.longitude, self.elevation, &self.timezone)
    }
}

impl MqttConfig {
    fn topic(&self, leaf: &str) -> String {
        format!("{}/{}", self.base_topic.trim_end_matches('/'), leaf)
    }

    pub fn status_topic(&self) -> String { self.topic("status") }
    pub fn ghi_topic(&self) -> String { self.topic("ghi") }
    pub fn irad_topic(&self) -> String { self.topic("irad") }
    pub fn error_topic(&self) -> String { self.topic("error") }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.location.to_location()?;
        config.model.validate()?;
        Ok(config)
    }
}

fn invalid(name: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter { name, value, reason: reason.to_string() }
}
