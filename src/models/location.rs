use chrono_tz::Tz;

use crate::errors::ConfigError;

/// The single site the service models. Built once at start-up and shared
/// read-only by every pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    /// Degrees north, -90..=90
    pub latitude: f64,
    /// Degrees east, -180..=180
    pub longitude: f64,
    /// Meters above sea level
    pub elevation: f64,
    pub timezone: Tz,
}

impl Location {
    pub fn new(
        name: &str,
        latitude: f64,
        longitude: f64,
        elevation: f64,
        timezone: &str,
    ) -> Result<Self, ConfigError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid("latitude", latitude, "must be within -90..=90 degrees"));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid("longitude", longitude, "must be within -180..=180 degrees"));
        }
        if !elevation.is_finite() {
            return Err(invalid("elevation", elevation, "must be finite"));
        }
        let timezone: Tz = timezone.parse().map_err(|_| ConfigError::InvalidParameter {
            name: "timezone",
            value: timezone.to_string(),
            reason: "unknown IANA time zone".to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            latitude,
            longitude,
            elevation,
            timezone,
        })
    }
}

fn invalid(name: &'static str, value: f64, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
