/// Atmosphere and extraterrestrial helpers shared by the irradiance stages.
///
/// All angles are in degrees.

use std::f64::consts::PI;

// ─── Physical constants ──────────────────────────────────────
/// Solar constant W/m²
pub const SOLAR_CONSTANT: f64 = 1366.1;
/// Sea level standard pressure, Pa
pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

/// Eccentricity-corrected extraterrestrial normal irradiance (Spencer 1971).
///
/// * `day_of_year` – 1-365/366, may be fractional
pub fn extraterrestrial_irradiance(day_of_year: f64) -> f64 {
    let b = 2.0 * PI * (day_of_year - 1.0) / 365.0;
    SOLAR_CONSTANT
        * (1.00011
            + 0.034221 * b.cos()
            + 0.00128 * b.sin()
            + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Relative optical air mass, Kasten & Young (1989).
/// `None` once the sun is at or below the horizon.
pub fn relative_airmass_kasten_young(zenith: f64) -> Option<f64> {
    if !(0.0..90.0).contains(&zenith) {
        return None;
    }
    Some(1.0 / (zenith.to_radians().cos() + 0.50572 * (96.07995 - zenith).powf(-1.6364)))
}

/// Relative optical air mass, Kasten (1966). Used by the DISC model.
pub fn relative_airmass_kasten(zenith: f64) -> Option<f64> {
    if !(0.0..90.0).contains(&zenith) {
        return None;
    }
    Some(1.0 / (zenith.to_radians().cos() + 0.15 * (93.885 - zenith).powf(-1.253)))
}

/// Standard-atmosphere pressure (Pa) at `altitude` meters.
pub fn altitude_to_pressure(altitude: f64) -> f64 {
    100.0 * ((44331.514 - altitude) / 11880.516).powf(1.0 / 0.1902632)
}

/// Pressure-corrected air mass.
pub fn absolute_airmass(relative: f64, pressure: f64) -> f64 {
    relative * pressure / SEA_LEVEL_PRESSURE
}
