/// ============================================================
///  Solar geometry
///
///  Sun position from the ENEA algorithm no. 3 (Grena 2012):
///   1. Time scale      – days from 2060-01-01 0h UT, ΔT corrected
///   2. Ecliptic        – apparent sun longitude, obliquity
///   3. Equatorial      – right ascension, declination, hour angle
///   4. Topocentric     – elevation with parallax, azimuth from north
///   5. Refraction      – pressure/temperature corrected apparent elevation
///
///  Valid for 2010..=2110 with a maximum error of about 0.01°.
/// ============================================================

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::errors::{PipelineError, Result, Stage};
use crate::models::irradiance::{SolarPosition, TimeIndex, TimeSeries};
use crate::models::location::Location;

pub const FIRST_SUPPORTED_YEAR: i32 = 2010;
pub const LAST_SUPPORTED_YEAR: i32 = 2110;

/// Atmospheric and clock inputs of the position algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryParams {
    /// TT − UT in seconds
    pub delta_t: f64,
    /// Station pressure, Pa
    pub pressure: f64,
    /// Air temperature, °C
    pub temperature: f64,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self { delta_t: 69.0, pressure: 101_325.0, temperature: 12.0 }
    }
}

/// Sun position for every timestamp of `index`, in order.
pub fn solar_positions(
    location: &Location,
    index: &TimeIndex,
    params: &GeometryParams,
) -> Result<TimeSeries<SolarPosition>> {
    TimeSeries::try_from_fn(index, |i, t| {
        let year = t.with_timezone(&Utc).year();
        if !(FIRST_SUPPORTED_YEAR..=LAST_SUPPORTED_YEAR).contains(&year) {
            return Err(PipelineError::InvalidTimestamp {
                stage: Stage::SolarGeometry,
                index: i,
                reason: format!(
                    "{} outside the supported years {}..={}",
                    t.to_rfc3339(),
                    FIRST_SUPPORTED_YEAR,
                    LAST_SUPPORTED_YEAR
                ),
            });
        }
        Ok(solar_position(t, location.latitude, location.longitude, params))
    })
}

/// Sun position at one instant.
pub fn solar_position<Tz: TimeZone>(
    time: &DateTime<Tz>,
    latitude: f64,
    longitude: f64,
    params: &GeometryParams,
) -> SolarPosition {
    // ── 1. Time scale ─────────────────────────────────────────
    let t = days_from_2060(time);
    let t_e = t + 1.1574e-5 * params.delta_t;
    let omega = 0.0172019715 * t_e;

    // ── 2. Apparent longitude & obliquity ─────────────────────
    let lambda = -1.388803
        + 1.720279216e-2 * t_e
        + 3.3366e-2 * (omega - 0.06172).sin()
        + 3.53e-4 * (2.0 * omega - 0.1163).sin();
    let epsilon = 4.089567e-1 - 6.19e-9 * t_e;

    let (s_lambda, c_lambda) = lambda.sin_cos();
    let s_epsilon = epsilon.sin();
    let c_epsilon = (1.0 - s_epsilon * s_epsilon).sqrt();

    // ── 3. Right ascension, declination, hour angle ───────────
    let alpha = (s_lambda * c_epsilon).atan2(c_lambda).rem_euclid(2.0 * PI);
    let delta = (s_lambda * s_epsilon).asin();

    let h = 1.7528311 + 6.300388099 * t + longitude.to_radians() - alpha;
    let h = (h + PI).rem_euclid(2.0 * PI) - PI;

    // ── 4. Topocentric elevation & azimuth ────────────────────
    let s_phi = latitude.to_radians().sin();
    let c_phi = (1.0 - s_phi * s_phi).sqrt();
    let s_delta = delta.sin();
    let c_delta = (1.0 - s_delta * s_delta).sqrt();
    let (s_h, c_h) = h.sin_cos();

    let s_e0 = s_phi * s_delta + c_phi * c_delta * c_h;
    // parallax correction
    let e_p = s_e0.asin() - 4.26e-5 * (1.0 - s_e0 * s_e0).sqrt();
    let gamma = s_h.atan2(c_h * s_phi - s_delta * c_phi / c_delta);

    // ── 5. Refraction ─────────────────────────────────────────
    let delta_re = if e_p > 0.0 {
        let pressure_atm = params.pressure / 101_325.0;
        (0.08422 * pressure_atm)
            / ((273.0 + params.temperature) * (e_p + 0.003138 / (e_p + 0.08919)).tan())
    } else {
        0.0
    };

    let elevation = e_p.to_degrees();
    let apparent_elevation = (e_p + delta_re).to_degrees();
    SolarPosition {
        zenith: 90.0 - elevation,
        elevation,
        azimuth: (gamma + PI).to_degrees().rem_euclid(360.0),
        apparent_zenith: 90.0 - apparent_elevation,
        apparent_elevation,
    }
}

/// Days (UT) since 2060-01-01 0h, the epoch of Grena's series.
fn days_from_2060<Tz: TimeZone>(time: &DateTime<Tz>) -> f64 {
    let utc = time.with_timezone(&Utc);
    let (mut y, mut m) = (utc.year(), utc.month() as i32);
    if m <= 2 {
        m += 12;
        y -= 1;
    }
    let hours = utc.hour() as f64
        + utc.minute() as f64 / 60.0
        + (utc.second() as f64 + utc.nanosecond() as f64 * 1e-9) / 3600.0;

    (365.25 * (y - 2000) as f64).trunc()
        + (30.6001 * (m + 1) as f64).trunc()
        - (0.01 * y as f64).trunc()
        + utc.day() as f64
        + hours / 24.0
        - 21958.0
}

/// Day of year with the fraction of the UT day, 1.0 at Jan 1 0h.
pub fn fractional_day_of_year<Tz: TimeZone>(time: &DateTime<Tz>) -> f64 {
    let utc = time.with_timezone(&Utc);
    utc.ordinal() as f64 + utc.num_seconds_from_midnight() as f64 / 86_400.0
}
