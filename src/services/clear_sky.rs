/// ============================================================
///  Clear-sky reference – Ineichen & Perez (2002)
///
///  GHI/DNI under a cloudless sky from the apparent zenith,
///  pressure-corrected air mass, site altitude and the Linke
///  turbidity factor. Night-time or undefined values become 0.
/// ============================================================

use chrono::{DateTime, Datelike, TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, Stage};
use crate::models::irradiance::{IrradianceTriplet, ClampStats, SolarPosition, TimeSeries};
use crate::services::atmosphere::{
    absolute_airmass, extraterrestrial_irradiance, relative_airmass_kasten_young,
};
use crate::services::solar_geometry::fractional_day_of_year;

/// Typical Central European monthly Linke turbidity, January first.
pub const CENTRAL_EUROPE_MONTHLY: [f64; 12] =
    [3.0, 3.2, 3.6, 3.9, 4.1, 4.2, 4.3, 4.2, 3.8, 3.4, 3.1, 3.0];

/// Linke turbidity: either one value for the whole year or a monthly
/// climatology interpolated on the day of year.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LinkeTurbidity {
    Constant(f64),
    Monthly([f64; 12]),
}

impl Default for LinkeTurbidity {
    fn default() -> Self {
        LinkeTurbidity::Monthly(CENTRAL_EUROPE_MONTHLY)
    }
}

impl LinkeTurbidity {
    /// Turbidity on a (fractional) day of year. Monthly values are pinned to
    /// the middle of each month and interpolated linearly, wrapping the year.
    pub fn at(&self, year: i32, day_of_year: f64) -> f64 {
        let monthly = match self {
            LinkeTurbidity::Constant(tl) => return *tl,
            LinkeTurbidity::Monthly(m) => m,
        };

        let days = month_lengths(year);
        let year_len: f64 = days.iter().sum();
        let mut middles = [0.0; 12];
        let mut start = 1.0;
        for (i, d) in days.iter().enumerate() {
            middles[i] = start + d / 2.0;
            start += d;
        }

        // bracket: (previous month middle, next month middle)
        let next = middles.iter().position(|m| *m > day_of_year);
        let (x0, y0, x1, y1) = match next {
            Some(0) => (middles[11] - year_len, monthly[11], middles[0], monthly[0]),
            Some(i) => (middles[i - 1], monthly[i - 1], middles[i], monthly[i]),
            None => (middles[11], monthly[11], middles[0] + year_len, monthly[0]),
        };
        y0 + (y1 - y0) * (day_of_year - x0) / (x1 - x0)
    }

    pub fn is_valid(&self) -> bool {
        let ok = |tl: &f64| tl.is_finite() && *tl >= 1.0;
        match self {
            LinkeTurbidity::Constant(tl) => ok(tl),
            LinkeTurbidity::Monthly(m) => m.iter().all(ok),
        }
    }
}

fn month_lengths(year: i32) -> [f64; 12] {
    let leap = (year % 400 == 0) || (year % 4 == 0 && year % 100 != 0);
    [
        31.0,
        if leap { 29.0 } else { 28.0 },
        31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
    ]
}

/// Ineichen-Perez clear-sky irradiance for a single instant.
///
/// * `apparent_zenith` – refraction-corrected zenith (degrees)
/// * `pressure`        – station pressure (Pa)
/// * `altitude`        – site elevation (m)
/// * `linke_turbidity` – Linke turbidity factor (≥ 1)
/// * `dni_extra`       – extraterrestrial normal irradiance (W/m²)
/// * `perez_enhancement` – apply Perez's low-sun GHI enhancement
///
/// The returned triplet is not clamped yet.
pub fn ineichen(
    apparent_zenith: f64,
    pressure: f64,
    altitude: f64,
    linke_turbidity: f64,
    dni_extra: f64,
    perez_enhancement: bool,
) -> IrradianceTriplet {
    let Some(am_rel) = relative_airmass_kasten_young(apparent_zenith) else {
        return IrradianceTriplet::ZERO;
    };
    let am = absolute_airmass(am_rel, pressure);
    let tl = linke_turbidity;
    let cos_zenith = apparent_zenith.to_radians().cos().max(0.0);

    let fh1 = (-altitude / 8000.0).exp();
    let fh2 = (-altitude / 1250.0).exp();
    let cg1 = 5.09e-05 * altitude + 0.868;
    let cg2 = 3.92e-05 * altitude + 0.0387;

    let mut ghi = (-cg2 * am * (fh1 + fh2 * (tl - 1.0))).exp();
    if perez_enhancement {
        ghi *= (0.01 * am.powf(1.8)).exp();
    }
    let ghi = cg1 * dni_extra * cos_zenith * ghi.max(0.0);

    let b = 0.664 + 0.163 / fh1;
    let bnci = dni_extra * (b * (-0.09 * am * (tl - 1.0)).exp()).max(0.0);

    // empirical correction keeping DNI·cos(z) below GHI
    let bnci_2 = (1.0 - (0.1 - 0.2 * (-tl).exp()) / (0.1 + 0.882 / fh1)) / cos_zenith;
    let bnci_2 = ghi * bnci_2.clamp(0.0, 1e20);

    let dni = bnci.min(bnci_2);
    let dhi = ghi - dni * cos_zenith;

    IrradianceTriplet { ghi, dni, dhi }
}

/// Turbidity at one instant. Year and day of year are both taken in UTC.
pub fn turbidity_at<Z: TimeZone>(turbidity: &LinkeTurbidity, time: &DateTime<Z>) -> f64 {
    turbidity.at(time.with_timezone(&Utc).year(), fractional_day_of_year(time))
}

/// Clear-sky triplets for a whole series, with the clamping contract applied.
pub fn clear_sky(
    solar_position: &TimeSeries<SolarPosition>,
    pressure: f64,
    altitude: f64,
    turbidity: &LinkeTurbidity,
    perez_enhancement: bool,
) -> Result<TimeSeries<IrradianceTriplet>> {
    let mut stats = ClampStats::default();
    let out = TimeSeries::try_from_fn(solar_position.index(), |i, t| {
        let doy = fractional_day_of_year(t);
        let tl = turbidity_at(turbidity, t);
        let raw = ineichen(
            solar_position.values()[i].apparent_zenith,
            pressure,
            altitude,
            tl,
            extraterrestrial_irradiance(doy),
            perez_enhancement,
        );
        Ok(raw.clamped(&mut stats))
    })?;

    debug!("[{}] {} of {} values clamped to 0", Stage::ClearSky, stats.clamped, stats.total);
    Ok(out)
}
