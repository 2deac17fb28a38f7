/// ============================================================
///  DNI decomposition
///
///   1. DISC (Maxwell 1987)      – DNI from GHI via kt and air mass
///   2. DIRINT (Perez 1992)      – DISC × coefficient binned on
///                                 kt′, zenith, Δkt′ and water vapour
///   3. DIRINDEX (Perez 2002)    – dni = dni_clear · dirint(ghi)
///                                           / dirint(ghi_clear)
///
///  DIRINT coefficients come from a 6×6×7×5 table. Without one
///  a unit table is used and DIRINT reduces to DISC.
/// ============================================================

use std::sync::Arc;

use log::debug;

use crate::errors::{ConfigError, Result, Stage};
use crate::models::irradiance::{ClampStats, IrradianceTriplet, SolarPosition, TimeSeries};
use crate::services::atmosphere::{absolute_airmass, extraterrestrial_irradiance, relative_airmass_kasten};
use crate::services::solar_geometry::fractional_day_of_year;

const MIN_COS_ZENITH: f64 = 0.065;
const MAX_CLEARNESS_INDEX: f64 = 1.0;
const MAX_ZENITH: f64 = 87.0;
const MAX_AIRMASS: f64 = 12.0;

const KT_PRIME_EDGES: [f64; 5] = [0.24, 0.4, 0.56, 0.7, 0.8];
const ZENITH_EDGES: [f64; 5] = [25.0, 40.0, 55.0, 70.0, 80.0];
const DELTA_KT_PRIME_EDGES: [f64; 5] = [0.015, 0.035, 0.07, 0.15, 0.3];
const DELTA_KT_PRIME_MISSING: usize = 6;
/// No dew point is measured, so precipitable water is always "missing"
const WATER_MISSING: usize = 4;

/// kt′ × zenith × Δkt′ × precipitable water
pub type DirintTable = [[[[f64; 5]; 7]; 6]; 6];

// ─── DISC ────────────────────────────────────────────────────────────────────

/// Ratio of GHI to extraterrestrial horizontal irradiance, in [0, max].
pub fn clearness_index(ghi: f64, zenith: f64, dni_extra: f64, max_clearness_index: f64) -> f64 {
    let cos_zenith = zenith.to_radians().cos().max(MIN_COS_ZENITH);
    (ghi / (dni_extra * cos_zenith)).clamp(0.0, max_clearness_index)
}

/// DISC output for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disc {
    pub dni: f64,
    pub kt: f64,
    /// Pressure-corrected air mass capped at 12, NaN below the horizon
    pub airmass: f64,
}

pub fn disc_components(ghi: f64, zenith: f64, dni_extra: f64, pressure: f64) -> Disc {
    let kt = clearness_index(ghi, zenith, dni_extra, MAX_CLEARNESS_INDEX);
    let airmass = relative_airmass_kasten(zenith)
        .map(|am| absolute_airmass(am, pressure).min(MAX_AIRMASS))
        .unwrap_or(f64::NAN);

    if !ghi.is_finite() || ghi < 0.0 || !(zenith <= MAX_ZENITH) || airmass.is_nan() {
        return Disc { dni: 0.0, kt, airmass };
    }

    let (a, b, c) = if kt <= 0.6 {
        (
            0.512 - 1.56 * kt + 2.286 * kt.powi(2) - 2.222 * kt.powi(3),
            0.37 + 0.962 * kt,
            -0.28 + 0.932 * kt - 2.048 * kt.powi(2),
        )
    } else {
        (
            -5.743 + 21.77 * kt - 27.49 * kt.powi(2) + 11.56 * kt.powi(3),
            41.4 - 118.5 * kt + 66.05 * kt.powi(2) + 31.9 * kt.powi(3),
            -47.01 + 184.2 * kt - 222.0 * kt.powi(2) + 73.81 * kt.powi(3),
        )
    };
    let am = airmass;
    let delta_kn = a + b * (c * am).exp();
    let knc = 0.866 - 0.122 * am + 0.0121 * am.powi(2) - 0.000653 * am.powi(3) + 1.4e-05 * am.powi(4);

    let dni = (knc - delta_kn) * dni_extra;
    Disc { dni: if dni > 0.0 { dni } else { 0.0 }, kt, airmass }
}

/// DISC estimate of DNI from GHI (W/m²). Returns 0 beyond 87° zenith,
/// for negative GHI and for negative estimates.
pub fn disc(ghi: f64, zenith: f64, dni_extra: f64, pressure: f64) -> f64 {
    disc_components(ghi, zenith, dni_extra, pressure).dni
}

// ─── DIRINT ──────────────────────────────────────────────────────────────────

/// Clearness index made independent of zenith through the air mass.
pub fn zenith_independent_clearness_index(kt: f64, airmass: f64) -> f64 {
    let factor = 1.031 * (-1.4 / (0.9 + 9.4 / airmass)).exp() + 0.1;
    (kt / factor).clamp(0.0, MAX_CLEARNESS_INDEX)
}

/// Stability index Δkt′: mean absolute kt′ step to both neighbours. The ends
/// use their only neighbour twice. A NaN step counts as 0 unless both are
/// NaN. A lone sample has no Δkt′.
pub fn delta_kt_prime(kt_prime: &[f64]) -> Vec<Option<f64>> {
    let n = kt_prime.len();
    if n < 2 {
        return vec![None; n];
    }
    (0..n)
        .map(|i| {
            let prev = kt_prime[if i == 0 { 1 } else { i - 1 }];
            let next = kt_prime[if i == n - 1 { n - 2 } else { i + 1 }];
            let to_next = (kt_prime[i] - next).abs();
            let to_prev = (kt_prime[i] - prev).abs();
            Some(match (to_next.is_nan(), to_prev.is_nan()) {
                (true, true)   => f64::NAN,
                (true, false)  => 0.5 * to_prev,
                (false, true)  => 0.5 * to_next,
                (false, false) => 0.5 * (to_next + to_prev),
            })
        })
        .collect()
}

/// Index of the half-open bin `[edges[k-1], edges[k])` holding `x`, with the
/// last bin closed at `upper`. `None` for NaN or out of range.
fn bin(x: f64, edges: &[f64; 5], upper: f64) -> Option<usize> {
    if !(x >= 0.0 && x <= upper) {
        return None;
    }
    Some(edges.iter().position(|edge| x < *edge).unwrap_or(edges.len()))
}

/// Table position for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirintBin {
    pub kt_prime: usize,
    pub zenith: usize,
    pub delta_kt_prime: usize,
    pub water: usize,
}

impl DirintBin {
    pub fn new(kt_prime: f64, zenith: f64, delta_kt_prime: Option<f64>) -> Option<Self> {
        let delta_kt_prime = match delta_kt_prime {
            Some(d) => bin(d, &DELTA_KT_PRIME_EDGES, 1.0)?,
            None => DELTA_KT_PRIME_MISSING,
        };
        Some(Self {
            kt_prime: bin(kt_prime, &KT_PRIME_EDGES, 1.0)?,
            zenith: bin(zenith, &ZENITH_EDGES, f64::INFINITY)?,
            delta_kt_prime,
            water: WATER_MISSING,
        })
    }
}

/// DIRINT correction factors.
#[derive(Debug, Clone, PartialEq)]
pub struct DirintCoefficients(Arc<DirintTable>);

impl Default for DirintCoefficients {
    fn default() -> Self {
        Self::unit()
    }
}

impl DirintCoefficients {
    /// Every factor 1: DIRINT equals DISC.
    pub fn unit() -> Self {
        Self(Arc::new([[[[1.0; 5]; 7]; 6]; 6]))
    }

    pub fn from_table(table: DirintTable) -> std::result::Result<Self, ConfigError> {
        let flat = table.iter().flatten().flatten().flatten();
        if let Some(bad) = flat.copied().find(|c| !c.is_finite() || *c < 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "dirint_coefficients",
                value: bad.to_string(),
                reason: "coefficients must be finite and non-negative".to_string(),
            });
        }
        Ok(Self(Arc::new(table)))
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, ConfigError> {
        let table: Box<DirintTable> = serde_json::from_str(content)?;
        Self::from_table(*table)
    }

    pub fn load(path: &str) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn is_unit(&self) -> bool {
        self.0.iter().flatten().flatten().flatten().all(|c| *c == 1.0)
    }

    pub fn get(&self, bin: DirintBin) -> f64 {
        self.0[bin.kt_prime][bin.zenith][bin.delta_kt_prime][bin.water]
    }
}

/// DIRINT DNI for an ordered series. Samples that fall outside every bin
/// (sun below the horizon) come out as NaN.
pub fn dirint(
    ghi: &[f64],
    zenith: &[f64],
    dni_extra: &[f64],
    pressure: f64,
    coefficients: &DirintCoefficients,
) -> Vec<f64> {
    let discs: Vec<Disc> = ghi
        .iter()
        .zip(zenith)
        .zip(dni_extra)
        .map(|((g, z), e0)| disc_components(*g, *z, *e0, pressure))
        .collect();
    let kt_prime: Vec<f64> = discs
        .iter()
        .map(|d| zenith_independent_clearness_index(d.kt, d.airmass))
        .collect();
    let deltas = delta_kt_prime(&kt_prime);

    discs
        .iter()
        .zip(&kt_prime)
        .zip(zenith)
        .zip(deltas)
        .map(|(((d, kt_p), z), delta)| match DirintBin::new(*kt_p, *z, delta) {
            Some(bin) => d.dni * coefficients.get(bin),
            None => f64::NAN,
        })
        .collect()
}

// ─── DIRINDEX ────────────────────────────────────────────────────────────────

/// Estimated DNI for every timestamp. The output never holds NaN or
/// negative values.
pub fn dirindex(
    ghi: &TimeSeries<f64>,
    clear_sky: &TimeSeries<IrradianceTriplet>,
    solar_position: &TimeSeries<SolarPosition>,
    pressure: f64,
    coefficients: &DirintCoefficients,
) -> Result<TimeSeries<f64>> {
    ghi.ensure_aligned(clear_sky, Stage::Decomposition)?;
    ghi.ensure_aligned(solar_position, Stage::Decomposition)?;

    let zenith: Vec<f64> = solar_position.values().iter().map(|p| p.zenith).collect();
    let dni_extra: Vec<f64> = ghi
        .index()
        .iter()
        .map(|t| extraterrestrial_irradiance(fractional_day_of_year(t)))
        .collect();
    let ghi_clear: Vec<f64> = clear_sky.values().iter().map(|c| c.ghi).collect();

    let measured = dirint(ghi.values(), &zenith, &dni_extra, pressure, coefficients);
    let modelled_clear = dirint(&ghi_clear, &zenith, &dni_extra, pressure, coefficients);

    let mut stats = ClampStats::default();
    let out = TimeSeries::try_from_fn(ghi.index(), |i, _| {
        let clear = &clear_sky.values()[i];
        if zenith[i] >= 90.0 || clear.ghi <= 0.0 {
            return Ok(0.0);
        }
        Ok(stats.apply(clear.dni * measured[i] / modelled_clear[i]))
    })?;

    debug!("[{}] {} of {} values clamped to 0", Stage::Decomposition, stats.clamped, stats.total);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::irradiance::TimeIndex;
    use crate::services::atmosphere::SEA_LEVEL_PRESSURE;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    const E0: f64 = 1366.1;

    fn position(z: f64) -> SolarPosition {
        SolarPosition {
            zenith: z,
            elevation: 90.0 - z,
            azimuth: 180.0,
            apparent_zenith: z,
            apparent_elevation: 90.0 - z,
        }
    }

    fn index(times: &[(u32, u32)]) -> TimeIndex {
        TimeIndex::new(
            times
                .iter()
                .map(|(h, m)| Berlin.with_ymd_and_hms(2024, 6, 21, *h, *m, 0).unwrap())
                .collect(),
        )
        .unwrap()
    }

    /// Each cell holds its own position as a four digit number.
    fn numbered_table() -> DirintTable {
        let mut table = [[[[0.0; 5]; 7]; 6]; 6];
        for (k, zs) in table.iter_mut().enumerate() {
            for (z, ds) in zs.iter_mut().enumerate() {
                for (d, ws) in ds.iter_mut().enumerate() {
                    for (w, c) in ws.iter_mut().enumerate() {
                        *c = (1000 * k + 100 * z + 10 * d + w) as f64;
                    }
                }
            }
        }
        table
    }

    #[test]
    fn test_clearness_index_bounds() {
        assert_eq!(clearness_index(-5.0, 30.0, E0, 1.0), 0.0);
        assert_eq!(clearness_index(5000.0, 30.0, E0, 1.0), 1.0);
        // cos zenith floor keeps kt finite at the horizon
        assert!(clearness_index(10.0, 89.9, E0, 1.0).is_finite());
    }

    #[test]
    fn test_disc_clear_and_overcast() {
        let clear = disc(850.0, 30.0, E0, SEA_LEVEL_PRESSURE);
        assert!(clear > 600.0 && clear < 1000.0, "clear-sky DISC dni {:.1}", clear);
        let overcast = disc(120.0, 30.0, E0, SEA_LEVEL_PRESSURE);
        assert!(overcast < 60.0, "overcast DISC dni {:.1}", overcast);
    }

    #[test]
    fn test_disc_limits() {
        assert_eq!(disc(50.0, 88.0, E0, SEA_LEVEL_PRESSURE), 0.0);
        assert_eq!(disc(-1.0, 30.0, E0, SEA_LEVEL_PRESSURE), 0.0);
        assert_eq!(disc(f64::NAN, 30.0, E0, SEA_LEVEL_PRESSURE), 0.0);
        assert_eq!(disc(0.0, 30.0, E0, SEA_LEVEL_PRESSURE), 0.0);
        // kt and air mass survive past the DISC zenith limit
        let d = disc_components(50.0, 88.0, E0, SEA_LEVEL_PRESSURE);
        assert!(d.kt > 0.0 && d.airmass == MAX_AIRMASS);
        assert!(disc_components(0.0, 95.0, E0, SEA_LEVEL_PRESSURE).airmass.is_nan());
    }

    #[test]
    fn test_zenith_independent_clearness_index() {
        // air mass 1: factor 1.031·e^(−1.4/10.3) + 0.1
        let factor = 1.031 * (-1.4f64 / 10.3).exp() + 0.1;
        assert!((zenith_independent_clearness_index(0.5, 1.0) - 0.5 / factor).abs() < 1e-12);
        assert_eq!(zenith_independent_clearness_index(0.95, 12.0), 1.0);
        assert!(zenith_independent_clearness_index(0.5, f64::NAN).is_nan());
    }

    #[test]
    fn test_delta_kt_prime_persistence() {
        let d = delta_kt_prime(&[0.2, 0.6, 0.5, 0.5]);
        let d: Vec<f64> = d.into_iter().map(Option::unwrap).collect();
        let expected = [0.4, 0.25, 0.05, 0.0];
        for (got, want) in d.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{:?}", d);
        }

        // night neighbour only drops its own step
        let d = delta_kt_prime(&[f64::NAN, 0.6, 0.4]);
        assert!(d[0].unwrap().is_nan());
        assert!((d[1].unwrap() - 0.1).abs() < 1e-12);

        assert_eq!(delta_kt_prime(&[0.7]), vec![None]);
    }

    #[test]
    fn test_bin_edges() {
        let b = DirintBin::new(0.5, 30.0, Some(0.05)).unwrap();
        assert_eq!((b.kt_prime, b.zenith, b.delta_kt_prime, b.water), (2, 1, 2, 4));

        let b = DirintBin::new(0.24, 25.0, Some(0.015)).unwrap();
        assert_eq!((b.kt_prime, b.zenith, b.delta_kt_prime), (1, 1, 1));

        let b = DirintBin::new(1.0, 85.0, None).unwrap();
        assert_eq!((b.kt_prime, b.zenith, b.delta_kt_prime), (5, 5, 6));

        assert!(DirintBin::new(f64::NAN, 30.0, Some(0.0)).is_none());
        assert!(DirintBin::new(0.5, 30.0, Some(f64::NAN)).is_none());
    }

    #[test]
    fn test_coefficient_lookup_order() {
        // kt′ × zenith × Δkt′ × water, as in the published table
        let c = DirintCoefficients::from_table(numbered_table()).unwrap();
        let b = DirintBin::new(0.75, 62.0, Some(0.2)).unwrap();
        assert_eq!(c.get(b), 4344.0);
        assert!(!c.is_unit());
        assert!(DirintCoefficients::unit().is_unit());
    }

    #[test]
    fn test_coefficients_from_json() {
        let json = serde_json::to_string(&numbered_table()).unwrap();
        let c = DirintCoefficients::from_json(&json).unwrap();
        assert_eq!(c, DirintCoefficients::from_table(numbered_table()).unwrap());

        assert!(matches!(DirintCoefficients::from_json("[[1.0]]"), Err(ConfigError::Json(_))));
        let mut table = numbered_table();
        table[0][0][0][0] = -1.0;
        assert!(DirintCoefficients::from_table(table).is_err());
        assert!(matches!(DirintCoefficients::load("/nonexistent/dirint.json"), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_dirint_scales_disc_by_binned_coefficient() {
        let table = DirintCoefficients::from_table(numbered_table()).unwrap();
        let ghi = [300.0, 800.0, 350.0];
        let zenith = [60.0, 30.0, 35.0];
        let e0 = [E0; 3];

        let dni = dirint(&ghi, &zenith, &e0, SEA_LEVEL_PRESSURE, &table);
        let plain = dirint(&ghi, &zenith, &e0, SEA_LEVEL_PRESSURE, &DirintCoefficients::unit());

        let discs: Vec<Disc> = (0..3).map(|i| disc_components(ghi[i], zenith[i], E0, SEA_LEVEL_PRESSURE)).collect();
        let kt_p: Vec<f64> = discs.iter().map(|d| zenith_independent_clearness_index(d.kt, d.airmass)).collect();
        let deltas = delta_kt_prime(&kt_p);
        for i in 0..3 {
            assert_eq!(plain[i], discs[i].dni);
            let bin = DirintBin::new(kt_p[i], zenith[i], deltas[i]).unwrap();
            assert_eq!(dni[i], discs[i].dni * table.get(bin), "sample {}", i);
        }
        // swings between samples move the middle one into a higher Δkt′ bin
        let middle = DirintBin::new(kt_p[1], zenith[1], deltas[1]).unwrap();
        assert!(middle.delta_kt_prime >= 4, "{:?}", middle);
    }

    #[test]
    fn test_dirindex_clear_sky_returns_clear_dni() {
        let idx = index(&[(13, 0), (13, 30), (14, 0)]);
        let cs = vec![
            IrradianceTriplet { ghi: 870.0, dni: 860.0, dhi: 118.0 },
            IrradianceTriplet { ghi: 880.0, dni: 870.0, dhi: 119.0 },
            IrradianceTriplet { ghi: 875.0, dni: 865.0, dhi: 119.0 },
        ];
        let ghi = TimeSeries::new(idx.clone(), cs.iter().map(|c| c.ghi).collect()).unwrap();
        let cs = TimeSeries::new(idx.clone(), cs).unwrap();
        let sp = TimeSeries::new(idx, vec![position(29.0), position(28.0), position(28.5)]).unwrap();

        let table = DirintCoefficients::from_table(numbered_table()).unwrap();
        for coefficients in [DirintCoefficients::unit(), table] {
            let dni = dirindex(&ghi, &cs, &sp, SEA_LEVEL_PRESSURE, &coefficients).unwrap();
            for (got, clear) in dni.values().iter().zip(cs.values()) {
                assert!((got - clear.dni).abs() < 1e-9, "dni {:.3}", got);
            }
        }
    }

    #[test]
    fn test_dirindex_night_and_degenerate_are_clamped() {
        let idx = index(&[(1, 0), (5, 40), (13, 30)]);
        let ghi = TimeSeries::new(idx.clone(), vec![0.0, 15.0, 300.0]).unwrap();
        let cs = TimeSeries::new(
            idx.clone(),
            vec![
                IrradianceTriplet::ZERO,
                // 0/0 beyond the DISC zenith limit
                IrradianceTriplet { ghi: 20.0, dni: 60.0, dhi: 17.0 },
                IrradianceTriplet { ghi: 880.0, dni: 870.0, dhi: 119.0 },
            ],
        )
        .unwrap();
        let sp = TimeSeries::new(idx, vec![position(110.0), position(88.5), position(28.0)]).unwrap();

        let dni = dirindex(&ghi, &cs, &sp, SEA_LEVEL_PRESSURE, &DirintCoefficients::unit()).unwrap();
        assert_eq!(dni.values()[0], 0.0);
        assert_eq!(dni.values()[1], 0.0);
        assert!(dni.values()[2] > 0.0 && dni.values()[2] < 870.0);
    }

    #[test]
    fn test_dirindex_misaligned_fails() {
        let ghi = TimeSeries::new(index(&[(12, 0), (13, 0)]), vec![1.0, 2.0]).unwrap();
        let cs = TimeSeries::new(index(&[(12, 0)]), vec![IrradianceTriplet::ZERO]).unwrap();
        let sp = TimeSeries::new(index(&[(12, 0), (13, 0)]), vec![position(30.0), position(30.0)]).unwrap();
        let err = dirindex(&ghi, &cs, &sp, SEA_LEVEL_PRESSURE, &DirintCoefficients::unit()).unwrap_err();
        assert_eq!(err.stage(), Stage::Decomposition);
    }
}
