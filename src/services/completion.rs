use log::debug;

use crate::errors::{Result, Stage};
use crate::models::irradiance::{ensure_finite, ClampStats, IrradianceTriplet, SolarPosition, TimeSeries};

/// Completes GHI + DNI with DHI by closure: `dhi = ghi − dni·cos(zenith)`.
/// GHI and DNI are clamped before the closure so that the returned triplet
/// satisfies it exactly.
pub fn complete_irradiance(
    solar_position: &TimeSeries<SolarPosition>,
    ghi: &TimeSeries<f64>,
    dni: &TimeSeries<f64>,
) -> Result<TimeSeries<IrradianceTriplet>> {
    ghi.ensure_aligned(solar_position, Stage::Completion)?;
    ghi.ensure_aligned(dni, Stage::Completion)?;

    let mut stats = ClampStats::default();
    let out = TimeSeries::try_from_fn(ghi.index(), |i, _| {
        let ghi = stats.apply(ghi.values()[i]);
        let dni = stats.apply(dni.values()[i]);
        let dhi = stats.apply(ghi - dni * solar_position.values()[i].zenith.to_radians().cos());
        Ok(IrradianceTriplet { ghi, dni, dhi })
    })?;

    ensure_finite(Stage::Completion, "dhi", out.values().iter().map(|t| t.dhi))?;
    debug!("[{}] {} of {} values clamped to 0", Stage::Completion, stats.clamped, stats.total);
    Ok(out)
}
