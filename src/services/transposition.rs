/// ============================================================
///  Plane-of-array transposition
///
///   1. Angle of incidence between sun and panel normal
///   2. Beam on the tilted plane
///   3. Sky diffuse (isotropic, Klucher, Hay-Davies or Reindl)
///   4. Ground reflected from the surface albedo
/// ============================================================

use serde::{Deserialize, Serialize};

use crate::errors::{Result, Stage};
use crate::models::irradiance::{
    ensure_finite, IrradianceTriplet, PanelGeometry, PanelIrradiance, SolarPosition, TimeSeries,
};
use crate::services::atmosphere::extraterrestrial_irradiance;
use crate::services::solar_geometry::fractional_day_of_year;

/// Lower bound of cos(zenith) in the beam ratio Rb (≈ 89°)
const MIN_COS_ZENITH_RB: f64 = 0.01745;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkyDiffuseModel {
    #[default]
    Isotropic,
    Klucher,
    HayDavies,
    Reindl,
}

/// Ground cover in front of the array, mapped to a broadband albedo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    #[default]
    Urban,
    Grass,
    FreshGrass,
    Soil,
    Sand,
    Snow,
    FreshSnow,
    Asphalt,
    Concrete,
    Aluminum,
    Copper,
    FreshSteel,
    DirtySteel,
    Sea,
}

impl SurfaceType {
    pub fn albedo(&self) -> f64 {
        match self {
            SurfaceType::Urban      => 0.18,
            SurfaceType::Grass      => 0.20,
            SurfaceType::FreshGrass => 0.26,
            SurfaceType::Soil       => 0.17,
            SurfaceType::Sand       => 0.40,
            SurfaceType::Snow       => 0.65,
            SurfaceType::FreshSnow  => 0.75,
            SurfaceType::Asphalt    => 0.12,
            SurfaceType::Concrete   => 0.30,
            SurfaceType::Aluminum   => 0.85,
            SurfaceType::Copper     => 0.74,
            SurfaceType::FreshSteel => 0.35,
            SurfaceType::DirtySteel => 0.08,
            SurfaceType::Sea        => 0.06,
        }
    }
}

/// Cosine of the angle of incidence, in [-1, 1].
pub fn aoi_projection(panel: &PanelGeometry, sun: &SolarPosition) -> f64 {
    let tilt = panel.tilt.to_radians();
    let zenith = sun.zenith.to_radians();
    let projection = tilt.cos() * zenith.cos()
        + tilt.sin() * zenith.sin() * (sun.azimuth - panel.azimuth).to_radians().cos();
    projection.clamp(-1.0, 1.0)
}

/// Angle of incidence in degrees.
pub fn aoi(panel: &PanelGeometry, sun: &SolarPosition) -> f64 {
    aoi_projection(panel, sun).acos().to_degrees()
}

pub fn beam_component(panel: &PanelGeometry, sun: &SolarPosition, dni: f64) -> f64 {
    if !sun.is_above_horizon() {
        return 0.0;
    }
    let cos_aoi = aoi_projection(panel, sun);
    if cos_aoi <= 0.0 {
        return 0.0;
    }
    (dni * cos_aoi).max(0.0)
}

pub fn ground_diffuse(tilt: f64, ghi: f64, albedo: f64) -> f64 {
    ghi * albedo * (1.0 - tilt.to_radians().cos()) * 0.5
}

pub fn sky_diffuse(
    model: SkyDiffuseModel,
    panel: &PanelGeometry,
    sun: &SolarPosition,
    irradiance: &IrradianceTriplet,
    dni_extra: f64,
) -> f64 {
    let IrradianceTriplet { ghi, dni, dhi } = *irradiance;
    let tilt = panel.tilt.to_radians();
    let view_factor = 0.5 * (1.0 + tilt.cos());

    let value = match model {
        SkyDiffuseModel::Isotropic => dhi * view_factor,
        SkyDiffuseModel::Klucher => {
            let cos_tt = aoi_projection(panel, sun).max(0.0);
            let f = if ghi > 0.0 { 1.0 - (dhi / ghi).powi(2) } else { 0.0 };
            let horizon = 1.0 + f * (0.5 * tilt).sin().powi(3);
            let circumsolar = 1.0 + f * cos_tt.powi(2) * sun.zenith.to_radians().sin().powi(3);
            dhi * view_factor * horizon * circumsolar
        }
        SkyDiffuseModel::HayDavies => {
            let (rb, ai) = beam_ratio_and_anisotropy(panel, sun, dni, dni_extra);
            (dhi * (1.0 - ai) * view_factor).max(0.0) + (dhi * ai * rb).max(0.0)
        }
        SkyDiffuseModel::Reindl => {
            let (rb, ai) = beam_ratio_and_anisotropy(panel, sun, dni, dni_extra);
            let hb = (dni * sun.zenith.to_radians().cos()).max(0.0);
            let hb_to_ghi = if ghi > 0.0 { hb / ghi } else { 0.0 };
            let horizon = 1.0 + hb_to_ghi.sqrt() * (0.5 * tilt).sin().powi(3);
            dhi * (ai * rb + (1.0 - ai) * view_factor * horizon)
        }
    };
    value.max(0.0)
}

/// Beam ratio Rb and anisotropy index AI = DNI / E0.
fn beam_ratio_and_anisotropy(
    panel: &PanelGeometry,
    sun: &SolarPosition,
    dni: f64,
    dni_extra: f64,
) -> (f64, f64) {
    let cos_tt = aoi_projection(panel, sun).max(0.0);
    let rb = cos_tt / sun.zenith.to_radians().cos().max(MIN_COS_ZENITH_RB);
    (rb, dni / dni_extra)
}

/// Irradiance on the panel for a single instant.
pub fn total_irradiance(
    model: SkyDiffuseModel,
    panel: &PanelGeometry,
    sun: &SolarPosition,
    irradiance: &IrradianceTriplet,
    dni_extra: f64,
    albedo: f64,
) -> PanelIrradiance {
    PanelIrradiance::from_components(
        beam_component(panel, sun, irradiance.dni),
        sky_diffuse(model, panel, sun, irradiance, dni_extra),
        ground_diffuse(panel.tilt, irradiance.ghi, albedo),
    )
}

/// Transposes a whole series onto the panel plane.
pub fn transpose(
    model: SkyDiffuseModel,
    panel: &PanelGeometry,
    solar_position: &TimeSeries<SolarPosition>,
    irradiance: &TimeSeries<IrradianceTriplet>,
    albedo: f64,
) -> Result<TimeSeries<PanelIrradiance>> {
    irradiance.ensure_aligned(solar_position, Stage::Transposition)?;

    let out = TimeSeries::try_from_fn(irradiance.index(), |i, t| {
        let dni_extra = extraterrestrial_irradiance(fractional_day_of_year(t));
        Ok(total_irradiance(
            model,
            panel,
            &solar_position.values()[i],
            &irradiance.values()[i],
            dni_extra,
            albedo,
        ))
    })?;

    ensure_finite(Stage::Transposition, "poa_global", out.values().iter().map(|p| p.poa_global))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const E0: f64 = 1366.1;

    fn sun(zenith: f64, azimuth: f64) -> SolarPosition {
        SolarPosition {
            zenith,
            elevation: 90.0 - zenith,
            azimuth,
            apparent_zenith: zenith,
            apparent_elevation: 90.0 - zenith,
        }
    }

    fn panel(tilt: f64, azimuth: f64) -> PanelGeometry {
        PanelGeometry::new(tilt, azimuth).unwrap()
    }

    const CLEAR: IrradianceTriplet = IrradianceTriplet { ghi: 850.0, dni: 800.0, dhi: 150.0 };

    #[test]
    fn test_aoi_facing_sun() {
        // panel normal points straight at the sun
        assert!((aoi(&panel(40.0, 180.0), &sun(40.0, 180.0))).abs() < 1e-6);
        assert!((aoi(&panel(0.0, 180.0), &sun(35.0, 90.0)) - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_isotropic_components() {
        let p = total_irradiance(SkyDiffuseModel::Isotropic, &panel(30.0, 180.0), &sun(30.0, 180.0), &CLEAR, E0, 0.18);
        let c = 30f64.to_radians().cos();
        assert!((p.poa_sky_diffuse - 150.0 * (1.0 + c) / 2.0).abs() < 1e-9);
        assert!((p.poa_ground_diffuse - 850.0 * 0.18 * (1.0 - c) / 2.0).abs() < 1e-9);
        // normal incidence
        assert!((p.poa_direct - 800.0).abs() < 1e-6);
        let sum = p.poa_direct + p.poa_sky_diffuse + p.poa_ground_diffuse;
        assert!((sum - p.poa_global).abs() < 1e-9);
    }

    #[test]
    fn test_beam_zero_behind_panel_or_at_night() {
        // sun in the north, panel facing south at 80°
        let p = total_irradiance(SkyDiffuseModel::Isotropic, &panel(80.0, 180.0), &sun(60.0, 0.0), &CLEAR, E0, 0.18);
        assert_eq!(p.poa_direct, 0.0);
        let p = total_irradiance(SkyDiffuseModel::HayDavies, &panel(30.0, 180.0), &sun(95.0, 180.0), &CLEAR, E0, 0.18);
        assert_eq!(p.poa_direct, 0.0);
    }

    #[test]
    fn test_horizontal_panel_reduces_to_dhi() {
        for model in [SkyDiffuseModel::Isotropic, SkyDiffuseModel::HayDavies, SkyDiffuseModel::Reindl] {
            let s = sky_diffuse(model, &panel(0.0, 180.0), &sun(45.0, 150.0), &CLEAR, E0);
            assert!((s - CLEAR.dhi).abs() < 1e-9, "{:?}: {}", model, s);
        }
        assert_eq!(ground_diffuse(0.0, 850.0, 0.18), 0.0);
    }

    #[test]
    fn test_anisotropic_models_favour_circumsolar() {
        let p = panel(35.0, 180.0);
        let s = sun(40.0, 180.0);
        let iso = sky_diffuse(SkyDiffuseModel::Isotropic, &p, &s, &CLEAR, E0);
        for model in [SkyDiffuseModel::Klucher, SkyDiffuseModel::HayDavies, SkyDiffuseModel::Reindl] {
            let v = sky_diffuse(model, &p, &s, &CLEAR, E0);
            assert!(v > iso, "{:?} {} should exceed isotropic {}", model, v, iso);
        }
    }

    #[test]
    fn test_zero_irradiance_gives_zero() {
        for model in [
            SkyDiffuseModel::Isotropic,
            SkyDiffuseModel::Klucher,
            SkyDiffuseModel::HayDavies,
            SkyDiffuseModel::Reindl,
        ] {
            let p = total_irradiance(model, &panel(30.0, 180.0), &sun(110.0, 0.0), &IrradianceTriplet::ZERO, E0, 0.18);
            assert_eq!(p, PanelIrradiance::default());
        }
    }

    #[test]
    fn test_surface_types() {
        assert_eq!(SurfaceType::default().albedo(), 0.18);
        let s: SurfaceType = serde_json::from_str("\"fresh_snow\"").unwrap();
        assert_eq!(s.albedo(), 0.75);
        let m: SkyDiffuseModel = serde_json::from_str("\"hay_davies\"").unwrap();
        assert_eq!(m, SkyDiffuseModel::HayDavies);
    }
}
