use chrono::TimeZone;
use chrono_tz::Europe::Berlin;
use serde_json::json;

use pv_model::config::ModelConfig;
use pv_model::errors::{PipelineError, Stage};
use pv_model::models::irradiance::PanelGeometry;
use pv_model::models::location::Location;
use pv_model::models::message::{Batch, OutputRecord};
use pv_model::services::pipeline::IrradiancePipeline;

fn eschweiler() -> IrradiancePipeline {
    let location = Location::new("Eschweiler", 50.8078105, 6.2620244, 166.0, "Europe/Berlin").unwrap();
    IrradiancePipeline::new(location, ModelConfig::default())
}

fn single(hour: u32, min: u32, ghi: f64) -> Batch {
    let time = Berlin.with_ymd_and_hms(2024, 6, 21, hour, min, 0).unwrap();
    Batch::new(vec![time], vec![ghi], PanelGeometry::new(30.0, 180.0).unwrap()).unwrap()
}

#[test]
fn clear_sky_solar_noon() {
    let pipeline = eschweiler();
    // local solar noon is about 13:37 CEST at 6.26° E
    let reference = pipeline.run(&single(13, 37, 0.0)).unwrap();
    let cs = reference.clear_sky.values()[0];
    assert!(cs.ghi > 700.0, "clear-sky ghi {:.1}", cs.ghi);

    let result = pipeline.run(&single(13, 37, cs.ghi)).unwrap();
    let gl = result.global.values()[0];
    let pn = result.panel.values()[0];
    assert!((gl.dni - cs.dni).abs() < 0.5, "dni {:.2} vs clear {:.2}", gl.dni, cs.dni);
    assert!((gl.dhi - cs.dhi).abs() < 0.5, "dhi {:.2} vs clear {:.2}", gl.dhi, cs.dhi);
    assert!(pn.poa_direct > 0.0);
    assert!(result.solar_position.values()[0].elevation > 60.0);
}

#[test]
fn night_time_is_dark() {
    let result = eschweiler().run(&single(1, 0, 0.0)).unwrap();
    let record = OutputRecord::from(&result);
    assert!(record.sun_elevation[0] < 0.0);
    for list in [
        &record.clearsky_ghi,
        &record.clearsky_dni,
        &record.clearsky_dhi,
        &record.global_ghi,
        &record.global_dni,
        &record.global_dhi,
        &record.panel_total,
        &record.panel_direct,
        &record.panel_diffuse,
        &record.panel_sky_diffuse,
        &record.panel_ground_diffuse,
    ] {
        assert_eq!(list, &vec![0.0]);
    }
}

#[test]
fn length_mismatch_is_rejected_without_output() {
    let payload = json!({
        "time": [
            "2024-06-21T10:00:00+02:00",
            "2024-06-21T11:00:00+02:00",
            "2024-06-21T12:00:00+02:00"
        ],
        "ghi": [300, 400],
        "tilt": 30,
        "azimuth": 180
    });
    let err = eschweiler().process_payload(payload.to_string().as_bytes()).unwrap_err();
    assert!(matches!(err, PipelineError::MalformedInput { stage: Stage::Validation, .. }));
    assert!(err.to_string().contains("List length mismatch."), "{}", err);
}

#[test]
fn repeated_runs_are_identical() {
    let pipeline = eschweiler();
    let payload = json!({
        "time": ["2024-03-20 07:30:00+01:00", "2024-03-20 12:30:00+01:00", "2024-03-20 18:30:00+01:00"],
        "ghi": [35.0, 480.0, 12.0],
        "tilt": "25",
        "azimuth": 200
    })
    .to_string();

    let first = OutputRecord::from(&pipeline.process_payload(payload.as_bytes()).unwrap());
    let second = OutputRecord::from(&pipeline.process_payload(payload.as_bytes()).unwrap());
    assert_eq!(first, second);
    assert_eq!(first.panel_total.len(), 3);
}
