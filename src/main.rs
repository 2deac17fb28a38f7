use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};

use pv_model::config::Config;
use pv_model::services::mqtt_service;
use pv_model::services::pipeline::IrradiancePipeline;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Load configuration
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    // 2. Build the pipeline for the configured site
    let location = match config.location.to_location() {
        Ok(l) => l,
        Err(e) => {
            error!("Invalid location in {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Configuration loaded: {} ({:.4}, {:.4}, {} m, {}) | transposition={:?} albedo={:.2}",
        location.name,
        location.latitude,
        location.longitude,
        location.elevation,
        location.timezone,
        config.model.transposition,
        config.model.albedo()
    );
    let dirint = match config.model.load_dirint_coefficients() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load DIRINT coefficients: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if dirint.is_unit() {
        warn!("No DIRINT coefficient table configured, DNI decomposition falls back to DISC");
    }
    let pipeline = Arc::new(
        IrradiancePipeline::new(location, config.model.clone()).with_dirint_coefficients(dirint),
    );

    // 3. Serve requests until Ctrl-C
    mqtt_service::run_service(config.mqtt, pipeline).await;
    ExitCode::SUCCESS
}
