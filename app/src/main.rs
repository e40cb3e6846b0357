//! GeoGuard Mine Slope Risk Monitor
//!
//! Main application entry point: runs the sensor simulation and logs a
//! weather-enhanced risk assessment on a fixed interval.

use anyhow::Result;
use geoguard_risk::weather::OpenWeatherProvider;
use geoguard_risk::{
    AssessmentHandler, FusionEngine, LoggingAssessmentHandler, SimulationContext,
};
use geoguard_sim::SensorSimulator;
use std::sync::Arc;

mod config;

use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    tracing::info!("╔══════════════════════════════════════════╗");
    tracing::info!("║     GeoGuard Mine Slope Risk Monitor     ║");
    tracing::info!("║            Version 0.1.0                 ║");
    tracing::info!("╚══════════════════════════════════════════╝");

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded from {:?}", config.config_path);

    // Initialize sensor simulation
    tracing::info!("Initializing sensor simulator...");
    let simulator = SensorSimulator::new(config.simulator_config())?;

    // Initialize weather provider
    let weather = OpenWeatherProvider::new(
        config.site(),
        config.weather_api_key.clone(),
        config.weather_timeout(),
    );
    if config.weather_api_key.is_none() {
        tracing::warn!("No weather API key configured, using synthetic weather");
    }

    // Initialize fusion engine
    tracing::info!("Initializing risk fusion engine...");
    let engine = FusionEngine::new(simulator, Arc::new(weather));
    let mut context = SimulationContext::new(engine);
    let engine = context.engine();

    tracing::info!("Starting simulation (interval: {:?})...", config.poll_interval());
    context.start(config.poll_interval());

    // Spawn assessment loop
    let interval = config.assessment_interval();
    let assessment_engine = engine.clone();
    let assessment_task = tokio::spawn(async move {
        let handler = LoggingAssessmentHandler;
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;
            let assessment = assessment_engine.current_assessment().await;

            if assessment.sources.as_ref().is_some_and(|s| s.sensors.is_none()) {
                handler.on_sensors_silent();
            }
            handler.on_assessment(&assessment);
        }
    });

    print_system_status(&config);

    tracing::info!("GeoGuard is now monitoring {}", config.site_name);
    tracing::info!("Press Ctrl+C to stop");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = assessment_task => {
            tracing::warn!("Assessment task ended unexpectedly");
        }
    }

    // Cleanup
    tracing::info!("Shutting down...");
    context.stop();

    let grid = engine.risk_grid(config.grid_size).await;
    if let Some(peak) = grid
        .iter()
        .max_by(|a, b| a.risk_score.total_cmp(&b.risk_score))
    {
        tracing::info!(
            "Final grid peak: {} at {:.3} ({:?})",
            peak.id,
            peak.risk_score,
            peak.risk_class
        );
    }

    tracing::info!("GeoGuard shutdown complete");

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,geoguard=debug,geoguard_sim=debug,geoguard_risk=debug")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false))
        .init();
}

fn print_system_status(config: &AppConfig) {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    tracing::info!("╭─────────────── System Status ───────────────╮");
    tracing::info!("│ Hostname: {:>32} │", System::host_name().unwrap_or_default());
    tracing::info!("│ OS: {:>38} │", System::name().unwrap_or_default());
    tracing::info!("│ CPU: {:>37} │", sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown"));
    tracing::info!("│ Memory: {:>26} MB / {} MB │",
        sys.used_memory() / 1024 / 1024,
        sys.total_memory() / 1024 / 1024);
    tracing::info!("├──────────────── Configuration ────────────────┤");
    tracing::info!("│ Site: {:>36} │", config.site_name);
    tracing::info!("│ Position: {:>21.6}, {:.6} │", config.latitude, config.longitude);
    tracing::info!("│ Sensors: {:>33} │", config.sensor_count);
    tracing::info!("│ Poll Interval: {:>23} ms │", config.poll_interval_ms);
    tracing::info!("│ Assessment Interval: {:>18} s │", config.assessment_interval_secs);
    tracing::info!("│ Live Weather: {:>28} │", if config.weather_api_key.is_some() { "yes" } else { "no" });
    tracing::info!("╰──────────────────────────────────────────────╯");
}
