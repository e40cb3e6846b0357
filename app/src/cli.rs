//! GeoGuard CLI Tool
//!
//! Runs one-shot queries against an in-process simulation.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use geoguard_risk::scorer::TerrainFeatures;
use geoguard_risk::weather::{OpenWeatherProvider, SimulatedWeather};
use geoguard_risk::{FusionEngine, RiskAssessment, RiskGridCell, WeatherProvider};
use geoguard_sim::{SensorReading, SensorSimulator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[allow(dead_code)]
mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "geoguard-cli")]
#[command(author = "GeoGuard Team")]
#[command(version = "0.1.0")]
#[command(about = "GeoGuard Mine Slope Risk Monitor CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Simulation ticks to run before answering
    #[arg(short, long, global = true, default_value_t = 0)]
    ticks: u32,

    /// Seed for a reproducible simulation
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Never call the live weather feed
    #[arg(long, global = true)]
    offline: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current sensor readings
    Sensors,

    /// Weather-enhanced risk assessment
    Assess {
        /// Visual risk score from an external inspection (0.0 - 1.0)
        #[arg(long)]
        visual: Option<f64>,
    },

    /// Spatial risk grid
    Grid {
        /// Cells per side (defaults to the configured size)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Start rain, then advance the simulation
    Rain {
        /// Rain intensity
        intensity: f64,
    },

    /// Trigger a tremor, then advance the simulation
    Tremor {
        /// Peak vibration (g)
        magnitude: f64,

        /// Decay rate (1/s)
        #[arg(short, long)]
        decay: Option<f64>,
    },

    /// Score one sensor with the risk model
    Score {
        /// Sensor ID (e.g. S01)
        sensor_id: String,

        #[arg(long, default_value_t = 0.0)]
        slope: f64,

        #[arg(long, default_value_t = 0.0)]
        aspect: f64,

        #[arg(long, default_value_t = 0.0)]
        curvature: f64,

        #[arg(long, default_value_t = 0.0)]
        roughness: f64,
    },

    /// Generate sample configuration
    Config {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// System information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Config { output } => return generate_config(output.as_deref()),
        Commands::Info => return show_info(),
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let engine = build_engine(&cli, &config)?;

    match cli.command {
        Commands::Sensors => {
            run_ticks(&engine, cli.ticks).await;
            let readings = engine.simulator().read().await.snapshot();
            show_sensors(&readings, cli.format)?;
        }

        Commands::Assess { visual } => {
            if let Some(score) = visual {
                engine.set_visual_risk(score).await;
            }
            run_ticks(&engine, cli.ticks).await;
            let assessment = engine.current_assessment().await;
            show_assessment(&assessment, cli.format)?;
        }

        Commands::Grid { size } => {
            run_ticks(&engine, cli.ticks).await;
            let grid = engine.risk_grid(size.unwrap_or(config.grid_size)).await;
            show_grid(&grid, cli.format)?;
        }

        Commands::Rain { intensity } => {
            engine.simulator().write().await.trigger_rain(intensity)?;
            run_ticks(&engine, cli.ticks.max(1)).await;
            let readings = engine.simulator().read().await.snapshot();
            show_sensors(&readings, cli.format)?;
        }

        Commands::Tremor { magnitude, decay } => {
            {
                let sim = engine.simulator();
                let mut sim = sim.write().await;
                match decay {
                    Some(rate) => sim.trigger_tremor(magnitude, rate)?,
                    None => sim.trigger_default_tremor(magnitude)?,
                }
            }
            run_ticks(&engine, cli.ticks.max(1)).await;
            let readings = engine.simulator().read().await.snapshot();
            show_sensors(&readings, cli.format)?;
        }

        Commands::Score { sensor_id, slope, aspect, curvature, roughness } => {
            run_ticks(&engine, cli.ticks).await;
            let terrain = TerrainFeatures {
                slope_deg: slope,
                aspect_deg: aspect,
                curvature,
                roughness,
            };
            let outcome = engine.score_sensor(&sensor_id, terrain).await?;

            match cli.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Format::Table => {
                    println!("Sensor:     {}", sensor_id);
                    println!("Risk score: {:.3}", outcome.risk_score);
                    println!("Risk class: {:?}", outcome.risk_class);
                    if let Some(note) = &outcome.note {
                        println!("Note:       {}", note);
                    }
                }
            }
        }

        Commands::Config { .. } | Commands::Info => {}
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn build_engine(cli: &Cli, config: &AppConfig) -> Result<FusionEngine> {
    let sim_config = config.simulator_config();
    let simulator = match cli.seed {
        Some(seed) => SensorSimulator::with_seed(sim_config, seed)?,
        None => SensorSimulator::new(sim_config)?,
    };

    let weather: Arc<dyn WeatherProvider> = if cli.offline {
        Arc::new(SimulatedWeather)
    } else {
        Arc::new(OpenWeatherProvider::new(
            config.site(),
            config.weather_api_key.clone(),
            config.weather_timeout(),
        ))
    };

    Ok(FusionEngine::new(simulator, weather))
}

/// Advance the simulation, a millisecond apart so tremors decay
async fn run_ticks(engine: &FusionEngine, ticks: u32) {
    for i in 0..ticks {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.advance().await;
    }
}

fn show_sensors(readings: &[SensorReading], format: Format) -> Result<()> {
    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(readings)?);
        return Ok(());
    }

    if readings.is_empty() {
        println!("No sensor readings (network paused).");
        return Ok(());
    }

    println!("╭──────┬───────────────┬────────────┬────────────┬────────────┬──────────┬─────────╮");
    println!("│ ID   │ Category      │ Disp (mm)  │ Pore (kPa) │ Vib (g)    │ Tilt (°) │ Temp °C │");
    println!("├──────┼───────────────┼────────────┼────────────┼────────────┼──────────┼─────────┤");

    for r in readings {
        let v = &r.values;
        println!("│ {:4} │ {:13} │ {:>10.3} │ {:>10.2} │ {:>10.4} │ {:>8.3} │ {:>7.1} │",
            r.sensor_id,
            r.category.to_string(),
            v.displacement_mm,
            v.pore_kpa,
            v.vibration_g,
            v.tilt_deg,
            v.temperature_c);
    }

    println!("╰──────┴───────────────┴────────────┴────────────┴────────────┴──────────┴─────────╯");
    Ok(())
}

fn show_assessment(assessment: &RiskAssessment, format: Format) -> Result<()> {
    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(assessment)?);
        return Ok(());
    }

    let w = &assessment.weather;
    println!("Risk:        {:.3} ({})", assessment.enhanced_risk, assessment.risk_band.label());
    println!("Base risk:   {:.3}", assessment.base_risk);
    println!("Weather:     impact {:.3} x {:.1}", assessment.weather_impact, assessment.risk_multiplier);
    println!("Conditions:  {:?}, {:.1}mm/24h, {:.1}mm/72h, peak {:.1}mm/h ({:?})",
        w.condition,
        w.rainfall_24h_mm,
        w.rainfall_72h_mm,
        w.max_rain_intensity_mm_per_h,
        w.provenance);

    match assessment.sources.as_ref().and_then(|s| s.sensors.as_ref()) {
        Some(s) => println!("Sensors:     {} active, max {:.2}mm / {:.1}kPa / {:.3}g",
            s.active_sensors,
            s.max_displacement_mm,
            s.max_pore_kpa,
            s.max_vibration_g),
        None => println!("Sensors:     none reporting"),
    }

    if !assessment.impact_factors.is_empty() {
        println!("\nDrivers:");
        for factor in &assessment.impact_factors {
            println!("  - {}", factor);
        }
    }

    if !assessment.alerts.is_empty() {
        println!("\nAlerts:");
        for alert in &assessment.alerts {
            println!("  ! {}", alert);
        }
    }

    Ok(())
}

fn show_grid(grid: &[RiskGridCell], format: Format) -> Result<()> {
    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(grid)?);
        return Ok(());
    }

    let size = grid.iter().map(|c| c.col + 1).max().unwrap_or(0);
    for row in grid.chunks(size.max(1)) {
        let line: String = row.iter().map(|c| shade(c.risk_score)).collect();
        println!("{}", line);
    }

    if let Some(peak) = grid.iter().max_by(|a, b| a.risk_score.total_cmp(&b.risk_score)) {
        println!("\nPeak: {} ({:.5}, {:.5}) risk {:.3} {:?}",
            peak.id, peak.lat, peak.lon, peak.risk_score, peak.risk_class);
    }

    Ok(())
}

fn shade(score: f64) -> char {
    match score {
        s if s > 0.75 => '█',
        s if s > 0.6 => '▓',
        s if s > 0.35 => '▒',
        _ => '░',
    }
}

fn generate_config(output: Option<&std::path::Path>) -> Result<()> {
    let example = AppConfig::example();

    if let Some(path) = output {
        std::fs::write(path, example)?;
        println!("Configuration written to: {:?}", path);
    } else {
        println!("{}", example);
    }

    Ok(())
}

fn show_info() -> Result<()> {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("╭──────────────────────────────────────────────────────────────╮");
    println!("│             GeoGuard System Information                      │");
    println!("╰──────────────────────────────────────────────────────────────╯\n");

    println!("System:");
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!("  OS: {} {}",
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default());
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());

    println!("\nHardware:");
    println!("  CPU: {}", sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown"));
    println!("  Cores: {}", sys.cpus().len());
    println!("  Memory: {} MB total, {} MB used",
        sys.total_memory() / 1024 / 1024,
        sys.used_memory() / 1024 / 1024);

    println!("\nGeoGuard:");
    println!("  Version: {}", env!("CARGO_PKG_VERSION"));
    println!("  Live weather key: {}",
        if std::env::var(config::API_KEY_ENV).is_ok() { "✓" } else { "✗" });

    Ok(())
}
