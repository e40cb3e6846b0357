//! GeoGuard Tremor Demo
//!
//! Injects rain and a tremor into a small simulated network and prints
//! how the readings react tick by tick.

use chrono::{Duration, Local};
use geoguard_sim::{SensorSimulator, SimulatorConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("geoguard_sim=info")
        .init();

    println!("=== GeoGuard Tremor Demo ===\n");

    let config = SimulatorConfig {
        sensor_count: 4,
        ..Default::default()
    };
    let mut sim = SensorSimulator::with_seed(config, 2024)?;
    let start = Local::now();

    println!("--- Quiet slope ---");
    for tick in 0..3 {
        print_tick(&mut sim, start + Duration::seconds(tick), tick);
    }

    println!("\n--- Heavy rain ---");
    sim.trigger_rain(20.0)?;
    for tick in 3..8 {
        print_tick(&mut sim, start + Duration::seconds(tick), tick);
    }
    sim.stop_rain();

    println!("\n--- Tremor (0.8g) ---");
    sim.trigger_tremor(0.8, 0.5)?;
    let tremor_start = start + Duration::seconds(8);
    for tick in 0..16 {
        print_tick(&mut sim, tremor_start + Duration::seconds(tick), tick + 8);
        if sim.active_events().tremor.is_none() {
            println!("  Tremor subsided after {}s", tick);
            break;
        }
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}

fn print_tick(sim: &mut SensorSimulator, now: chrono::DateTime<Local>, tick: i64) {
    let readings = sim.poll(now);
    if let Some(first) = readings.first() {
        println!(
            "  Tick {:>2} [{} {}]: disp={:.4}mm pore={:.2}kPa vib={:.5}g tilt={:.4}° temp={:.1}°C",
            tick,
            first.sensor_id,
            first.category,
            first.values.displacement_mm,
            first.values.pore_kpa,
            first.values.vibration_g,
            first.values.tilt_deg,
            first.values.temperature_c
        );
    }
}
