use anyhow::Result;
use log::{debug, error, info, trace, warn};
use std::fs::File;
use std::io::Write;
use std::time::Instant;

// Define modules used by main
mod agents;
mod coefficients;
mod engine;
mod geometry;
mod group;
mod kernel;
mod simulation;

use engine::Engine;
use ripo_common::SimulationConfig;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting RIPO Engine (CPU Parallel)...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    debug!("Configuration: {:#?}", config);

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Setup ---
    let engine = Engine::from_config(&config)?;
    let mut sim = engine.build()?;
    info!(
        "Initialized {} agents across {} groups.",
        sim.agent_count(),
        config.groups.len()
    );

    let total_steps = config.run.steps;
    let record_interval_steps = config.run.record_interval_steps.max(1);
    if config.run.record_interval_steps == 0 {
        warn!("run.record_interval_steps is 0; recording every step.");
    }
    info!("Recording a snapshot every {} steps.", record_interval_steps);
    let include_state = config.output.save_state_in_snapshot;

    // --- Initial Snapshot (step = 0) ---
    sim.record_snapshot(include_state, include_state);

    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        if let Err(e) = sim.step() {
            error!("Error during simulation step {}: {}", step + 1, e);
            anyhow::bail!("Simulation step failed.");
        }
        let step_duration = step_start_time.elapsed();

        // Print status periodically, and always on record steps.
        let current_time = Instant::now();
        let print_interval_secs = 5.0;
        let should_print_status =
            current_time.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step == total_steps - 1;

        if should_print_status || is_record_step || is_last_step {
            info!(
                "Step [{}/{}] | Agents: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                sim.agent_count(),
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;

            if is_record_step || is_last_step {
                sim.record_snapshot(include_state, include_state);
            }
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    // --- Save Recorded Data ---
    if config.output.save_stats {
        let requested = config.output.format.as_deref().unwrap_or("json");
        let format = if matches!(requested, "json" | "bincode" | "messagepack") {
            requested
        } else {
            error!("Unknown output format '{}'. Using JSON instead.", requested);
            "json"
        };
        let snapshots = sim.snapshots();

        if format == "json" {
            let filename = format!("{}_snapshots.json", config.output.base_filename);
            match File::create(&filename) {
                Ok(mut file) => match serde_json::to_string(snapshots) {
                    Ok(json_string) => {
                        if let Err(e) = file.write_all(json_string.as_bytes()) {
                            error!("Error writing snapshot JSON to file '{}': {}", filename, e);
                        } else {
                            info!("All snapshots saved to {}", filename);
                        }
                    }
                    Err(e) => error!("Error serializing snapshots to JSON: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        } else if format == "bincode" {
            // Binary format (much more compact)
            let filename = format!("{}_snapshots.bin", config.output.base_filename);
            match File::create(&filename) {
                Ok(file) => match bincode::serialize_into(file, snapshots) {
                    Ok(_) => info!("All snapshots saved to {} (binary format)", filename),
                    Err(e) => error!("Error serializing snapshots to bincode: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        } else {
            // MessagePack format (compact and cross-platform)
            let filename = format!("{}_snapshots.msgpack", config.output.base_filename);
            match &mut File::create(&filename) {
                Ok(file) => match rmp_serde::encode::write(file, snapshots) {
                    Ok(_) => info!("All snapshots saved to {} (MessagePack format)", filename),
                    Err(e) => error!("Error serializing snapshots to MessagePack: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    // Save final positions if requested (separate from full snapshots)
    if config.output.save_positions {
        let filename = format!("{}_final_positions.csv", config.output.base_filename);
        match csv::Writer::from_path(&filename) {
            Ok(mut writer) => {
                writer.write_record(["x", "y", "group"])?;
                let group_ids = sim.group_ids().to_vec();
                for (i, (x, y)) in sim.positions().into_iter().enumerate() {
                    writer.write_record([
                        format!("{:.4}", x),
                        format!("{:.4}", y),
                        sim.group_name(group_ids[i] as usize).to_string(),
                    ])?;
                }
                writer.flush()?;
                info!("Final positions saved to {}", filename);
            }
            Err(e) => error!("Error saving CSV file '{}': {}", filename, e),
        }
    } else {
        info!("Skipping saving final positions as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}
