use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::rc::Rc;
use std::time::Instant;

// Define modules used by main
mod backend;
mod compute;
mod driver;
mod field;
mod frame_clock;
mod host;
mod page;
mod surface;

use backend::CpuBackend;
use host::PageElement;
use page::EffectPage;
use ripple_common::{FieldSnapshot, RippleConfig};

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Ripple Engine (CPU Parallel)...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = RippleConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Assemble the page ---
    let backend = Rc::new(CpuBackend::new(config.shading));
    let elements: Vec<PageElement> = config.elements.iter().map(PageElement::from_config).collect();
    let mut page = EffectPage::new(backend, elements, config.timing.seed);
    let mounted = page.mount();
    if mounted == 0 {
        warn!("No fluid effects mounted; the run will only advance the clock.");
    }
    for (element_id, driver) in page.drivers() {
        debug!("Element '{}' options: {:#?}", element_id, driver.config());
    }

    // --- Frame Loop ---
    let total_frames = config.timing.total_frames;
    let mut record_interval = config.timing.record_interval_frames;
    if record_interval == 0 {
        warn!("Record interval is 0 frames. Recording every frame.");
        record_interval = 1;
    }
    info!("Recording snapshots every {} frames.", record_interval);

    let mut snapshots: Vec<FieldSnapshot> = Vec::new();
    info!("Recording initial snapshot (frame 0)...");
    record_snapshots(&page, &mut snapshots);

    info!("Starting frame loop for {} frames...", total_frames);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    let mut pending_input = config.input.iter().peekable();

    for frame in 1..=total_frames {
        // Host events land before the frame callbacks run.
        while let Some(event) = pending_input.next_if(|e| e.frame <= frame) {
            if !page.dispatch(&event.element, &event.action) {
                warn!(
                    "Input at frame {} for '{}' has no mounted effect.",
                    event.frame, event.element
                );
            }
        }

        let frame_start_time = Instant::now();
        let ticked = page.run_frame();
        let frame_duration = frame_start_time.elapsed();

        let current_time = Instant::now();
        let print_interval_secs = 5.0;
        let should_print_status =
            current_time.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_frame = frame % record_interval == 0;
        let is_last_frame = frame == total_frames;

        if should_print_status || is_record_frame || is_last_frame {
            info!(
                "Frame [{}/{}] | Drivers ticked: {} | Frame Time: {:6.2} ms | Elapsed: {:.2} s",
                frame,
                total_frames,
                ticked,
                frame_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;

            if is_record_frame || is_last_frame {
                record_snapshots(&page, &mut snapshots);
            }
        } else {
            trace!(
                "Frame [{}/{}] completed in {:.2} ms",
                frame,
                total_frames,
                frame_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Frame loop finished in {:.3} seconds ({:.1} frames per second).",
        total_duration.as_secs_f64(),
        total_frames as f64 / total_duration.as_secs_f64().max(1e-9)
    );

    // --- Save Recorded Data ---
    if config.output.save_snapshots {
        save_snapshots(&config, &snapshots)?;
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    if config.output.save_heights {
        save_heights(&config, &page)?;
    } else {
        info!("Skipping saving final heights as per config.");
    }

    page.teardown();
    info!("Run Complete.");
    Ok(())
}

fn record_snapshots(page: &EffectPage, snapshots: &mut Vec<FieldSnapshot>) {
    for (element_id, driver) in page.drivers() {
        let snapshot = driver.snapshot(element_id);
        debug!(
            "Snapshot '{}' frame {}: peak {:.4}, {} active cells",
            element_id,
            snapshot.frame,
            snapshot.peak_height(),
            snapshot.active_cells()
        );
        snapshots.push(snapshot);
    }
}

fn save_snapshots(config: &RippleConfig, snapshots: &[FieldSnapshot]) -> Result<()> {
    let base = &config.output.base_filename;
    let output_format = config.output.format.as_deref().unwrap_or("json");

    match output_format {
        "bincode" => {
            // Count header first, then one record per snapshot; the visualizer streams this.
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            let count = u32::try_from(snapshots.len()).context("Too many snapshots for the bincode header")?;
            bincode::serialize_into(&mut writer, &count)?;
            for snapshot in snapshots {
                bincode::serialize_into(&mut writer, snapshot)
                    .with_context(|| format!("Error serializing snapshots to '{}'", filename))?;
            }
            writer.flush()?;
            info!("{} snapshots saved to {} (binary format)", snapshots.len(), filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            rmp_serde::encode::write(&mut file, &snapshots)
                .with_context(|| format!("Error serializing snapshots to '{}'", filename))?;
            info!("{} snapshots saved to {} (MessagePack format)", snapshots.len(), filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            let json_string = serde_json::to_string(snapshots).context("Error serializing snapshots to JSON")?;
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            file.write_all(json_string.as_bytes())
                .with_context(|| format!("Error writing snapshot JSON to file '{}'", filename))?;
            info!("{} snapshots saved to {} ({}MB)", snapshots.len(), filename, json_string.len() / 1_048_576);
        }
    }
    Ok(())
}

/// Writes each driver's final height grid as CSV, top row first.
fn save_heights(config: &RippleConfig, page: &EffectPage) -> Result<()> {
    for (element_id, driver) in page.drivers() {
        let snapshot = driver.snapshot(element_id);
        let filename = format!("{}_{}_heights.csv", config.output.base_filename, element_id);
        let mut writer = csv::Writer::from_path(&filename)
            .with_context(|| format!("Error creating CSV file '{}'", filename))?;

        let width = snapshot.field_width as usize;
        for row in snapshot.height.chunks(width.max(1)).rev() {
            writer.write_record(row.iter().map(|h| format!("{:.6}", h)))?;
        }
        writer.flush()?;
        info!(
            "Final heights of '{}' ({}x{}) saved to {}",
            element_id, snapshot.field_width, snapshot.field_height, filename
        );
    }
    Ok(())
}
