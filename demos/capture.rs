//! Capture a frame and save an 8-bit PGM preview.
//!
//! Usage: cargo run --example capture [exposure_seconds] [output.pgm]

use sxcam::{CaptureOptions, Device, TransferEvent};
use std::io::Write;
use std::time::Duration;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let exposure_s: f64 = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(1.0);
    let output = args.next().unwrap_or_else(|| "capture.pgm".into());

    let camera = match Device::open_first() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Open failed: {}", e);
            return;
        }
    };

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let mut opts = CaptureOptions::new(Duration::from_secs_f64(exposure_s));
    opts.events = Some(events_tx);

    let progress = std::thread::spawn(move || {
        for event in events_rx {
            match event {
                TransferEvent::ExposureStarted { exposure_ms } => {
                    println!("Exposing for {} ms...", exposure_ms)
                }
                TransferEvent::ReadoutStarted { expected_bytes } => {
                    println!("Reading {} bytes...", expected_bytes)
                }
                TransferEvent::ChunkReceived { total, expected, .. } => {
                    println!("  {}/{} bytes", total, expected)
                }
                TransferEvent::ChunkTimeout { attempt, max } => {
                    println!("  timeout, retry {}/{}", attempt, max)
                }
                TransferEvent::Completed { received, .. } => {
                    println!("Done: {} bytes", received)
                }
                TransferEvent::Degraded { received, expected } => {
                    println!("Partial frame: {}/{} bytes, rest zero-filled", received, expected)
                }
            }
        }
    });

    let image = match camera.capture_image_with(&opts) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Capture failed: {}", e);
            return;
        }
    };
    drop(opts);
    let _ = progress.join();

    if let Err(e) = save_pgm(&image, &output) {
        eprintln!("Could not write {}: {}", output, e);
        return;
    }
    println!(
        "Saved {} ({}x{}, {} bpp, complete: {})",
        output,
        image.width,
        image.height,
        image.bits_per_pixel,
        image.is_complete()
    );
}

/// Scale the 16-bit samples down to 8 bits and write a binary PGM.
fn save_pgm(image: &sxcam::Image, path: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write!(file, "P5\n{} {}\n255\n", image.width, image.height)?;
    let bytes: Vec<u8> = image.data.iter().map(|&px| (px >> 8) as u8).collect();
    file.write_all(&bytes)
}
