//! Writes synthetic diffraction frames for two cell classes plus a matching
//! config, so the pipeline can be tried without a camera:
//!
//! ```text
//! cargo run --bin generate_sample -- sample_data
//! cargo run -- run --config sample_data/config.json --out results
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 48;
const FRAMES_PER_CLASS: usize = 12;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// One frame: a horizontal diffraction profile of summed peaks, repeated on
/// every row with per-pixel noise and a per-frame brightness drift.
fn generate_frame(peaks: &[(f64, f64, f64)], rng: &mut StdRng) -> GrayImage {
    let drift = gauss(rng, 1.0, 0.05);
    let profile: Vec<f64> = (0..WIDTH)
        .map(|col| {
            let x = f64::from(col);
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(x, mu, sigma, amp))
                .sum();
            (10.0 + signal) * drift
        })
        .collect();

    GrayImage::from_fn(WIDTH, HEIGHT, |col, _| {
        let value = profile[col as usize] + gauss(rng, 0.0, 4.0);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

fn write_class(dir: &Path, peaks: &[(f64, f64, f64)], rng: &mut StdRng) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for i in 0..FRAMES_PER_CLASS {
        let path = dir.join(format!("frame_{i:03}.tiff"));
        generate_frame(peaks, rng)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let root = std::env::args().nth(1).unwrap_or_else(|| "sample_data".to_string());
    let root = Path::new(&root);
    let mut rng = StdRng::seed_from_u64(42);

    // Red cells scatter into a wider central lobe, white cells show a
    // stronger side order.
    let red_peaks = [(128.0, 18.0, 120.0), (70.0, 10.0, 30.0), (186.0, 10.0, 30.0)];
    let white_peaks = [(128.0, 12.0, 110.0), (80.0, 8.0, 55.0), (176.0, 8.0, 55.0)];

    write_class(&root.join("RBC"), &red_peaks, &mut rng)?;
    write_class(&root.join("WBC"), &white_peaks, &mut rng)?;

    let config = json!({
        "class_a": { "name": "RBC", "folder": "RBC", "label": 1 },
        "class_b": { "name": "WBC", "folder": "WBC", "label": 0 },
        "gain": 5
    });
    let config_path = root.join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!(
        "Wrote {} frames per class ({WIDTH}×{HEIGHT}) and {}",
        FRAMES_PER_CLASS,
        config_path.display()
    );
    Ok(())
}
