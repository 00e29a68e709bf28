use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use blood_spectra::analysis::AnalysisConfig;
use blood_spectra::data::loader;
use blood_spectra::{Config, pipeline, report};

#[derive(Parser)]
#[command(version, about = "Spectral separability analysis of red/white blood cell diffraction images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reduce both class folders, analyze, and write the dataset and report.
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value = "results")]
        out: PathBuf,
        /// Override the configured gain.
        #[arg(long)]
        gain: Option<f64>,
    },
    /// Only reduce the images and export the dataset (.csv or .parquet).
    Reduce {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        gain: Option<f64>,
    },
    /// Analyze a previously exported dataset table.
    Analyze {
        #[arg(short, long)]
        dataset: PathBuf,
        #[arg(short, long, default_value = "results")]
        out: PathBuf,
        /// Config file whose `analysis` section is used; defaults otherwise.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: &Path, gain: Option<f64>) -> Result<Config> {
    let mut config = Config::from_file(path)?;
    if let Some(gain) = gain {
        config.gain = gain;
        config.validate()?;
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Run { config, out, gain } => {
            let config = load_config(&config, gain)?;
            let (dataset, analysis) = pipeline::run(&config)?;
            std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;
            loader::save_file(&dataset, &out.join("dataset.csv"))?;
            report::write_report(&analysis, &out)?;
            println!(
                "accuracy {:.3}, confusion {:?}, {} warning(s); results in {}",
                analysis.classification.accuracy,
                analysis.classification.confusion.counts,
                analysis.warnings.len(),
                out.display()
            );
        }
        Command::Reduce {
            config,
            output,
            gain,
        } => {
            let config = load_config(&config, gain)?;
            let dataset = pipeline::build_dataset(&config)?;
            loader::save_file(&dataset, &output)?;
            println!(
                "Wrote {} spectra ({} bins each) to {}",
                dataset.len(),
                dataset.width(),
                output.display()
            );
        }
        Command::Analyze {
            dataset: table,
            out,
            config,
        } => {
            let analysis_config = match config {
                Some(path) => Config::from_file(&path)?.analysis,
                None => AnalysisConfig::default(),
            };
            let dataset = loader::load_file(&table)
                .with_context(|| format!("loading dataset {}", table.display()))?;
            let analysis = pipeline::analyze(&dataset, &analysis_config)?;
            report::write_report(&analysis, &out)?;
            println!(
                "accuracy {:.3} on {} rows; results in {}",
                analysis.classification.accuracy,
                analysis.n_samples,
                out.display()
            );
        }
    }
    Ok(())
}
