//! Speckle command-line interface.
//!
//! Run diffraction simulations from TOML job files:
//! ```sh
//! speckle-cli run job.toml
//! speckle-cli validate job.toml
//! speckle-cli materials
//! ```

mod config;
mod runner;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use speckle_materials::{Material, MaterialProvider};

/// Wavelength at which `materials` reports Δn (1 Å).
const REFERENCE_WAVELENGTH: f64 = 1e-10;

#[derive(Parser)]
#[command(name = "speckle-cli")]
#[command(about = "Speckle: coherent X-ray diffraction simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML job file.
    Run {
        /// Path to the job file.
        config: PathBuf,
        /// Output directory (overrides the job file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of shots (overrides the job file setting).
        #[arg(short = 'n', long)]
        shots: Option<usize>,
    },
    /// Parse a job file and build the experiment without propagating.
    Validate {
        /// Path to the job file.
        config: PathBuf,
    },
    /// List material presets and their refractive-index decrement at 1 Å.
    Materials,
}

fn job_dir(config: &Path) -> &Path {
    config.parent().unwrap_or_else(|| Path::new("."))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output, shots } => {
            println!("Speckle diffraction simulator");
            println!("=============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            let shots = shots.unwrap_or(job.simulation.shots);
            let summaries = runner::run_simulation(&job, job_dir(&config), shots, &out_dir)?;

            if job.output.save_json {
                runner::write_summary_json(&summaries, &out_dir.join("shots.json"))?;
            }
            if job.output.save_frames {
                println!("Frames written to: {}", out_dir.display());
            }
            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::build_experiment(&job, job_dir(&config))?;
            println!("Configuration is valid: {}", config.display());
            let state = job.detector.state();
            for (i, particle) in job.particles.iter().enumerate() {
                if let Some(d) = particle.diameter {
                    let ratio = state.linear_sampling_ratio(job.source.wavelength, d);
                    println!("  particle {i} ({}): linear sampling ratio {ratio:.2}", particle.model);
                    if ratio < 1.0 {
                        log::warn!("particle {i} is undersampled by the detector (ratio {ratio:.2})");
                    }
                }
            }
            Ok(())
        }
        Commands::Materials => {
            println!("Material presets (Δn = δ + iβ at λ = 1 Å):");
            println!();
            for name in Material::PRESETS {
                let dn = Material::preset(name)?.refractive_index_decrement(REFERENCE_WAVELENGTH)?;
                println!("  {name:<8}  δ = {:.3e}", dn.re);
            }
            println!();
            println!("Explicit values: material = {{ type = \"decrement\", delta = ..., beta = ... }}");
            Ok(())
        }
    }
}
