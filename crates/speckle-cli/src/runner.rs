//! Simulation runner: ties together the job file, the engine and the writers.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{ArrayD, Dimension};
use serde::Serialize;

use speckle_atomistic::DirectSumSimulator;
use speckle_compute::{ComputeBackend, CpuBackend};
use speckle_core::diagnostics::Diagnostics;
use speckle_core::propagation::{DetectorData, ShotMetadata};
use speckle_core::{
    Experiment, MapGeometry, ParticleKind, ParticleModel, ParticleSampler, ParticleShape, PropagationResult,
};
use speckle_geometry::{AtomicStructure, Body};

use crate::config::{JobConfig, ParticleConfig};

/// What `shots.json` records per shot.
#[derive(Debug, Serialize)]
pub struct ShotSummary {
    pub shot: usize,
    pub metadata: ShotMetadata,
    pub full_period_resolution: f64,
    pub photons: f64,
    pub masked_pixels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binned_shape: Option<Vec<usize>>,
    pub diagnostics: Diagnostics,
}

impl ShotSummary {
    fn new(shot: usize, result: PropagationResult) -> Self {
        Self {
            shot,
            full_period_resolution: result.data.full_period_resolution,
            photons: result.data.intensity.iter().filter(|v| v.is_finite()).sum(),
            masked_pixels: result.data.mask.iter().filter(|&&m| m != 0).count(),
            binned_shape: result.binned.as_ref().map(|b| b.intensity.shape().to_vec()),
            metadata: result.metadata,
            diagnostics: result.diagnostics,
        }
    }
}

/// Build the engine described by a job file. Relative structure files are
/// resolved against `base_dir`.
pub fn build_experiment(job: &JobConfig, base_dir: &Path) -> Result<Experiment> {
    if job.particles.is_empty() {
        anyhow::bail!("No [[particle]] tables in the job file");
    }
    job.source.validate().context("Invalid [source]")?;
    job.detector.validate().context("Invalid [detector]")?;

    let backend = create_backend(&job.simulation.backend, job.simulation.threads)?;
    let mut has_atoms = false;
    let mut particles: Vec<Box<dyn ParticleSampler>> = Vec::with_capacity(job.particles.len());
    for (i, cfg) in job.particles.iter().enumerate() {
        let model = build_particle(cfg, i, base_dir)?;
        has_atoms |= model.shape() == ParticleShape::Atoms;
        println!(
            "  Particle model '{}': {} (number = {}, {:?} arrival)",
            model.name(),
            cfg.model,
            cfg.number,
            cfg.arrival
        );
        particles.push(Box::new(model));
    }

    let mut experiment = Experiment::new(
        Box::new(job.source.clone()),
        particles,
        Box::new(job.detector.clone()),
    )?
    .with_backend(Arc::clone(&backend))
    .with_options(job.simulation.engine);
    if has_atoms {
        experiment = experiment.with_atomistic_simulator(Box::new(DirectSumSimulator::with_backend(backend)));
    }
    if let Some(seed) = job.simulation.seed {
        experiment = experiment.with_seed(seed);
    }
    Ok(experiment)
}

fn required(value: Option<f64>, field: &str, name: &str) -> Result<f64> {
    value.with_context(|| format!("Particle '{name}': '{field}' is required"))
}

fn build_particle(cfg: &ParticleConfig, index: usize, base_dir: &Path) -> Result<ParticleModel> {
    let shape = ParticleShape::from_model_name(&cfg.model)?;
    let name = cfg
        .name
        .clone()
        .unwrap_or_else(|| format!("{}_{index}", shape.model_name()));
    let material = || {
        cfg.material
            .as_ref()
            .map(|m| m.material())
            .with_context(|| format!("Particle '{name}': 'material' is required"))
    };

    let kind = match shape {
        ParticleShape::Sphere => ParticleKind::Sphere {
            diameter: required(cfg.diameter, "diameter", &name)?,
            material: material()?,
        },
        ParticleShape::Spheroid => ParticleKind::Spheroid {
            diameter: required(cfg.diameter, "diameter", &name)?,
            flattening: cfg.flattening.unwrap_or(1.0),
            material: material()?,
        },
        ParticleShape::Map => {
            let diameter = required(cfg.diameter, "diameter", &name)?;
            let body = match cfg.body.as_deref().unwrap_or("sphere") {
                "sphere" => Body::Sphere { diameter },
                "spheroid" => Body::Spheroid {
                    diameter,
                    flattening: cfg.flattening.unwrap_or(1.0),
                },
                "cube" => Body::Cube { diameter },
                "icosahedron" => Body::Icosahedron { diameter },
                other => anyhow::bail!(
                    "Particle '{name}': unknown body '{other}'. Valid bodies: sphere, spheroid, cube, icosahedron"
                ),
            };
            ParticleKind::Map {
                geometry: MapGeometry::Body {
                    body,
                    material: material()?,
                },
            }
        }
        ParticleShape::Atoms => {
            let file = cfg
                .structure_file
                .as_ref()
                .with_context(|| format!("Particle '{name}': 'structure_file' is required"))?;
            let path = base_dir.join(file);
            let structure = AtomicStructure::from_file(&path)
                .with_context(|| format!("Failed to load structure {}", path.display()))?;
            println!("  Structure '{}': {} atoms", path.display(), structure.len());
            ParticleKind::Atoms {
                structure,
                form_factors: None,
            }
        }
    };

    Ok(ParticleModel::new(name, kind)?
        .with_number(cfg.number, cfg.arrival)
        .with_position(cfg.position)
        .with_position_variation(cfg.position_variation)
        .with_diameter_variation(cfg.diameter_variation)
        .with_flattening_variation(cfg.flattening_variation)
        .with_rotation(cfg.rotation))
}

/// Create a compute backend based on the user's preference string.
fn create_backend(preference: &str, threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    match preference {
        "cpu" | "auto" => {
            let backend = match threads {
                Some(n) => CpuBackend::with_threads(n)?,
                None => CpuBackend::new(),
            };
            println!("Backend: {}", backend.device_info().name);
            Ok(Arc::new(backend))
        }
        other => anyhow::bail!("Unknown backend '{other}'. Valid backends: cpu"),
    }
}

/// Run `shots` shots, writing frames as they are produced.
pub fn run_simulation(job: &JobConfig, base_dir: &Path, shots: usize, out_dir: &Path) -> Result<Vec<ShotSummary>> {
    let mut experiment = build_experiment(job, base_dir)?;
    let sim = &job.simulation;
    let mut summaries = Vec::with_capacity(shots);
    for shot in 0..shots {
        let result = experiment
            .propagate_ndim(sim.dimensions, sim.qn, sim.qmax)
            .with_context(|| format!("Shot {shot} failed"))?;

        if job.output.save_frames {
            write_shot_frames(&result.data, out_dir, &format!("shot_{shot:04}"))?;
            if let Some(binned) = &result.binned {
                write_shot_frames(binned, out_dir, &format!("shot_{shot:04}_binned"))?;
            }
        }

        let summary = ShotSummary::new(shot, result);
        println!(
            "  [{}/{}] {} particles, {:.3e} photons, {} masked, {} retries",
            shot + 1,
            shots,
            summary.metadata.particles.len(),
            summary.photons,
            summary.masked_pixels,
            summary.diagnostics.retries()
        );
        if summary.diagnostics.has_warnings() {
            log::warn!("Shot {shot} produced numerical warnings; see shots.json");
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

fn write_shot_frames(data: &DetectorData, out_dir: &Path, stem: &str) -> Result<()> {
    write_array_csv(&data.intensity, &out_dir.join(format!("{stem}_intensity.csv")))?;
    write_array_csv(&data.mask, &out_dir.join(format!("{stem}_mask.csv")))?;
    Ok(())
}

/// Write a frame as a CSV matrix, or a volume as `iz,iy,ix,value` rows.
pub fn write_array_csv<T: Display>(array: &ArrayD<T>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);

    match array.shape() {
        &[_, nx] => {
            for (i, v) in array.iter().enumerate() {
                let sep = if (i + 1) % nx == 0 { "\n" } else { "," };
                write!(out, "{v}{sep}")?;
            }
        }
        _ => {
            writeln!(out, "iz,iy,ix,value")?;
            for (idx, v) in array.indexed_iter() {
                let idx: Vec<String> = idx.slice().iter().map(|i| i.to_string()).collect();
                writeln!(out, "{},{v}", idx.join(","))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Write the per-shot summaries to a JSON file.
pub fn write_summary_json(summaries: &[ShotSummary], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summaries).context("JSON serialisation error")?;
    std::fs::write(path, json)?;
    println!("Shot summaries (JSON) written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use ndarray::IxDyn;

    const JOB: &str = r#"
        [simulation]
        seed = 3

        [source]
        wavelength = 1e-10
        focus_diameter = 1e-6
        pulse_energy = 1e-3

        [detector]
        distance = 0.1
        pixel_size = 200e-6
        nx = 16
        ny = 16
        binning = 4

        [[particle]]
        model = "sphere"
        diameter = 60e-9
        material = "protein"

        [[particle]]
        model = "map"
        body = "icosahedron"
        diameter = 40e-9
        material = "water"
        position = [100e-9, 0.0, 0.0]
        rotation = { mode = "random" }
    "#;

    #[test]
    fn test_run_writes_frames() {
        let job = parse_config(JOB).unwrap();
        let dir = std::env::temp_dir().join(format!("speckle-cli-test-{}", std::process::id()));
        let summaries = run_simulation(&job, Path::new("."), 2, &dir).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].metadata.particles.len(), 2);
        assert_eq!(summaries[0].binned_shape, Some(vec![4, 4]));
        assert!(summaries[0].photons > 0.0);

        let frame = std::fs::read_to_string(dir.join("shot_0001_intensity.csv")).unwrap();
        assert_eq!(frame.lines().count(), 16);
        assert_eq!(frame.lines().next().unwrap().split(',').count(), 16);
        assert!(dir.join("shot_0000_binned_mask.csv").exists());

        let json = dir.join("shots.json");
        write_summary_json(&summaries, &json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let job = parse_config(&JOB.replace("model = \"map\"", "model = \"cone\"")).unwrap();
        let err = build_experiment(&job, Path::new(".")).err().unwrap();
        assert!(err.to_string().contains("cone"));
    }

    #[test]
    fn test_volume_csv_layout() {
        let dir = std::env::temp_dir().join(format!("speckle-cli-volume-{}", std::process::id()));
        let path = dir.join("v.csv");
        write_array_csv(&ArrayD::from_elem(IxDyn(&[2, 2, 2]), 1.5), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 9);
        assert_eq!(text.lines().nth(8).unwrap(), "1,1,1,1.5");
        std::fs::remove_dir_all(&dir).ok();
    }
}
