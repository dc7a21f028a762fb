//! TOML configuration deserialisation for simulation jobs.
//!
//! ```toml
//! [simulation]
//! shots = 10
//! seed = 7
//!
//! [source]
//! wavelength = 1e-10
//! focus_diameter = 1e-6
//! pulse_energy = 1e-3
//!
//! [detector]
//! distance = 0.1
//! pixel_size = 75e-6
//! nx = 512
//! ny = 512
//!
//! [[particle]]
//! model = "sphere"
//! diameter = 100e-9
//! material = "virus"
//! ```

use std::path::Path;

use serde::Deserialize;
use speckle_core::{Arrival, Detector, EngineOptions, RotationMode, Source, Variation};
use speckle_materials::Material;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub source: Source,
    pub detector: Detector,
    #[serde(default, rename = "particle")]
    pub particles: Vec<ParticleConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Shot loop and engine settings.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_shots")]
    pub shots: usize,
    /// 2 for detector frames, 3 for reciprocal volumes.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Compute backend: only "cpu" is available.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads for the CPU backend (default: all cores).
    #[serde(default)]
    pub threads: Option<usize>,
    /// Samples per axis of the 3-D volume.
    #[serde(default)]
    pub qn: Option<usize>,
    /// Half-width of the 3-D volume (1/m).
    #[serde(default)]
    pub qmax: Option<f64>,
    #[serde(flatten)]
    pub engine: EngineOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            shots: default_shots(),
            dimensions: default_dimensions(),
            seed: None,
            backend: default_backend(),
            threads: None,
            qn: None,
            qmax: None,
            engine: EngineOptions::default(),
        }
    }
}

fn default_shots() -> usize {
    1
}
fn default_dimensions() -> usize {
    2
}
fn default_backend() -> String {
    "cpu".into()
}

/// A material given either by preset name or in full.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaterialSpec {
    Name(String),
    Full(Material),
}

impl MaterialSpec {
    pub fn material(&self) -> Material {
        match self {
            MaterialSpec::Name(name) => Material::Preset { name: name.clone() },
            MaterialSpec::Full(material) => material.clone(),
        }
    }
}

/// One `[[particle]]` table.
#[derive(Debug, Deserialize)]
pub struct ParticleConfig {
    /// One of "sphere", "spheroid", "map", "atoms".
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_number")]
    pub number: f64,
    #[serde(default)]
    pub arrival: Arrival,
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default)]
    pub position_variation: [Variation; 3],
    /// Volume-equivalent diameter (m); sphere, spheroid and map bodies.
    #[serde(default)]
    pub diameter: Option<f64>,
    #[serde(default)]
    pub diameter_variation: Variation,
    #[serde(default)]
    pub flattening: Option<f64>,
    #[serde(default)]
    pub flattening_variation: Variation,
    #[serde(default)]
    pub material: Option<MaterialSpec>,
    /// Map body: "sphere", "spheroid", "cube" or "icosahedron".
    #[serde(default)]
    pub body: Option<String>,
    /// Atoms: `.xyz` or `.pdb` file, relative to the job file.
    #[serde(default)]
    pub structure_file: Option<String>,
    #[serde(default)]
    pub rotation: RotationMode,
}

fn default_number() -> f64 {
    1.0
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save per-shot frames as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_frames: bool,
    /// Whether to save shot metadata as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_frames: true,
            save_json: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use speckle_core::detection::NoiseModel;
    use speckle_core::Polarization;

    const JOB: &str = r#"
        [simulation]
        shots = 3
        seed = 11
        save_qmap = true

        [source]
        wavelength = 1e-10
        focus_diameter = 1e-6
        pulse_energy = 1e-3
        polarization = "vertical"
        pulse_energy_variation = { type = "uniform", spread = 1e-4 }

        [detector]
        distance = 0.1
        pixel_size = 75e-6
        nx = 64
        ny = 48
        binning = 4
        noise = { type = "poisson" }
        hole_diameter = 4.0

        [[particle]]
        model = "sphere"
        diameter = 100e-9
        material = "virus"
        arrival = "random"
        number = 2.0

        [[particle]]
        model = "spheroid"
        diameter = 80e-9
        flattening = 0.7
        material = { type = "decrement", delta = 1e-6, beta = 1e-9 }
        rotation = { mode = "random" }
    "#;

    #[test]
    fn test_parse_full_job() {
        let job = parse_config(JOB).unwrap();
        assert_eq!(job.simulation.shots, 3);
        assert_eq!(job.simulation.dimensions, 2);
        assert!(job.simulation.engine.save_qmap);
        assert_eq!(job.simulation.engine.max_map_voxels_per_axis, 256);
        assert_eq!(job.source.polarization, Polarization::Vertical);
        assert_eq!(job.detector.binning, Some(4));
        assert!(job.detector.solid_angle_correction);
        assert_eq!(job.detector.noise, NoiseModel::Poisson);
        assert_eq!(job.particles.len(), 2);
        assert_eq!(job.particles[0].arrival, Arrival::Random);
        assert!(matches!(job.particles[0].material, Some(MaterialSpec::Name(ref n)) if n == "virus"));
        assert!(matches!(
            job.particles[1].material.as_ref().map(MaterialSpec::material),
            Some(Material::Decrement { .. })
        ));
        assert_eq!(job.particles[1].rotation, RotationMode::Random);
        assert_eq!(job.output.directory, "./output");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        assert!(parse_config("[detector]\ndistance = 0.1\npixel_size = 1e-4\nnx = 4\nny = 4\n").is_err());
    }
}
