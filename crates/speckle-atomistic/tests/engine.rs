//! The reference simulator driven through the propagation engine.

use approx::assert_relative_eq;

use speckle_atomistic::DirectSumSimulator;
use speckle_core::{
    Detector, Experiment, ParticleKind, ParticleModel, ParticleSampler, Rotation, RotationMode, Source, SourceModel,
};
use speckle_geometry::AtomicStructure;
use speckle_materials::{Element, ELECTRON_RADIUS};

fn planar_molecule() -> AtomicStructure {
    AtomicStructure::new(
        vec![6, 6, 8, 7],
        vec![
            [0.0, 0.0, 0.0],
            [1.5e-10, 0.0, 0.0],
            [2.2e-10, 1.1e-10, 0.0],
            [-0.7e-10, 1.2e-10, 0.0],
        ],
    )
    .unwrap()
}

fn experiment(rotation: RotationMode) -> Experiment {
    let model = ParticleModel::new(
        "molecule",
        ParticleKind::Atoms {
            structure: planar_molecule(),
            form_factors: None,
        },
    )
    .unwrap()
    .with_rotation(rotation);
    let detector = Detector::new(0.05, 200e-6, 21, 21)
        .unwrap()
        .with_solid_angle_correction(false);
    Experiment::new(
        Box::new(Source::new(1e-10, 1e-6, 1e-3).unwrap()),
        vec![Box::new(model) as Box<dyn ParticleSampler>],
        Box::new(detector),
    )
    .unwrap()
    .with_atomistic_simulator(Box::new(DirectSumSimulator::new()))
}

#[test]
fn test_forward_amplitude() {
    let result = experiment(RotationMode::None).propagate().unwrap();
    let fluence = Source::new(1e-10, 1e-6, 1e-3).unwrap().intensity([0.0; 3], 1e-3);
    let electrons: f64 = [6u32, 6, 8, 7]
        .iter()
        .map(|&z| Element::from_z(z).unwrap().form_factor(0.0))
        .sum();
    let omega = (200e-6f64 / 0.05).powi(2);
    assert_relative_eq!(
        result.data.fourier[[10, 10]].norm(),
        fluence.sqrt() * ELECTRON_RADIUS * omega.sqrt() * electrons,
        max_relative = 1e-12
    );
}

#[test]
fn test_planar_molecule_is_centrosymmetric_in_intensity() {
    let result = experiment(RotationMode::None).propagate().unwrap();
    let intensity = result.expected_intensity();
    for (iy, ix) in [(0, 0), (3, 17), (9, 2), (20, 11)] {
        assert_relative_eq!(
            intensity[[iy, ix]],
            intensity[[20 - iy, 20 - ix]],
            max_relative = 1e-9
        );
    }
}

#[test]
fn test_rotation_about_beam_axis_rotates_pattern() {
    let quarter = Rotation::from_axis_angle([0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2).unwrap();
    let plain = experiment(RotationMode::None).propagate().unwrap().expected_intensity();
    let turned = experiment(RotationMode::Fixed { quaternion: quarter })
        .propagate()
        .unwrap()
        .expected_intensity();
    // A +90° turn about z maps lab (x, y) to body (y, -x).
    for (iy, ix) in [(2, 5), (7, 15), (18, 3)] {
        assert_relative_eq!(turned[[iy, ix]], plain[[20 - ix, iy]], max_relative = 1e-6);
    }
}
