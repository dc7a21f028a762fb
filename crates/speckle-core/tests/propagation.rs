//! End-to-end propagation tests.
//!
//! - Radial symmetry of a centred sphere on a 1024 × 1024 detector
//! - Two-sphere interference fringes, 4 cos²(q_x d) modulation
//! - Coherent sum independent of particle order
//! - Density-map kernel agrees with the analytic sphere at low q
//! - 3-D configuration errors and the 3-D forward amplitude
//! - Retry on an empty interaction volume
//! - Polarization, binning, qmap cache traffic and saved fields

use std::f64::consts::PI;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rand::rngs::StdRng;

use speckle_core::diagnostics::DiagnosticEvent;
use speckle_core::kernels::primary_amplitude;
use speckle_core::qmap::wavenumber;
use speckle_core::{
    Arrival, Detector, EngineOptions, ErrorKind, Experiment, MapGeometry, ParticleInstance, ParticleKind,
    ParticleModel, ParticleSampler, ParticleShape, Polarization, PropagationError, Rotation, RotationMode,
    Source, SourceModel,
};
use speckle_geometry::Body;
use speckle_materials::Material;

// ─────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────

const WAVELENGTH: f64 = 1e-10;

fn source() -> Source {
    Source::new(WAVELENGTH, 10e-6, 1e-3).unwrap()
}

fn protein() -> Material {
    Material::Decrement {
        delta: 2e-6,
        beta: 1e-9,
    }
}

fn sphere_model(name: &str, diameter: f64, position: [f64; 3]) -> ParticleModel {
    ParticleModel::new(
        name,
        ParticleKind::Sphere {
            diameter,
            material: protein(),
        },
    )
    .unwrap()
    .with_position(position)
}

fn experiment(models: Vec<ParticleModel>, detector: Detector) -> Experiment {
    let particles: Vec<Box<dyn ParticleSampler>> = models
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn ParticleSampler>)
        .collect();
    Experiment::new(Box::new(source()), particles, Box::new(detector))
        .unwrap()
        .with_seed(1)
}

fn small_detector() -> Detector {
    Detector::new(0.1, 100e-6, 64, 64).unwrap()
}

// ─────────────────────────────────────────────────────────────
// Detector-plane scenarios
// ─────────────────────────────────────────────────────────────

#[test]
fn test_centred_sphere_is_radially_symmetric() {
    let n = 1024;
    let detector = Detector::new(0.1, 100e-6, n, n).unwrap();
    let mut exp = experiment(vec![sphere_model("sphere", 100e-9, [0.0; 3])], detector);
    let result = exp.propagate().unwrap();
    let intensity = &result.data.intensity;
    assert_eq!(intensity.shape(), &[n, n]);

    let c = (n as f64 - 1.0) / 2.0;
    for radius in [50.0, 150.0, 300.0] {
        let mut sectors = [(0.0f64, 0usize); 8];
        for iy in 0..n {
            for ix in 0..n {
                let (dx, dy) = (ix as f64 - c, iy as f64 - c);
                // Diagonal pixels sit on sector boundaries.
                if dx.abs() == dy.abs() {
                    continue;
                }
                let r = (dx * dx + dy * dy).sqrt();
                if (r - radius).abs() < 2.0 {
                    let angle = dy.atan2(dx) + PI;
                    let s = ((angle / (2.0 * PI) * 8.0) as usize).min(7);
                    sectors[s].0 += intensity[[iy, ix]];
                    sectors[s].1 += 1;
                }
            }
        }
        let means: Vec<f64> = sectors.iter().map(|(sum, k)| sum / *k as f64).collect();
        let mean = means.iter().sum::<f64>() / 8.0;
        for m in &means {
            assert_relative_eq!(*m, mean, max_relative = 0.01);
        }
    }
}

#[test]
fn test_two_spheres_produce_fringes() {
    let d = 200e-9;
    let single = experiment(vec![sphere_model("a", 50e-9, [0.0; 3])], small_detector())
        .propagate()
        .unwrap();
    let pair = experiment(
        vec![sphere_model("a", 50e-9, [d, 0.0, 0.0]), sphere_model("b", 50e-9, [-d, 0.0, 0.0])],
        small_detector(),
    )
    .propagate()
    .unwrap();
    assert_eq!(pair.particle_count(), 2);

    let state = single.metadata.detector;
    let qmap = state.generate_qmap(WAVELENGTH, None, speckle_core::AxisOrder::Xyz);
    let i1 = single.expected_intensity();
    let i2 = pair.expected_intensity();
    let peak = i1.iter().cloned().fold(0.0, f64::max);
    for iy in 0..state.ny {
        for ix in 0..state.nx {
            let fringe = 4.0 * (qmap[[iy, ix, 0]] * d).cos().powi(2);
            assert_abs_diff_eq!(i2[[iy, ix]], fringe * i1[[iy, ix]], epsilon = 1e-9 * peak);
        }
    }
    // The modulation actually reaches a minimum on this detector.
    let q_edge = state.q_max_edge(WAVELENGTH);
    assert!(q_edge * d > PI / 2.0);
}

#[test]
fn test_superposition_is_order_independent() {
    let spheroid = ParticleModel::new(
        "spheroid",
        ParticleKind::Spheroid {
            diameter: 80e-9,
            flattening: 0.6,
            material: protein(),
        },
    )
    .unwrap()
    .with_position([-150e-9, 40e-9, 0.0])
    .with_rotation(RotationMode::Fixed {
        quaternion: Rotation::from_axis_angle([0.0, 0.0, 1.0], 0.4).unwrap(),
    });
    let sphere = sphere_model("sphere", 60e-9, [120e-9, 0.0, 30e-9]);

    let ab = experiment(vec![sphere.clone(), spheroid.clone()], small_detector())
        .propagate()
        .unwrap();
    let ba = experiment(vec![spheroid, sphere], small_detector())
        .propagate()
        .unwrap();
    let scale = ab.data.fourier.iter().map(|f| f.norm()).fold(0.0, f64::max);
    for (x, y) in ab.data.fourier.iter().zip(ba.data.fourier.iter()) {
        assert_abs_diff_eq!((x - y).norm(), 0.0, epsilon = 1e-12 * scale);
    }
}

#[test]
fn test_forward_amplitude_matches_volume_scaling() {
    // Beam centre on pixel (8, 8): q = 0 there.
    let detector = Detector::new(0.5, 75e-6, 17, 17)
        .unwrap()
        .with_solid_angle_correction(false);
    let diameter = 100e-9;
    let mut exp = experiment(vec![sphere_model("sphere", diameter, [0.0; 3])], detector);
    let result = exp.propagate().unwrap();
    let record = &result.metadata.particles["particle_00"];
    let volume = PI / 6.0 * diameter.powi(3);
    let omega = (75e-6f64 / 0.5).powi(2);
    let expected = record.f0 * volume * protein_dn_norm() * omega.sqrt();
    assert_relative_eq!(result.data.fourier[[8, 8]].norm(), expected, max_relative = 1e-12);
    assert_relative_eq!(record.f0, primary_amplitude(record.fluence, WAVELENGTH));
}

fn protein_dn_norm() -> f64 {
    (2e-6f64.powi(2) + 1e-9f64.powi(2)).sqrt()
}

#[test]
fn test_density_map_matches_sphere_near_the_beam() {
    let detector = || Detector::new(0.1, 100e-6, 32, 32).unwrap();
    let body = ParticleModel::new(
        "map",
        ParticleKind::Map {
            geometry: MapGeometry::Body {
                body: Body::Sphere { diameter: 60e-9 },
                material: Material::Decrement {
                    delta: 2e-6,
                    beta: 0.0,
                },
            },
        },
    )
    .unwrap();
    let analytic = ParticleModel::new(
        "sphere",
        ParticleKind::Sphere {
            diameter: 60e-9,
            material: Material::Decrement {
                delta: 2e-6,
                beta: 0.0,
            },
        },
    )
    .unwrap();

    let map = experiment(vec![body], detector()).propagate().unwrap();
    let sphere = experiment(vec![analytic], detector()).propagate().unwrap();
    assert!(map.metadata.particles["particle_00"].dx.is_some());
    assert!(map
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::MapSampled { .. })));
    for (iy, ix) in [(15, 15), (15, 16), (16, 15), (16, 16)] {
        assert_relative_eq!(
            map.data.fourier[[iy, ix]].norm(),
            sphere.data.fourier[[iy, ix]].norm(),
            max_relative = 0.03
        );
    }
    assert!(map.data.fourier.iter().all(|f| f.re.is_finite()));
}

#[test]
fn test_polarization_factor() {
    let make = |pol: Polarization| {
        let src = source().with_polarization(pol);
        Experiment::new(
            Box::new(src),
            vec![Box::new(sphere_model("s", 50e-9, [0.0; 3])) as Box<dyn ParticleSampler>],
            Box::new(small_detector()),
        )
        .unwrap()
    };
    let plain = make(Polarization::Ignore).propagate().unwrap();
    let horizontal = make(Polarization::Horizontal).propagate().unwrap();
    let state = plain.metadata.detector;
    let (iy, ix) = (31, 0);
    let x = (ix as f64 - state.cx) * state.pixel_size;
    let y = (iy as f64 - state.cy) * state.pixel_size;
    let l2 = x * x + y * y + state.distance * state.distance;
    assert_relative_eq!(
        horizontal.data.intensity[[iy, ix]],
        plain.data.intensity[[iy, ix]] * (1.0 - x * x / l2),
        max_relative = 1e-12
    );
}

#[test]
fn test_binning_is_energy_consistent() {
    let detector = Detector::new(0.1, 100e-6, 30, 30).unwrap().with_binning(4);
    let result = experiment(vec![sphere_model("s", 80e-9, [0.0; 3])], detector)
        .propagate()
        .unwrap();
    let binned = result.binned.as_ref().unwrap();
    assert_eq!(binned.intensity.shape(), &[8, 8]);
    // Edge blocks overhang the 30-pixel frame.
    assert_ne!(binned.mask[[7, 0]] & speckle_core::detection::PixelMask::MISSING, 0);
    assert_eq!(binned.mask[[0, 0]], 0);

    let total: f64 = result.data.intensity.iter().sum();
    let total_binned: f64 = binned.intensity.iter().sum();
    assert_relative_eq!(total, total_binned, max_relative = 1e-12);
    for (f, i) in binned.fourier.iter().zip(binned.intensity.iter()) {
        assert_relative_eq!(f.norm_sqr(), *i, max_relative = 1e-9);
    }
}

#[test]
fn test_qmap_cache_traffic() {
    let mut exp = experiment(vec![sphere_model("s", 50e-9, [0.0; 3])], small_detector());
    let first = exp.propagate().unwrap();
    let second = exp.propagate().unwrap();
    let computed = |r: &speckle_core::PropagationResult| {
        r.diagnostics
            .events()
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::QmapComputed { .. }))
            .count()
    };
    assert_eq!(computed(&first), 1);
    assert_eq!(computed(&second), 0);
    assert!(second
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::QmapReused { .. })));
    // Spheres only need the unrotated field, which never enters the shared slot.
    assert_eq!(exp.cache().generation(), 0);
    assert_eq!(first.data.fourier, second.data.fourier);
}

fn qmap_events(r: &speckle_core::PropagationResult) -> (usize, usize) {
    let events = r.diagnostics.events();
    (
        events
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::QmapComputed { .. }))
            .count(),
        events
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::QmapReused { .. }))
            .count(),
    )
}

#[test]
fn test_rotated_map_field_is_reused_across_shots() {
    let turn = Rotation::from_axis_angle([0.0, 0.0, 1.0], 0.3).unwrap();
    let map = ParticleModel::new(
        "cube",
        ParticleKind::Map {
            geometry: MapGeometry::Body {
                body: Body::Cube { diameter: 40e-9 },
                material: protein(),
            },
        },
    )
    .unwrap()
    .with_rotation(RotationMode::Fixed { quaternion: turn });
    let mut exp = experiment(vec![map], Detector::new(0.1, 100e-6, 16, 16).unwrap());

    let first = exp.propagate().unwrap();
    assert_eq!(qmap_events(&first), (2, 0));
    for _ in 0..2 {
        let next = exp.propagate().unwrap();
        assert_eq!(qmap_events(&next), (0, 2));
        assert_eq!(next.data.fourier, first.data.fourier);
    }
    assert_eq!(exp.cache().generation(), 1);
    let entry = exp.cache().peek().unwrap();
    assert_eq!(entry.key.order, speckle_core::AxisOrder::Zyx);
    assert!(entry.key.rotation.is_some());
}

#[test]
fn test_saved_fields() {
    let map = ParticleModel::new(
        "cube",
        ParticleKind::Map {
            geometry: MapGeometry::Body {
                body: Body::Cube { diameter: 40e-9 },
                material: protein(),
            },
        },
    )
    .unwrap()
    .with_rotation(RotationMode::Random);
    let mut exp = experiment(vec![map], Detector::new(0.1, 100e-6, 16, 16).unwrap()).with_options(EngineOptions {
        save_map3d: true,
        save_qmap: true,
        ..EngineOptions::default()
    });
    let result = exp.propagate().unwrap();
    let qmap = &result.qmaps["particle_00"];
    assert_eq!(qmap.shape(), &[16, 16, 3]);
    let saved = &result.maps3d["particle_00"];
    assert_eq!(Some(saved.dx), result.metadata.particles["particle_00"].dx);
    assert!(saved.density.iter().any(|v| v.re > 0.0));
    // Rotated maps use the zyx body-frame field, so |q| is preserved.
    let k = wavenumber(WAVELENGTH);
    assert!(qmap.iter().all(|v| v.abs() <= k));
}

// ─────────────────────────────────────────────────────────────
// Configuration errors and 3-D propagation
// ─────────────────────────────────────────────────────────────

#[test]
fn test_three_dimensional_configuration_errors() {
    let mut with_correction = experiment(vec![sphere_model("s", 50e-9, [0.0; 3])], small_detector());
    let err = with_correction.propagate_3d(Some(8), None).unwrap_err();
    assert!(matches!(err, PropagationError::SolidAngleCorrectionIn3d));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let no_correction = || small_detector().with_solid_angle_correction(false);
    let mut polarized = Experiment::new(
        Box::new(source().with_polarization(Polarization::Vertical)),
        vec![Box::new(sphere_model("s", 50e-9, [0.0; 3])) as Box<dyn ParticleSampler>],
        Box::new(no_correction()),
    )
    .unwrap();
    assert!(matches!(
        polarized.propagate_3d(Some(8), None),
        Err(PropagationError::PolarizationIn3d(Polarization::Vertical))
    ));

    let spheroid = ParticleModel::new(
        "spheroid",
        ParticleKind::Spheroid {
            diameter: 50e-9,
            flattening: 2.0,
            material: protein(),
        },
    )
    .unwrap();
    let mut exp = experiment(vec![spheroid], no_correction());
    assert!(matches!(exp.propagate_3d(Some(8), None), Err(PropagationError::SpheroidIn3d)));
    assert!(exp.propagate().is_ok());
    assert!(matches!(
        exp.propagate_ndim(4, None, None),
        Err(PropagationError::InvalidDimensionality(4))
    ));

    assert!(matches!(
        Experiment::new(Box::new(source()), Vec::new(), Box::new(small_detector())),
        Err(PropagationError::NoParticleModels)
    ));
    assert!(matches!(
        ParticleShape::from_model_name("cone"),
        Err(PropagationError::InvalidModelName(_))
    ));
}

#[test]
fn test_three_dimensional_sphere() {
    let detector = small_detector().with_solid_angle_correction(false);
    let diameter = 60e-9;
    let mut exp = experiment(vec![sphere_model("s", diameter, [0.0; 3])], detector);
    let result = exp.propagate_3d(Some(9), None).unwrap();
    assert_eq!(result.data.fourier.shape(), &[9, 9, 9]);
    assert!(result.binned.is_none());

    let f0 = result.metadata.particles["particle_00"].f0;
    let omega = (100e-6f64 / 0.1).powi(2);
    let expected = f0 * PI / 6.0 * diameter.powi(3) * protein_dn_norm() * omega.sqrt();
    assert_relative_eq!(result.data.fourier[[4, 4, 4]].norm(), expected, max_relative = 1e-12);
    // Point symmetry of a centred sphere.
    assert_relative_eq!(
        result.data.intensity[[0, 2, 7]],
        result.data.intensity[[8, 6, 1]],
        max_relative = 1e-9
    );
    let qn_default = exp.propagate_3d(None, None).unwrap();
    assert_eq!(qn_default.data.fourier.shape(), &[64, 64, 64]);
}

// ─────────────────────────────────────────────────────────────
// Empty interaction volume
// ─────────────────────────────────────────────────────────────

/// Reports no particles for the first `misses` shots.
struct Intermittent {
    inner: ParticleModel,
    misses: usize,
}

impl ParticleSampler for Intermittent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn shape(&self) -> ParticleShape {
        self.inner.shape()
    }

    fn next_count(&mut self, rng: &mut StdRng) -> usize {
        if self.misses > 0 {
            self.misses -= 1;
            0
        } else {
            self.inner.next_count(rng)
        }
    }

    fn next_instance(&mut self, rng: &mut StdRng) -> ParticleInstance {
        self.inner.next_instance(rng)
    }
}

#[test]
fn test_empty_interaction_volume_is_retried() {
    let sampler = Intermittent {
        inner: sphere_model("s", 50e-9, [0.0; 3]),
        misses: 3,
    };
    let mut exp = Experiment::new(Box::new(source()), vec![Box::new(sampler) as Box<dyn ParticleSampler>], Box::new(small_detector())).unwrap();
    let result = exp.propagate().unwrap();
    assert_eq!(result.diagnostics.retries(), 3);
    assert_eq!(result.particle_count(), 1);
}

#[test]
fn test_poisson_arrivals_always_yield_particles() {
    let model = sphere_model("s", 50e-9, [0.0; 3]).with_number(0.5, Arrival::Random);
    let mut exp = experiment(vec![model], small_detector());
    let mut retries = 0;
    for _ in 0..12 {
        let result = exp.propagate().unwrap();
        assert!(result.particle_count() >= 1);
        retries += result.diagnostics.retries();
    }
    assert!(retries > 0);
}

#[test]
fn test_source_fluence_drives_amplitude() {
    let src = source();
    let fluence = src.intensity([0.0; 3], 1e-3);
    let mut exp = experiment(vec![sphere_model("s", 50e-9, [0.0; 3])], small_detector());
    let result = exp.propagate().unwrap();
    assert_relative_eq!(result.metadata.particles["particle_00"].fluence, fluence);
    // Outside the top-hat focus the particle is dark.
    let mut outside = experiment(vec![sphere_model("s", 50e-9, [20e-6, 0.0, 0.0])], small_detector());
    let dark = outside.propagate().unwrap();
    assert!(dark.data.intensity.iter().all(|&v| v == 0.0));
}
