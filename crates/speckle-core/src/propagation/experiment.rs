use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array4, ArrayD, ArrayViewD, Ix3, IxDyn};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use speckle_compute::{ComputeBackend, CpuBackend};
use speckle_materials::MaterialProvider;

use super::{
    DensityRecord, DetectorData, EngineOptions, ParticleRecord, PropagationError, PropagationResult,
    ShotMetadata,
};
use crate::cache::{CacheOutcome, QmapCache, QmapCacheEntry, QmapKey, SharedQmapCache};
use crate::detector::DetectorModel;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::kernels::atoms::{check_version, validate_response, AtomisticSimulator, AtomsGeometry, AtomsRequest};
use crate::kernels::map::{map_amplitude, sample_density_map};
use crate::kernels::sphere::sphere_amplitude;
use crate::kernels::spheroid::spheroid_amplitude;
use crate::kernels::{apply_phase_shift, is_off_centre, primary_amplitude, SolidAngle};
use crate::particle::ParticleSampler;
use crate::qmap::{field_shape, resolution_element_r_3d};
use crate::rotation::Rotation;
use crate::source::SourceModel;
use crate::types::{
    AxisOrder, DetectorState, Dimensionality, ParticleInstance, ParticleKind, ParticleShape, Polarization,
    SourceState,
};

/// Unrotated xyz coordinate field of a shot.
enum Qmap0 {
    Detector(Arc<QmapCacheEntry>),
    Volume(Array4<f64>),
}

impl Qmap0 {
    fn view(&self) -> ArrayViewD<'_, f64> {
        match self {
            Qmap0::Detector(entry) => entry.qmap.view().into_dyn(),
            Qmap0::Volume(q) => q.view().into_dyn(),
        }
    }
}

/// Geometry shared by all particles of one shot.
struct Shot {
    dim: Dimensionality,
    source: SourceState,
    detector: DetectorState,
    qn: usize,
    qmax: f64,
    omega: SolidAngle,
    qmap0: Qmap0,
}

/// Output of one particle kernel.
struct ParticleField {
    amplitude: ArrayD<Complex64>,
    qmap: Option<ArrayD<f64>>,
    map: Option<DensityRecord>,
    dx: Option<f64>,
}

/// A configured experiment: one source, one detector and one or more
/// particle models.
///
/// Each call to [`Experiment::propagate`] or [`Experiment::propagate_3d`]
/// simulates one shot. Shots share the qmap cache and the random number
/// generator, so a seeded experiment replays the same sequence of shots.
pub struct Experiment {
    source: Box<dyn SourceModel>,
    particles: Vec<Box<dyn ParticleSampler>>,
    detector: Box<dyn DetectorModel>,
    backend: Arc<dyn ComputeBackend>,
    atoms_simulator: Option<Box<dyn AtomisticSimulator>>,
    /// Rotated fields of map and atoms particles.
    cache: SharedQmapCache,
    /// The unrotated xyz field, kept apart so it never evicts `cache`.
    unrotated: QmapCache,
    rng: StdRng,
    options: EngineOptions,
}

impl Experiment {
    pub fn new(
        source: Box<dyn SourceModel>,
        particles: Vec<Box<dyn ParticleSampler>>,
        detector: Box<dyn DetectorModel>,
    ) -> Result<Self, PropagationError> {
        if particles.is_empty() {
            return Err(PropagationError::NoParticleModels);
        }
        Ok(Self {
            source,
            particles,
            detector,
            backend: Arc::new(CpuBackend::new()),
            atoms_simulator: None,
            cache: SharedQmapCache::new(),
            unrotated: QmapCache::new(),
            rng: StdRng::from_entropy(),
            options: EngineOptions::default(),
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_atomistic_simulator(mut self, simulator: Box<dyn AtomisticSimulator>) -> Self {
        self.atoms_simulator = Some(simulator);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a qmap cache with other experiments of the same geometry.
    pub fn with_shared_cache(mut self, cache: SharedQmapCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &SharedQmapCache {
        &self.cache
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Simulate one shot onto the detector plane.
    pub fn propagate(&mut self) -> Result<PropagationResult, PropagationError> {
        self.run(Dimensionality::Two, None, None)
    }

    /// Simulate one shot into a cubic reciprocal volume of `qn` samples per
    /// axis spanning `±qmax`. `qn` defaults to the larger detector side and
    /// `qmax` to the largest |q| at the detector edge.
    pub fn propagate_3d(&mut self, qn: Option<usize>, qmax: Option<f64>) -> Result<PropagationResult, PropagationError> {
        self.run(Dimensionality::Three, qn, qmax)
    }

    /// Dispatch on a numeric dimensionality, `2` or `3`.
    pub fn propagate_ndim(
        &mut self,
        ndim: usize,
        qn: Option<usize>,
        qmax: Option<f64>,
    ) -> Result<PropagationResult, PropagationError> {
        let dim = Dimensionality::from_ndim(ndim)?;
        self.run(dim, qn, qmax)
    }

    fn check_configuration(
        &self,
        dim: Dimensionality,
        source: &SourceState,
        detector: &DetectorState,
    ) -> Result<(), PropagationError> {
        if !(source.wavelength.is_finite() && source.wavelength > 0.0) {
            return Err(PropagationError::InvalidParameter(format!(
                "wavelength must be positive, got {}",
                source.wavelength
            )));
        }
        detector.validate()?;
        if dim == Dimensionality::Three {
            if detector.solid_angle_correction {
                return Err(PropagationError::SolidAngleCorrectionIn3d);
            }
            if source.polarization != Polarization::Ignore {
                return Err(PropagationError::PolarizationIn3d(source.polarization));
            }
            if self.particles.iter().any(|p| p.shape() == ParticleShape::Spheroid) {
                return Err(PropagationError::SpheroidIn3d);
            }
        }
        if self.particles.iter().any(|p| p.shape() == ParticleShape::Atoms) {
            let simulator = self
                .atoms_simulator
                .as_deref()
                .ok_or(PropagationError::AtomisticSimulatorMissing)?;
            check_version(simulator)?;
        }
        Ok(())
    }

    /// Draw particles until at least one is in the interaction volume.
    ///
    /// There is no upper bound on the number of attempts: a particle model
    /// that can never produce a particle keeps this loop running.
    fn sample_particles(&mut self, diagnostics: &mut Diagnostics) -> Vec<(String, ParticleInstance)> {
        let mut attempt = 0u64;
        loop {
            let counts: Vec<usize> = self
                .particles
                .iter_mut()
                .map(|p| p.next_count(&mut self.rng))
                .collect();
            let total: usize = counts.iter().sum();
            if total == 0 {
                attempt += 1;
                diagnostics.record(DiagnosticEvent::Retry { attempt });
                continue;
            }
            let mut instances = Vec::with_capacity(total);
            for (model, count) in self.particles.iter_mut().zip(counts) {
                for _ in 0..count {
                    let name = format!("particle_{:02}", instances.len());
                    instances.push((name, model.next_instance(&mut self.rng)));
                }
            }
            diagnostics.record(DiagnosticEvent::ParticlesSampled { count: total });
            return instances;
        }
    }

    fn record_cache(diagnostics: &mut Diagnostics, entry: &QmapCacheEntry, outcome: CacheOutcome) {
        let generation = entry.generation;
        diagnostics.record(match outcome {
            CacheOutcome::Computed => DiagnosticEvent::QmapComputed { generation },
            CacheOutcome::Reused => DiagnosticEvent::QmapReused { generation },
        });
    }

    /// Cached detector coordinate field for a rotation and axis order.
    fn detector_qmap(
        &self,
        detector: &DetectorState,
        wavelength: f64,
        rotation: Option<&Rotation>,
        order: AxisOrder,
        diagnostics: &mut Diagnostics,
    ) -> Result<Arc<QmapCacheEntry>, PropagationError> {
        let key = QmapKey::new(detector, wavelength, rotation.copied(), order);
        let (entry, outcome) = self.cache.get_or_compute(key, |k| {
            Ok::<_, PropagationError>(detector.generate_qmap(k.wavelength, k.rotation.as_ref(), k.order))
        })?;
        Self::record_cache(diagnostics, &entry, outcome);
        Ok(entry)
    }

    /// Unrotated xyz field of the detector, memoised per experiment.
    fn unrotated_qmap(
        &mut self,
        detector: &DetectorState,
        wavelength: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<Arc<QmapCacheEntry>, PropagationError> {
        let key = QmapKey::new(detector, wavelength, None, AxisOrder::Xyz);
        let (entry, outcome) = self.unrotated.get_or_compute(key, |k| {
            Ok::<_, PropagationError>(detector.generate_qmap(k.wavelength, None, k.order))
        })?;
        Self::record_cache(diagnostics, &entry, outcome);
        Ok(entry)
    }

    fn run(
        &mut self,
        dim: Dimensionality,
        qn: Option<usize>,
        qmax: Option<f64>,
    ) -> Result<PropagationResult, PropagationError> {
        let mut diagnostics = Diagnostics::new();
        let source = self.source.next_state(&mut self.rng);
        let detector = self.detector.next_state(&mut self.rng);
        self.check_configuration(dim, &source, &detector)?;

        let wavelength = source.wavelength;
        let qn = qn.unwrap_or(detector.nx.max(detector.ny));
        let qmax = qmax.unwrap_or_else(|| detector.q_max_edge(wavelength));
        if dim == Dimensionality::Three && (qn == 0 || !(qmax.is_finite() && qmax > 0.0)) {
            return Err(PropagationError::InvalidParameter(format!(
                "3-D volume needs qn > 0 and qmax > 0, got qn = {qn}, qmax = {qmax}"
            )));
        }

        let instances = self.sample_particles(&mut diagnostics);

        let (omega, qmap0) = match dim {
            Dimensionality::Two => {
                let omega = if detector.solid_angle_correction {
                    SolidAngle::per_pixel(&detector.pixel_solid_angles())
                } else {
                    SolidAngle::Uniform(detector.uniform_solid_angle())
                };
                let entry = self.unrotated_qmap(&detector, wavelength, &mut diagnostics)?;
                (omega, Qmap0::Detector(entry))
            }
            Dimensionality::Three => (
                SolidAngle::Uniform(detector.uniform_solid_angle()),
                Qmap0::Volume(detector.generate_qmap_3d(qn, qmax, None, AxisOrder::Xyz)),
            ),
        };
        let shot = Shot {
            dim,
            source,
            detector,
            qn,
            qmax,
            omega,
            qmap0,
        };

        let mut total = ArrayD::<Complex64>::zeros(IxDyn(&field_shape(&shot.qmap0.view())));
        let mut particles = BTreeMap::new();
        let mut qmaps = BTreeMap::new();
        let mut maps3d = BTreeMap::new();
        for (name, instance) in instances {
            let fluence = self.source.intensity(instance.position, source.pulse_energy);
            let f0 = primary_amplitude(fluence, wavelength);
            let mut field = diagnostics.time(&format!("{name} amplitude"), |d| {
                self.particle_field(&shot, &name, &instance, fluence, f0, d)
            })?;
            if is_off_centre(&instance.position) {
                apply_phase_shift(&mut field.amplitude, instance.position, &shot.qmap0.view())?;
            }
            if field.amplitude.shape() != total.shape() {
                return Err(PropagationError::InvalidParameter(format!(
                    "{name}: amplitude shape {:?} does not match {:?}",
                    field.amplitude.shape(),
                    total.shape()
                )));
            }
            total += &field.amplitude;

            if let Some(q) = field.qmap {
                qmaps.insert(name.clone(), q);
            }
            if let Some(m) = field.map {
                maps3d.insert(name.clone(), m);
            }
            particles.insert(
                name,
                ParticleRecord {
                    instance,
                    fluence,
                    f0,
                    dx: field.dx,
                },
            );
        }

        if dim == Dimensionality::Two && source.polarization != Polarization::Ignore {
            let p = detector.polarization_factors(source.polarization);
            for (f, p) in total.iter_mut().zip(p.iter()) {
                *f *= p.sqrt();
            }
        }

        let expected = total.mapv(|f| f.norm_sqr());
        let (counts, mask) = self.detector.detect_photons(&expected, &mut self.rng);
        let full_period_resolution = 2.0 * detector.max_resolution(wavelength);

        let binned = if dim == Dimensionality::Two {
            match (
                self.detector.bin_photons(&counts, &mask)?,
                self.detector.bin_fourier(&total, &mask)?,
            ) {
                (Some((b_counts, b_mask)), Some((b_fourier, _))) => Some(DetectorData {
                    fourier: b_fourier.into_dyn(),
                    intensity: b_counts.into_dyn(),
                    mask: b_mask.into_dyn(),
                    full_period_resolution,
                }),
                _ => None,
            }
        } else {
            None
        };

        Ok(PropagationResult {
            metadata: ShotMetadata {
                source,
                particles,
                detector,
            },
            data: DetectorData {
                fourier: total,
                intensity: counts,
                mask,
                full_period_resolution,
            },
            binned,
            qmaps,
            maps3d,
            diagnostics,
        })
    }

    fn particle_field(
        &mut self,
        shot: &Shot,
        name: &str,
        instance: &ParticleInstance,
        fluence: f64,
        f0: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<ParticleField, PropagationError> {
        let wavelength = shot.source.wavelength;
        let rotation = instance.rotation.as_ref();
        let save_qmap = self.options.save_qmap;
        let unrotated = |field: ArrayD<Complex64>| ParticleField {
            amplitude: field,
            qmap: save_qmap.then(|| shot.qmap0.view().to_owned()),
            map: None,
            dx: None,
        };

        match &instance.kind {
            ParticleKind::Sphere { diameter, material } => {
                let dn = material.refractive_index_decrement(wavelength)?;
                let field = sphere_amplitude(&shot.qmap0.view(), *diameter, f0, dn, &shot.omega)?;
                Ok(unrotated(field))
            }
            ParticleKind::Spheroid {
                diameter,
                flattening,
                material,
            } => {
                if shot.dim == Dimensionality::Three {
                    return Err(PropagationError::SpheroidIn3d);
                }
                let dn = material.refractive_index_decrement(wavelength)?;
                let field = spheroid_amplitude(
                    &shot.qmap0.view(),
                    *diameter,
                    *flattening,
                    rotation,
                    f0,
                    dn,
                    &shot.omega,
                )?;
                Ok(unrotated(field))
            }
            ParticleKind::Map { geometry } => {
                let dx_required = match shot.dim {
                    Dimensionality::Two => shot.detector.resolution_element_r(wavelength),
                    Dimensionality::Three => resolution_element_r_3d(shot.qmax),
                };
                let map = sample_density_map(
                    geometry,
                    wavelength,
                    dx_required,
                    self.options.max_map_voxels_per_axis,
                )?;
                let (nz, ny, nx) = map.density.dim();
                diagnostics.record(DiagnosticEvent::MapSampled {
                    particle: name.to_string(),
                    dx_required,
                    dx: map.dx,
                    shape: [nz, ny, nx],
                });

                let qmap = match shot.dim {
                    Dimensionality::Two => {
                        let entry = self.detector_qmap(
                            &shot.detector,
                            wavelength,
                            rotation,
                            AxisOrder::Zyx,
                            diagnostics,
                        )?;
                        Qmap0::Detector(entry)
                    }
                    Dimensionality::Three => Qmap0::Volume(shot.detector.generate_qmap_3d(
                        shot.qn,
                        shot.qmax,
                        rotation,
                        AxisOrder::Zyx,
                    )),
                };
                let out = map_amplitude(self.backend.as_ref(), &map, &qmap.view(), f0, &shot.omega)?;
                let particle = name.to_string();
                if out.invalid > 0 {
                    diagnostics.record(DiagnosticEvent::InvalidScatteringVectors {
                        particle: particle.clone(),
                        count: out.invalid,
                    });
                }
                if out.non_finite_density > 0 {
                    diagnostics.record(DiagnosticEvent::NonFiniteDensity {
                        particle: particle.clone(),
                        count: out.non_finite_density,
                    });
                }
                if out.non_finite_vectors > 0 {
                    diagnostics.record(DiagnosticEvent::NonFiniteScatteringVectors {
                        particle,
                        count: out.non_finite_vectors,
                    });
                }
                Ok(ParticleField {
                    amplitude: out.amplitude,
                    qmap: save_qmap.then(|| qmap.view().to_owned()),
                    map: self.options.save_map3d.then(|| DensityRecord {
                        density: (*map.density).clone(),
                        dx: map.dx,
                    }),
                    dx: Some(map.dx),
                })
            }
            ParticleKind::Atoms {
                structure,
                form_factors,
            } => {
                let geometry = match shot.dim {
                    Dimensionality::Two => AtomsGeometry::Detector,
                    Dimensionality::Three => AtomsGeometry::Volume {
                        qn: shot.qn,
                        qmax: shot.qmax,
                    },
                };
                let request = AtomsRequest {
                    wavelength,
                    fluence,
                    polarization: shot.source.polarization,
                    atomic_numbers: structure.atomic_numbers.clone(),
                    positions: structure.positions.clone(),
                    form_factors: form_factors.clone(),
                    rotation: instance.rotation,
                    detector: shot.detector,
                    geometry,
                };
                let simulator = self
                    .atoms_simulator
                    .as_deref_mut()
                    .ok_or(PropagationError::AtomisticSimulatorMissing)?;
                check_version(&*simulator)?;
                let response = simulator.simulate(&request)?;
                validate_response(&request, &response)?;

                let qmap = if shot.dim == Dimensionality::Two {
                    let key = QmapKey::new(&shot.detector, wavelength, instance.rotation, response.axis_order);
                    let qmap3 = response.qmap.into_dimensionality::<Ix3>()?;
                    let entry = self.cache.register(key, qmap3);
                    diagnostics.record(DiagnosticEvent::QmapRegistered {
                        generation: entry.generation,
                    });
                    save_qmap.then(|| entry.qmap.view().into_dyn().to_owned())
                } else {
                    save_qmap.then_some(response.qmap)
                };
                Ok(ParticleField {
                    amplitude: response.amplitude,
                    qmap,
                    map: None,
                    dx: None,
                })
            }
        }
    }
}
