//! Structured per-shot diagnostics.
//!
//! The engine never decides anything based on diagnostics; they are a record
//! of what happened during a shot (retries, cache traffic, numerical
//! warnings, timings) returned with the result. Every event is also
//! forwarded to the `log` facade at a level matching its severity.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// No particle was in the interaction volume; particles were resampled.
    Retry { attempt: u64 },
    ParticlesSampled { count: usize },
    QmapComputed { generation: u64 },
    QmapReused { generation: u64 },
    /// A coordinate field produced by the atomistic simulator replaced the cache.
    QmapRegistered { generation: u64 },
    MapSampled {
        particle: String,
        dx_required: f64,
        dx: f64,
        shape: [usize; 3],
    },
    /// Scaled scattering vectors outside `[-0.5, 0.5)`; outputs set to NaN.
    InvalidScatteringVectors { particle: String, count: usize },
    NonFiniteDensity { particle: String, count: usize },
    NonFiniteScatteringVectors { particle: String, count: usize },
    StageTiming { stage: String, seconds: f64 },
}

impl DiagnosticEvent {
    fn log(&self) {
        match self {
            DiagnosticEvent::Retry { attempt } => {
                log::info!("miss: no particles in the interaction volume, shooting again (attempt {attempt})")
            }
            DiagnosticEvent::ParticlesSampled { count } => log::debug!("{count} particles"),
            DiagnosticEvent::QmapComputed { generation } => {
                log::debug!("qmap recomputed (generation {generation})")
            }
            DiagnosticEvent::QmapReused { generation } => {
                log::debug!("qmap read from cache (generation {generation})")
            }
            DiagnosticEvent::QmapRegistered { generation } => {
                log::debug!("qmap registered from atomistic simulator (generation {generation})")
            }
            DiagnosticEvent::MapSampled {
                particle,
                dx_required,
                dx,
                shape,
            } => log::debug!(
                "{particle}: sampled map {shape:?}, dx_required = {dx_required:e} m, dx = {dx:e} m"
            ),
            DiagnosticEvent::InvalidScatteringVectors { particle, count } => {
                log::warn!("{particle}: {count} invalid pixel positions")
            }
            DiagnosticEvent::NonFiniteDensity { particle, count } => {
                log::warn!("{particle}: {count} non-finite values in the density map")
            }
            DiagnosticEvent::NonFiniteScatteringVectors { particle, count } => {
                log::warn!("{particle}: {count} non-finite scattering vectors")
            }
            DiagnosticEvent::StageTiming { stage, seconds } => {
                log::debug!("{stage} took {seconds:.3} s")
            }
        }
    }
}

/// Ordered event stream of one shot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    events: Vec<DiagnosticEvent>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: DiagnosticEvent) {
        event.log();
        self.events.push(event);
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn retries(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::Retry { .. }))
            .count()
    }

    pub fn has_warnings(&self) -> bool {
        self.events.iter().any(|e| {
            matches!(
                e,
                DiagnosticEvent::InvalidScatteringVectors { .. }
                    | DiagnosticEvent::NonFiniteDensity { .. }
                    | DiagnosticEvent::NonFiniteScatteringVectors { .. }
            )
        })
    }

    /// Run `f` and record its wall time as a [`DiagnosticEvent::StageTiming`].
    pub fn time<T>(&mut self, stage: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = Instant::now();
        let out = f(self);
        self.record(DiagnosticEvent::StageTiming {
            stage: stage.to_string(),
            seconds: start.elapsed().as_secs_f64(),
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_serialisation() {
        let mut d = Diagnostics::new();
        d.record(DiagnosticEvent::Retry { attempt: 1 });
        d.record(DiagnosticEvent::Retry { attempt: 2 });
        d.record(DiagnosticEvent::ParticlesSampled { count: 3 });
        assert_eq!(d.retries(), 2);
        assert!(!d.has_warnings());

        let v = d.time("detect", |d| {
            d.record(DiagnosticEvent::NonFiniteDensity {
                particle: "p".into(),
                count: 1,
            });
            42
        });
        assert_eq!(v, 42);
        assert!(d.has_warnings());
        assert!(matches!(d.events().last(), Some(DiagnosticEvent::StageTiming { .. })));

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["events"][0]["event"], "retry");
        assert_eq!(json["events"][0]["attempt"], 1);
    }
}
