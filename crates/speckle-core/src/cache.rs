//! Single-slot memoisation of detector coordinate fields.
//!
//! Computing the per-pixel scattering vectors of a large detector is costly
//! and, for a fixed geometry, identical from shot to shot. [`QmapCache`] keeps
//! the most recent field together with the [`QmapKey`] it was computed for;
//! any change of key replaces the entry wholesale. Entries are handed out as
//! `Arc`s, so a reader holding an entry never observes a later replacement.

use std::sync::{Arc, RwLock};

use ndarray::Array3;

use crate::propagation::PropagationError;
use crate::rotation::{rotations_similar, Rotation};
use crate::types::{AxisOrder, DetectorState};

/// Everything that determines a detector coordinate field.
#[derive(Debug, Clone, PartialEq)]
pub struct QmapKey {
    pub nx: usize,
    pub ny: usize,
    pub cx: f64,
    pub cy: f64,
    pub pixel_size: f64,
    pub distance: f64,
    pub wavelength: f64,
    pub rotation: Option<Rotation>,
    pub order: AxisOrder,
}

impl QmapKey {
    pub fn new(
        detector: &DetectorState,
        wavelength: f64,
        rotation: Option<Rotation>,
        order: AxisOrder,
    ) -> Self {
        Self {
            nx: detector.nx,
            ny: detector.ny,
            cx: detector.cx,
            cy: detector.cy,
            pixel_size: detector.pixel_size,
            distance: detector.distance,
            wavelength,
            rotation,
            order,
        }
    }

    /// Exact equality of every scalar, similarity of the rotation.
    pub fn matches(&self, other: &QmapKey) -> bool {
        self.nx == other.nx
            && self.ny == other.ny
            && self.cx == other.cx
            && self.cy == other.cy
            && self.pixel_size == other.pixel_size
            && self.distance == other.distance
            && self.wavelength == other.wavelength
            && self.order == other.order
            && rotations_similar(self.rotation.as_ref(), other.rotation.as_ref())
    }
}

/// A fully built coordinate field and the key it is valid for.
#[derive(Debug)]
pub struct QmapCacheEntry {
    pub key: QmapKey,
    pub qmap: Arc<Array3<f64>>,
    /// Increments every time the slot is replaced.
    pub generation: u64,
}

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Computed,
    Reused,
}

#[derive(Debug, Default)]
pub struct QmapCache {
    entry: Option<Arc<QmapCacheEntry>>,
    generation: u64,
}

impl QmapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached field if `key` matches, otherwise compute and store it.
    pub fn get_or_compute<E, F>(
        &mut self,
        key: QmapKey,
        compute: F,
    ) -> Result<(Arc<QmapCacheEntry>, CacheOutcome), E>
    where
        F: FnOnce(&QmapKey) -> Result<Array3<f64>, E>,
    {
        if let Some(entry) = self.lookup(&key) {
            return Ok((entry, CacheOutcome::Reused));
        }
        let qmap = compute(&key)?;
        Ok((self.register(key, qmap), CacheOutcome::Computed))
    }

    /// Read the current entry without computing anything.
    pub fn peek(&self) -> Result<Arc<QmapCacheEntry>, PropagationError> {
        self.entry.clone().ok_or(PropagationError::EmptyCache)
    }

    /// Replace the slot with an externally produced field.
    pub fn register(&mut self, key: QmapKey, qmap: Array3<f64>) -> Arc<QmapCacheEntry> {
        self.generation += 1;
        let entry = Arc::new(QmapCacheEntry {
            key,
            qmap: Arc::new(qmap),
            generation: self.generation,
        });
        self.entry = Some(Arc::clone(&entry));
        entry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn lookup(&self, key: &QmapKey) -> Option<Arc<QmapCacheEntry>> {
        self.entry
            .as_ref()
            .filter(|entry| entry.key.matches(key))
            .cloned()
    }
}

/// A [`QmapCache`] shared between engines, for example one per worker thread.
///
/// Computation happens outside the lock; only the swap-in of a finished
/// entry takes the write lock.
#[derive(Debug, Clone, Default)]
pub struct SharedQmapCache {
    inner: Arc<RwLock<QmapCache>>,
}

impl SharedQmapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<E, F>(
        &self,
        key: QmapKey,
        compute: F,
    ) -> Result<(Arc<QmapCacheEntry>, CacheOutcome), E>
    where
        F: FnOnce(&QmapKey) -> Result<Array3<f64>, E>,
    {
        {
            let cache = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.lookup(&key) {
                return Ok((entry, CacheOutcome::Reused));
            }
        }
        let qmap = compute(&key)?;
        Ok((self.register(key, qmap), CacheOutcome::Computed))
    }

    pub fn peek(&self) -> Result<Arc<QmapCacheEntry>, PropagationError> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).peek()
    }

    pub fn register(&self, key: QmapKey, qmap: Array3<f64>) -> Arc<QmapCacheEntry> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(key, qmap)
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).generation()
    }
}
