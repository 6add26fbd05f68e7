//! Weight overlay - sparse per-week weights on top of a routine template
//!
//! Parts:
//! - Coordinate codec (positional keys)
//! - Sparse weight store with change tracking
//! - Volume calculation
//! - Week aggregation and template annotation

pub mod aggregator;
pub mod coordinate;
pub mod volume;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

pub use aggregator::{
    AnnotatedBlock, AnnotatedDay, AnnotatedExercise, AnnotatedTemplate, WeekWeights,
    annotate_template, flat_weights_for_week, orphaned_keys, weights_for_week,
};
pub use coordinate::{Coordinate, CoordinateError, CoordinateKey, decode, encode};
pub use volume::volume;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("invalid weight {0}: must be a finite number >= 0")]
    InvalidWeight(f64),
}

/// Recorded load in kilograms. Always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Weight(f64);

impl Weight {
    pub fn new(kg: f64) -> Result<Self, WeightError> {
        if kg.is_finite() && kg >= 0.0 {
            // normalise -0.0
            Ok(Self(kg + 0.0))
        } else {
            Err(WeightError::InvalidWeight(kg))
        }
    }

    pub fn kg(self) -> f64 {
        self.0
    }
}

/// Sparse map coordinate -> weight for one student.
///
/// Absent key means "not recorded yet", which is different from a
/// recorded 0 kg. The overlay does not check coordinates against any
/// template, so entries for a template shape that has since shrunk are
/// kept. Mutations are tracked per key until the owner persists them.
#[derive(Debug, Clone, Default)]
pub struct WeightOverlay {
    entries: BTreeMap<CoordinateKey, Weight>,
    changes: BTreeMap<Coordinate, Option<Weight>>,
}

impl WeightOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an overlay from persisted entries.
    ///
    /// Keys are kept verbatim, even undecodable ones. Values that are not
    /// valid weights are dropped so the overlay never holds NaN or
    /// negative numbers.
    pub fn from_stored<K, I>(stored: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in stored {
            let key = CoordinateKey::from_stored(key);
            match Weight::new(value) {
                Ok(weight) => {
                    entries.insert(key, weight);
                }
                Err(_) => warn!("Dropping stored weight {} for key {}", value, key),
            }
        }
        Self {
            entries,
            changes: BTreeMap::new(),
        }
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<Weight> {
        self.entries.get(&coordinate.key()).copied()
    }

    /// Record a weight, replacing any previous value
    pub fn set(&mut self, coordinate: Coordinate, kg: f64) -> Result<Weight, WeightError> {
        let weight = Weight::new(kg)?;
        self.entries.insert(coordinate.key(), weight);
        self.changes.insert(coordinate, Some(weight));
        Ok(weight)
    }

    /// Remove a weight. No-op on the stored state when absent.
    pub fn unset(&mut self, coordinate: Coordinate) {
        self.entries.remove(&coordinate.key());
        self.changes.insert(coordinate, None);
    }

    /// `None` unsets, a number sets. Returns the weight now stored.
    pub fn set_or_unset(
        &mut self,
        coordinate: Coordinate,
        kg: Option<f64>,
    ) -> Result<Option<Weight>, WeightError> {
        match kg {
            Some(kg) => self.set(coordinate, kg).map(Some),
            None => {
                self.unset(coordinate);
                Ok(None)
            }
        }
    }

    /// All entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&CoordinateKey, Weight)> {
        self.entries.iter().map(|(k, w)| (k, *w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when there are mutations not yet handed to storage
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Drain pending mutations: `Some` = upsert, `None` = delete
    pub fn take_changes(&mut self) -> Vec<(Coordinate, Option<Weight>)> {
        std::mem::take(&mut self.changes).into_iter().collect()
    }
}
