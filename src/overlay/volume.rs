//! Training volume: series x repetitions x weight

use super::Weight;

/// Volume for one exercise slot. Unrecorded weight counts as zero load.
pub fn volume(series: u32, repetitions: u32, weight: Option<Weight>) -> f64 {
    match weight {
        Some(w) => (u64::from(series) * u64::from(repetitions)) as f64 * w.kg(),
        None => 0.0,
    }
}
