//! Progress history - what was actually lifted, day by day
//!
//! History is keyed by exercise *name*, not by template position, so it
//! stays readable after the routine is edited or replaced. It is never
//! reconciled with the weight overlay.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Name-based exercise identity used by the history log
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExerciseName(String);

impl ExerciseName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExerciseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One exercise as performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySet {
    #[serde(rename = "ejercicioId")]
    pub exercise: ExerciseName,
    #[serde(rename = "pesoActual")]
    pub weight: f64,
    #[serde(rename = "repsActual")]
    pub reps: u32,
    #[serde(rename = "volumenActual")]
    pub volume: f64,
}

/// A completed workout: one calendar day of one training week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "observaciones", default)]
    pub observations: String,
    #[serde(rename = "ejercicios", default)]
    pub sets: Vec<HistorySet>,
}

/// Single data point of one exercise's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "peso")]
    pub weight: f64,
    #[serde(rename = "reps")]
    pub reps: u32,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

/// Trend lines read oldest-first, timelines read latest-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

pub type GroupedHistory = BTreeMap<ExerciseName, Vec<HistoryPoint>>;

/// Group every logged set by exercise name, ordered by (week, date)
pub fn entries_grouped_by_exercise(history: &[HistoryEntry], order: SortOrder) -> GroupedHistory {
    let mut grouped = GroupedHistory::new();

    for entry in history {
        for set in &entry.sets {
            grouped.entry(set.exercise.clone()).or_default().push(HistoryPoint {
                week: entry.week,
                date: entry.date,
                weight: set.weight,
                reps: set.reps,
                volume: set.volume,
            });
        }
    }

    for points in grouped.values_mut() {
        points.sort_by_key(|p| (p.week, p.date));
        if order == SortOrder::Descending {
            points.reverse();
        }
    }

    grouped
}

/// Deltas are reported in hundredths of a kilogram
const DELTA_STEP: f64 = 100.0;

fn round_delta(kg: f64) -> f64 {
    // also folds -0.0 into 0.0
    (kg * DELTA_STEP).round() / DELTA_STEP + 0.0
}

/// History point with its change against the previous week
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    #[serde(flatten)]
    pub point: HistoryPoint,
    /// kg vs the latest point of an earlier week
    #[serde(rename = "deltaPeso")]
    pub weight_delta: Option<f64>,
    #[serde(rename = "mejorVolumen")]
    pub best_volume: f64,
}

/// Week-over-week weight deltas and running best volume, oldest first
pub fn trend(points: &[HistoryPoint]) -> Vec<TrendPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| (p.week, p.date));

    let mut result: Vec<TrendPoint> = Vec::with_capacity(sorted.len());
    let mut best_volume = 0.0_f64;

    for (i, point) in sorted.iter().enumerate() {
        let previous_week = sorted[..i].iter().rev().find(|p| p.week < point.week);
        best_volume = best_volume.max(point.volume);
        result.push(TrendPoint {
            point: point.clone(),
            weight_delta: previous_week.map(|p| round_delta(point.weight - p.weight)),
            best_volume,
        });
    }

    result
}

/// Format a weight delta for display, e.g. "+2.5 kg"
pub fn format_delta(delta: Option<f64>) -> String {
    match delta.map(round_delta) {
        None => "-".to_string(),
        Some(d) if d == 0.0 => "= kg".to_string(),
        Some(d) if d > 0.0 => format!("+{} kg", d),
        Some(d) => format!("{} kg", d),
    }
}

/// Sum of logged volume for one exercise
pub fn total_volume(history: &[HistoryEntry], exercise: &ExerciseName) -> f64 {
    history
        .iter()
        .flat_map(|e| &e.sets)
        .filter(|s| &s.exercise == exercise)
        .map(|s| s.volume)
        .sum()
}
