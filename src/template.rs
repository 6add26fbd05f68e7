//! Routine templates - coach-authored days / blocks / exercises
//!
//! Templates are owned by the routine editor; this crate only reads their
//! shape. Field names follow the JSON documents the editor produces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overlay::Coordinate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("day {day}, block {block}, exercise {exercise} ({name}): series must be > 0")]
    ZeroSeries {
        day: usize,
        block: usize,
        exercise: usize,
        name: String,
    },
    #[error("day {day}, block {block}, exercise {exercise} ({name}): repetitions must be > 0")]
    ZeroRepetitions {
        day: usize,
        block: usize,
        exercise: usize,
        name: String,
    },
}

/// Single exercise prescription. No weight: that lives in the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "videoUrl", default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub series: u32,
    #[serde(rename = "repeticiones")]
    pub repetitions: u32,
    /// Rest between series, seconds
    #[serde(rename = "pausa", default)]
    pub rest_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "ejercicios", default)]
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Day {
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "bloques", default)]
    pub blocks: Vec<Block>,
}

/// Ordered days -> blocks -> exercises. The same shape applies to every week.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutineTemplate {
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "dias", default)]
    pub days: Vec<Day>,
}

impl RoutineTemplate {
    /// Exercise at a coordinate, or None when any index is out of bounds.
    /// The week field is ignored: every week shares the shape.
    pub fn resolve(&self, coordinate: &Coordinate) -> Option<&Exercise> {
        self.days
            .get(coordinate.day)?
            .blocks
            .get(coordinate.block)?
            .exercises
            .get(coordinate.exercise)
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.resolve(coordinate).is_some()
    }

    /// Check prescriptions are usable for volume math
    pub fn validate(&self) -> Result<(), TemplateError> {
        for (day, d) in self.days.iter().enumerate() {
            for (block, b) in d.blocks.iter().enumerate() {
                for (exercise, e) in b.exercises.iter().enumerate() {
                    if e.series == 0 {
                        return Err(TemplateError::ZeroSeries {
                            day,
                            block,
                            exercise,
                            name: e.name.clone(),
                        });
                    }
                    if e.repetitions == 0 {
                        return Err(TemplateError::ZeroRepetitions {
                            day,
                            block,
                            exercise,
                            name: e.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of exercise slots per week
    pub fn slot_count(&self) -> usize {
        self.days
            .iter()
            .flat_map(|d| &d.blocks)
            .map(|b| b.exercises.len())
            .sum()
    }
}
