//! Week views over the overlay
//!
//! Student and coach screens both read through `annotate_template`, so
//! volume figures come from one place.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::{CoordinateKey, WeightOverlay, volume};
use crate::template::{Exercise, RoutineTemplate};

/// day -> block -> exercise -> kg
pub type WeekWeights = BTreeMap<usize, BTreeMap<usize, BTreeMap<usize, f64>>>;

/// Template leaf with its recorded weight for the week
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedExercise {
    #[serde(flatten)]
    pub exercise: Exercise,
    #[serde(rename = "peso")]
    pub weight: Option<f64>,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedBlock {
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "ejercicios")]
    pub exercises: Vec<AnnotatedExercise>,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedDay {
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "bloques")]
    pub blocks: Vec<AnnotatedBlock>,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTemplate {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "dias")]
    pub days: Vec<AnnotatedDay>,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

impl AnnotatedTemplate {
    /// Leaf at (day, block, exercise), if the template has it
    pub fn exercise(&self, day: usize, block: usize, exercise: usize) -> Option<&AnnotatedExercise> {
        self.days
            .get(day)?
            .blocks
            .get(block)?
            .exercises
            .get(exercise)
    }
}

/// Recorded weights of one week, nested by day / block / exercise.
///
/// Keys that do not decode are skipped. When a template is given, entries
/// pointing outside it are skipped as orphans.
pub fn weights_for_week(
    overlay: &WeightOverlay,
    week: u32,
    template: Option<&RoutineTemplate>,
) -> WeekWeights {
    let mut nested = WeekWeights::new();
    for (key, weight) in week_entries(overlay, week, template) {
        let Ok(c) = key.decode() else { continue };
        nested
            .entry(c.day)
            .or_default()
            .entry(c.block)
            .or_default()
            .insert(c.exercise, weight);
    }
    nested
}

/// Flat form of `weights_for_week`: key -> kg
pub fn flat_weights_for_week(
    overlay: &WeightOverlay,
    week: u32,
    template: Option<&RoutineTemplate>,
) -> BTreeMap<CoordinateKey, f64> {
    week_entries(overlay, week, template)
        .map(|(key, weight)| (key.clone(), weight))
        .collect()
}

fn week_entries<'a>(
    overlay: &'a WeightOverlay,
    week: u32,
    template: Option<&'a RoutineTemplate>,
) -> impl Iterator<Item = (&'a CoordinateKey, f64)> + 'a {
    overlay.entries().filter_map(move |(key, weight)| {
        let c = match key.decode() {
            Ok(c) => c,
            Err(e) => {
                debug!("Skipping undecodable overlay key: {}", e);
                return None;
            }
        };
        if c.week != week {
            return None;
        }
        if let Some(t) = template
            && !t.contains(&c)
        {
            debug!("Skipping orphaned overlay entry {}", key);
            return None;
        }
        Some((key, weight.kg()))
    })
}

/// Walk the template in authored order and attach week weights and volumes.
/// Overlay entries that do not match a template slot never show up here.
pub fn annotate_template(
    template: &RoutineTemplate,
    overlay: &WeightOverlay,
    week: u32,
) -> AnnotatedTemplate {
    let days: Vec<AnnotatedDay> = template
        .days
        .iter()
        .enumerate()
        .map(|(day_idx, day)| {
            let blocks: Vec<AnnotatedBlock> = day
                .blocks
                .iter()
                .enumerate()
                .map(|(block_idx, block)| {
                    let exercises: Vec<AnnotatedExercise> = block
                        .exercises
                        .iter()
                        .enumerate()
                        .map(|(ex_idx, exercise)| {
                            let coordinate = super::Coordinate {
                                week,
                                day: day_idx,
                                block: block_idx,
                                exercise: ex_idx,
                            };
                            let weight = overlay.get(&coordinate);
                            AnnotatedExercise {
                                exercise: exercise.clone(),
                                weight: weight.map(|w| w.kg()),
                                volume: volume(exercise.series, exercise.repetitions, weight),
                            }
                        })
                        .collect();
                    AnnotatedBlock {
                        name: block.name.clone(),
                        volume: exercises.iter().map(|e| e.volume).sum(),
                        exercises,
                    }
                })
                .collect();
            AnnotatedDay {
                name: day.name.clone(),
                volume: blocks.iter().map(|b| b.volume).sum(),
                blocks,
            }
        })
        .collect();

    AnnotatedTemplate {
        week,
        name: template.name.clone(),
        volume: days.iter().map(|d| d.volume).sum(),
        days,
    }
}

/// Overlay keys that no longer resolve against the template, or never
/// decoded at all. Reporting only; nothing is removed.
pub fn orphaned_keys(template: &RoutineTemplate, overlay: &WeightOverlay) -> Vec<CoordinateKey> {
    overlay
        .entries()
        .filter(|(key, _)| match key.decode() {
            Ok(c) => !template.contains(&c),
            Err(_) => true,
        })
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Coordinate;
    use crate::template::{Block, Day};

    fn create_exercise(name: &str, series: u32, repetitions: u32) -> Exercise {
        Exercise {
            name: name.to_string(),
            video_url: None,
            series,
            repetitions,
            rest_seconds: 60,
        }
    }

    /// 1 day, 1 block, (4x8) and (3x10)
    fn create_small_template() -> RoutineTemplate {
        RoutineTemplate {
            name: None,
            days: vec![Day {
                name: Some("A".to_string()),
                blocks: vec![Block {
                    name: None,
                    exercises: vec![
                        create_exercise("Sentadilla", 4, 8),
                        create_exercise("Remo", 3, 10),
                    ],
                }],
            }],
        }
    }

    fn coord(week: i64, day: i64, block: i64, exercise: i64) -> Coordinate {
        Coordinate::new(week, day, block, exercise).unwrap()
    }

    #[test]
    fn test_weights_for_week_filters_by_week() {
        let mut overlay = WeightOverlay::new();
        overlay.set(coord(1, 0, 0, 0), 40.0).unwrap();
        overlay.set(coord(2, 0, 0, 0), 45.0).unwrap();
        overlay.set(coord(2, 1, 2, 3), 12.5).unwrap();
        overlay.set(coord(3, 0, 0, 0), 50.0).unwrap();

        let week2 = weights_for_week(&overlay, 2, None);
        assert_eq!(week2.len(), 2);
        assert_eq!(week2[&0][&0][&0], 45.0);
        assert_eq!(week2[&1][&2][&3], 12.5);

        let flat = flat_weights_for_week(&overlay, 2, None);
        let keys: Vec<&str> = flat.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["2-0-0-0", "2-1-2-3"]);
    }

    #[test]
    fn test_weights_for_week_empty() {
        let overlay = WeightOverlay::new();
        assert!(weights_for_week(&overlay, 1, None).is_empty());
    }

    #[test]
    fn test_weights_for_week_skips_malformed_keys() {
        let overlay = WeightOverlay::from_stored(vec![
            ("1-0-0-0", 30.0),
            ("1-0-0", 31.0),
            ("x-y-z-w", 32.0),
            ("0-0-0-0", 33.0),
        ]);
        let week1 = weights_for_week(&overlay, 1, None);
        assert_eq!(week1.len(), 1);
        assert_eq!(week1[&0][&0][&0], 30.0);
    }

    #[test]
    fn test_weights_for_week_skips_orphans_with_template() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::new();
        overlay.set(coord(1, 0, 0, 1), 20.0).unwrap();
        overlay.set(coord(1, 0, 0, 5), 99.0).unwrap();
        overlay.set(coord(1, 3, 0, 0), 99.0).unwrap();

        let week1 = weights_for_week(&overlay, 1, Some(&template));
        assert_eq!(week1[&0][&0].len(), 1);
        assert_eq!(week1[&0][&0][&1], 20.0);

        // without a template the orphans are still visible
        let raw = weights_for_week(&overlay, 1, None);
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn test_annotate_scenario_single_weight() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::new();
        overlay.set_or_unset(coord(1, 0, 0, 0), Some(50.0)).unwrap();

        let view = annotate_template(&template, &overlay, 1);
        let first = view.exercise(0, 0, 0).unwrap();
        assert_eq!(first.weight, Some(50.0));
        assert_eq!(first.volume, 1600.0);

        let second = view.exercise(0, 0, 1).unwrap();
        assert_eq!(second.weight, None);
        assert_eq!(second.volume, 0.0);

        assert_eq!(view.days[0].volume, 1600.0);
        assert_eq!(view.volume, 1600.0);
    }

    #[test]
    fn test_set_then_clear_disappears_from_week() {
        let mut overlay = WeightOverlay::new();
        let c = coord(1, 0, 0, 0);
        overlay.set_or_unset(c, Some(50.0)).unwrap();
        overlay.set_or_unset(c, None).unwrap();

        assert!(overlay.get(&c).is_none());
        let week1 = weights_for_week(&overlay, 1, None);
        assert!(week1.get(&0).is_none());
    }

    #[test]
    fn test_weeks_do_not_interfere() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::new();
        overlay.set_or_unset(coord(1, 0, 0, 0), Some(50.0)).unwrap();
        overlay.set_or_unset(coord(2, 0, 0, 0), Some(55.0)).unwrap();

        assert_eq!(weights_for_week(&overlay, 1, None)[&0][&0][&0], 50.0);
        assert_eq!(weights_for_week(&overlay, 2, None)[&0][&0][&0], 55.0);
        assert_eq!(annotate_template(&template, &overlay, 1).volume, 1600.0);
        assert_eq!(annotate_template(&template, &overlay, 2).volume, 1760.0);
        assert_eq!(annotate_template(&template, &overlay, 3).volume, 0.0);
    }

    #[test]
    fn test_annotate_excludes_orphans() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::new();
        overlay.set(coord(1, 0, 0, 7), 80.0).unwrap();

        let view = annotate_template(&template, &overlay, 1);
        assert_eq!(view.days[0].blocks[0].exercises.len(), 2);
        assert_eq!(view.volume, 0.0);
        assert!(view.exercise(0, 0, 7).is_none());
    }

    #[test]
    fn test_annotate_keeps_authored_order() {
        let mut template = create_small_template();
        template.days[0].blocks[0].exercises.insert(0, create_exercise("Zancada", 2, 12));
        let view = annotate_template(&template, &WeightOverlay::new(), 1);
        let names: Vec<&str> = view.days[0].blocks[0]
            .exercises
            .iter()
            .map(|e| e.exercise.name.as_str())
            .collect();
        assert_eq!(names, vec!["Zancada", "Sentadilla", "Remo"]);
    }

    #[test]
    fn test_annotated_json_shape() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::new();
        overlay.set(coord(1, 0, 0, 0), 50.0).unwrap();
        let json = serde_json::to_value(annotate_template(&template, &overlay, 1)).unwrap();

        let leaf = &json["dias"][0]["bloques"][0]["ejercicios"][0];
        assert_eq!(leaf["nombre"], "Sentadilla");
        assert_eq!(leaf["peso"], 50.0);
        assert_eq!(leaf["volumen"], 1600.0);
        assert!(json["dias"][0]["bloques"][0]["ejercicios"][1]["peso"].is_null());
    }

    #[test]
    fn test_orphaned_keys() {
        let template = create_small_template();
        let mut overlay = WeightOverlay::from_stored(vec![("bad", 1.0)]);
        overlay.set(coord(1, 0, 0, 1), 10.0).unwrap();
        overlay.set(coord(4, 0, 0, 2), 10.0).unwrap();

        let orphans: Vec<String> = orphaned_keys(&template, &overlay)
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(orphans, vec!["4-0-0-2", "bad"]);
    }
}
