//! Weight and progress operations shared by the HTTP API and the CLI
//!
//! Every write validates the whole request before touching storage, so a
//! rejected request changes nothing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{Database, NewHistorySet, Student};
use crate::error::ServiceError;
use crate::overlay::{
    AnnotatedTemplate, Coordinate, CoordinateKey, Weight, WeekWeights, WeightOverlay,
    annotate_template, flat_weights_for_week, orphaned_keys, volume, weights_for_week,
};
use crate::progress::{
    ExerciseName, GroupedHistory, HistoryEntry, SortOrder, TrendPoint,
    entries_grouped_by_exercise, total_volume, trend,
};
use crate::template::RoutineTemplate;

/// Weight as sent by clients: a number, or a string from a form field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WeightInput {
    Number(f64),
    Text(String),
}

impl WeightInput {
    /// Empty text means "clear"; anything else must be a valid weight
    pub fn parse(&self) -> Result<Option<f64>, ServiceError> {
        let kg = match self {
            WeightInput::Number(n) => *n,
            WeightInput::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                if looks_grouped(s) {
                    return Err(ServiceError::BadRequest(format!(
                        "peso {s:?} is ambiguous: use one decimal separator and no thousands grouping"
                    )));
                }
                s.replace(',', ".")
                    .parse::<f64>()
                    .map_err(|_| ServiceError::BadRequest(format!("peso {s:?} is not a number")))?
            }
        };
        Weight::new(kg)?;
        Ok(Some(kg))
    }
}

/// More than one separator, or a single one followed by exactly three
/// digits ("1,000", "1.000"), reads as thousands grouping
fn looks_grouped(text: &str) -> bool {
    let mut separators = text.match_indices([',', '.']);
    match (separators.next(), separators.next()) {
        (Some(_), Some(_)) => true,
        (Some((at, _)), None) => {
            let fraction = &text[at + 1..];
            fraction.len() == 3 && fraction.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Body of a weight write
#[derive(Debug, Clone, Deserialize)]
pub struct WeightRequest {
    #[serde(rename = "peso", default)]
    pub weight: Option<WeightInput>,
    #[serde(rename = "numeroSemana")]
    pub week: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseWeight {
    #[serde(rename = "peso")]
    pub weight: Option<f64>,
    #[serde(rename = "volumen")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightResponse {
    #[serde(rename = "ejercicio")]
    pub exercise: ExerciseWeight,
}

/// Recorded weights of one week, flat and nested
#[derive(Debug, Clone, Serialize)]
pub struct WeekWeightsView {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "pesos")]
    pub flat: BTreeMap<CoordinateKey, f64>,
    #[serde(rename = "dias")]
    pub nested: WeekWeights,
}

/// Template annotated for one week next to the history log.
/// The two are shown side by side and may disagree.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    #[serde(rename = "semana")]
    pub week: u32,
    #[serde(rename = "plantilla")]
    pub template: AnnotatedTemplate,
    #[serde(rename = "historial")]
    pub history: GroupedHistory,
    #[serde(rename = "tendencias")]
    pub trends: BTreeMap<ExerciseName, Vec<TrendPoint>>,
    /// Logged volume per exercise across the whole history
    #[serde(rename = "volumenTotal")]
    pub totals: BTreeMap<ExerciseName, f64>,
}

/// One performed exercise to log
#[derive(Debug, Clone, Deserialize)]
pub struct LogRequest {
    #[serde(rename = "numeroSemana")]
    pub week: i64,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "ejercicioId")]
    pub exercise: String,
    #[serde(rename = "peso")]
    pub weight: f64,
    #[serde(rename = "reps")]
    pub reps: u32,
    #[serde(rename = "series", default = "one")]
    pub series: u32,
    #[serde(rename = "observaciones", default)]
    pub observations: Option<String>,
}

fn one() -> u32 {
    1
}

/// Validate a week number coming from a request
pub fn parse_week(week: i64) -> Result<u32, ServiceError> {
    if week < 1 {
        return Err(ServiceError::InvalidWeek(format!("must be >= 1, got {week}")));
    }
    u32::try_from(week).map_err(|_| ServiceError::InvalidWeek(format!("{week} is too large")))
}

fn require_student(db: &Database, student_id: &str) -> Result<Student, ServiceError> {
    db.get_student(student_id)?
        .ok_or_else(|| ServiceError::StudentNotFound(student_id.to_string()))
}

fn require_template(student: Student) -> Result<RoutineTemplate, ServiceError> {
    student
        .template
        .ok_or(ServiceError::TemplateNotFound(student.id))
}

/// Set or clear the weight of one exercise slot for one week
pub fn record_weight(
    db: &mut Database,
    student_id: &str,
    (day, block, exercise): (i64, i64, i64),
    request: &WeightRequest,
) -> Result<WeightResponse, ServiceError> {
    let week = parse_week(request.week)?;
    let coordinate = Coordinate::new(i64::from(week), day, block, exercise)?;
    let kg = match &request.weight {
        Some(input) => input.parse()?,
        None => None,
    };

    let template = require_template(require_student(db, student_id)?)?;
    let prescription = template
        .resolve(&coordinate)
        .ok_or(ServiceError::OutOfBoundsCoordinate(coordinate))?;
    let (series, repetitions) = (prescription.series, prescription.repetitions);

    // change buffer: only this key is written
    let mut overlay = WeightOverlay::new();
    let stored = overlay.set_or_unset(coordinate, kg)?;
    db.save_overlay_changes(student_id, &mut overlay)?;

    match stored {
        Some(w) => info!("{}: {} set to {} kg", student_id, coordinate, w.kg()),
        None => info!("{}: {} cleared", student_id, coordinate),
    }

    Ok(WeightResponse {
        exercise: ExerciseWeight {
            weight: stored.map(Weight::kg),
            volume: volume(series, repetitions, stored),
        },
    })
}

/// Weights recorded for one week. Orphans are dropped when the student
/// has a template; without one, everything decodable is returned.
pub fn week_weights(db: &Database, student_id: &str, week: i64) -> Result<WeekWeightsView, ServiceError> {
    let week = parse_week(week)?;
    let student = require_student(db, student_id)?;
    let overlay = db.load_overlay(student_id)?;
    let template = student.template.as_ref();

    Ok(WeekWeightsView {
        week,
        flat: flat_weights_for_week(&overlay, week, template),
        nested: weights_for_week(&overlay, week, template),
    })
}

/// Latest week with any recorded data, or 1
pub fn current_week(overlay: &WeightOverlay, history: &[HistoryEntry]) -> u32 {
    let overlay_weeks = overlay.entries().filter_map(|(k, _)| k.decode().ok()).map(|c| c.week);
    let history_weeks = history.iter().map(|e| e.week);
    overlay_weeks.chain(history_weeks).max().unwrap_or(1)
}

/// Annotated template for a week plus grouped history and trends
pub fn progress(
    db: &Database,
    student_id: &str,
    week: Option<i64>,
    order: SortOrder,
) -> Result<ProgressView, ServiceError> {
    let week = week.map(parse_week).transpose()?;
    let template = require_template(require_student(db, student_id)?)?;
    let overlay = db.load_overlay(student_id)?;
    let history = db.load_history(student_id)?;

    let orphans = orphaned_keys(&template, &overlay);
    if !orphans.is_empty() {
        debug!("{}: {} orphaned weight(s) not shown", student_id, orphans.len());
    }

    let week = week.unwrap_or_else(|| current_week(&overlay, &history));
    let ascending = entries_grouped_by_exercise(&history, SortOrder::Ascending);
    let trends = ascending
        .iter()
        .map(|(name, points)| (name.clone(), trend(points)))
        .collect();
    let totals = ascending
        .keys()
        .map(|name| (name.clone(), total_volume(&history, name)))
        .collect();

    Ok(ProgressView {
        week,
        template: annotate_template(&template, &overlay, week),
        history: entries_grouped_by_exercise(&history, order),
        trends,
        totals,
    })
}

/// Overlay keys that no longer match the student's routine
pub fn orphans(db: &Database, student_id: &str) -> Result<Vec<CoordinateKey>, ServiceError> {
    let template = require_template(require_student(db, student_id)?)?;
    let overlay = db.load_overlay(student_id)?;
    Ok(orphaned_keys(&template, &overlay))
}

/// Attach a routine to a student after checking its prescriptions
pub fn assign_template(
    db: &Database,
    student_id: &str,
    template: &RoutineTemplate,
) -> Result<(), ServiceError> {
    template.validate()?;
    if !db.assign_template(student_id, template)? {
        return Err(ServiceError::StudentNotFound(student_id.to_string()));
    }

    let overlay = db.load_overlay(student_id)?;
    let orphaned = orphaned_keys(template, &overlay).len();
    if orphaned > 0 {
        warn!("{}: new routine leaves {} recorded weight(s) orphaned", student_id, orphaned);
    }
    info!("{}: routine assigned ({} slots)", student_id, template.slot_count());
    Ok(())
}

/// Add one performed exercise to the history log
pub fn log_history(db: &mut Database, student_id: &str, request: &LogRequest) -> Result<f64, ServiceError> {
    let week = parse_week(request.week)?;
    let weight = Weight::new(request.weight)?;
    if request.exercise.trim().is_empty() {
        return Err(ServiceError::BadRequest("ejercicioId must not be empty".into()));
    }
    require_student(db, student_id)?;

    let logged_volume = volume(request.series, request.reps, Some(weight));
    db.record_history_set(
        student_id,
        &NewHistorySet {
            week,
            date: request.date,
            exercise: request.exercise.trim(),
            weight: weight.kg(),
            reps: request.reps,
            volume: logged_volume,
            observations: request.observations.as_deref(),
        },
    )?;

    info!(
        "{}: logged {} {} kg x {} on {}",
        student_id,
        request.exercise.trim(),
        weight.kg(),
        request.reps,
        request.date
    );
    Ok(logged_volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Block, Day, Exercise};

    fn create_exercise(name: &str, series: u32, repetitions: u32) -> Exercise {
        Exercise {
            name: name.to_string(),
            video_url: None,
            series,
            repetitions,
            rest_seconds: 90,
        }
    }

    fn create_template() -> RoutineTemplate {
        RoutineTemplate {
            name: Some("Base".to_string()),
            days: vec![Day {
                name: None,
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

    fn create_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_student("ana", "Ana").unwrap();
        assign_template(&db, "ana", &create_template()).unwrap();
        db
    }

    fn request(weight: Option<WeightInput>, week: i64) -> WeightRequest {
        WeightRequest { weight, week }
    }

    fn kg(value: f64) -> Option<WeightInput> {
        Some(WeightInput::Number(value))
    }

    #[test]
    fn test_record_weight_response() {
        let mut db = create_db();
        let response = record_weight(&mut db, "ana", (0, 0, 0), &request(kg(50.0), 1)).unwrap();
        assert_eq!(response.exercise.weight, Some(50.0));
        assert_eq!(response.exercise.volume, 1600.0);
    }

    #[test]
    fn test_record_weight_clear() {
        let mut db = create_db();
        record_weight(&mut db, "ana", (0, 0, 0), &request(kg(50.0), 1)).unwrap();
        let response = record_weight(&mut db, "ana", (0, 0, 0), &request(None, 1)).unwrap();
        assert_eq!(response.exercise.weight, None);
        assert_eq!(response.exercise.volume, 0.0);
        assert!(week_weights(&db, "ana", 1).unwrap().flat.is_empty());
    }

    #[test]
    fn test_record_weight_validation_leaves_store_untouched() {
        let mut db = create_db();
        record_weight(&mut db, "ana", (0, 0, 1), &request(kg(30.0), 2)).unwrap();

        let bad = [
            ((0, 0, 1), request(kg(-1.0), 2)),
            ((0, 0, 1), request(Some(WeightInput::Text("mucho".into())), 2)),
            ((0, 0, 1), request(kg(10.0), 0)),
            ((0, 0, 5), request(kg(10.0), 2)),
            ((0, -1, 0), request(kg(10.0), 2)),
        ];
        for (indices, req) in &bad {
            assert!(record_weight(&mut db, "ana", *indices, req).is_err());
        }

        let view = week_weights(&db, "ana", 2).unwrap();
        assert_eq!(view.flat.len(), 1);
        assert_eq!(view.nested[&0][&0][&1], 30.0);
    }

    #[test]
    fn test_record_weight_error_kinds() {
        let mut db = create_db();
        let err = record_weight(&mut db, "ana", (0, 0, 2), &request(kg(10.0), 1)).unwrap_err();
        assert!(matches!(err, ServiceError::OutOfBoundsCoordinate(_)));

        let err = record_weight(&mut db, "ana", (0, 0, 0), &request(kg(-3.0), 1)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidWeight(_)));

        let err = record_weight(&mut db, "ana", (0, 0, 0), &request(kg(3.0), -1)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidWeek(_)));

        let err = record_weight(&mut db, "luis", (0, 0, 0), &request(kg(3.0), 1)).unwrap_err();
        assert!(matches!(err, ServiceError::StudentNotFound(_)));

        db.upsert_student("luis", "Luis").unwrap();
        let err = record_weight(&mut db, "luis", (0, 0, 0), &request(kg(3.0), 1)).unwrap_err();
        assert!(matches!(err, ServiceError::TemplateNotFound(_)));
    }

    #[test]
    fn test_weight_input_parse() {
        assert_eq!(WeightInput::Text("".into()).parse().unwrap(), None);
        assert_eq!(WeightInput::Text("  ".into()).parse().unwrap(), None);
        assert_eq!(WeightInput::Text("42,5".into()).parse().unwrap(), Some(42.5));
        assert_eq!(WeightInput::Text("42.5".into()).parse().unwrap(), Some(42.5));
        assert_eq!(WeightInput::Text("1000".into()).parse().unwrap(), Some(1000.0));
        assert_eq!(WeightInput::Number(0.0).parse().unwrap(), Some(0.0));
        assert!(WeightInput::Text("NaN".into()).parse().is_err());
        assert!(WeightInput::Number(-0.1).parse().is_err());
    }

    #[test]
    fn test_weight_input_rejects_grouped_thousands() {
        for text in ["1,000", "1.000", "1.000,5", "1,000.5", "4,2,5", "2,500"] {
            assert!(
                matches!(WeightInput::Text(text.into()).parse(), Err(ServiceError::BadRequest(_))),
                "{text:?} should be rejected"
            );
        }
        assert_eq!(WeightInput::Text("42,25".into()).parse().unwrap(), Some(42.25));
        assert_eq!(WeightInput::Text("1,0".into()).parse().unwrap(), Some(1.0));
    }


    #[test]
    fn test_weight_request_json() {
        let req: WeightRequest = serde_json::from_str(r#"{"peso": null, "numeroSemana": 3}"#).unwrap();
        assert!(req.weight.is_none());
        let req: WeightRequest = serde_json::from_str(r#"{"peso": 60, "numeroSemana": 3}"#).unwrap();
        assert_eq!(req.weight, Some(WeightInput::Number(60.0)));
        assert!(serde_json::from_str::<WeightRequest>(r#"{"peso": 60, "numeroSemana": 1.5}"#).is_err());
    }

    #[test]
    fn test_week_weights_hides_orphans() {
        let mut db = create_db();
        let mut overlay = WeightOverlay::new();
        overlay.set(Coordinate::new(1, 0, 0, 0).unwrap(), 50.0).unwrap();
        overlay.set(Coordinate::new(1, 0, 0, 9).unwrap(), 99.0).unwrap();
        db.save_overlay_changes("ana", &mut overlay).unwrap();

        let view = week_weights(&db, "ana", 1).unwrap();
        assert_eq!(view.flat.len(), 1);
        assert_eq!(orphans(&db, "ana").unwrap().len(), 1);
    }

    #[test]
    fn test_progress_surfaces_both_sides() {
        let mut db = create_db();
        record_weight(&mut db, "ana", (0, 0, 0), &request(kg(50.0), 2)).unwrap();
        log_history(
            &mut db,
            "ana",
            &LogRequest {
                week: 2,
                date: NaiveDate::from_ymd_opt(2025, 5, 6).unwrap(),
                exercise: "Sentadilla".into(),
                weight: 47.5,
                reps: 8,
                series: 4,
                observations: None,
            },
        )
        .unwrap();
        // planned weight changed after the workout was logged
        record_weight(&mut db, "ana", (0, 0, 0), &request(kg(55.0), 2)).unwrap();

        let view = progress(&db, "ana", None, SortOrder::Descending).unwrap();
        assert_eq!(view.week, 2);
        assert_eq!(view.template.exercise(0, 0, 0).unwrap().weight, Some(55.0));
        let logged = &view.history[&ExerciseName::new("Sentadilla")];
        assert_eq!(logged[0].weight, 47.5);
        assert_eq!(logged[0].volume, 4.0 * 8.0 * 47.5);
        assert_eq!(view.totals[&ExerciseName::new("Sentadilla")], 4.0 * 8.0 * 47.5);
    }

    #[test]
    fn test_progress_total_volume_per_exercise() {
        let mut db = create_db();
        let sessions = [
            (1, 5, "Sentadilla", 50.0, 8, 4),
            (2, 12, "Sentadilla", 52.5, 8, 4),
            (2, 12, "Remo", 40.0, 10, 3),
        ];
        for (week, day, exercise, weight, reps, series) in sessions {
            let req = LogRequest {
                week,
                date: NaiveDate::from_ymd_opt(2025, 5, day).unwrap(),
                exercise: exercise.into(),
                weight,
                reps,
                series,
                observations: None,
            };
            log_history(&mut db, "ana", &req).unwrap();
        }

        let view = progress(&db, "ana", None, SortOrder::Ascending).unwrap();
        assert_eq!(view.totals.len(), 2);
        assert_eq!(view.totals[&ExerciseName::new("Sentadilla")], 1600.0 + 1680.0);
        assert_eq!(view.totals[&ExerciseName::new("Remo")], 1200.0);
    }

    #[test]
    fn test_progress_requires_template() {
        let db = create_db();
        db.upsert_student("luis", "Luis").unwrap();
        assert!(matches!(
            progress(&db, "luis", Some(1), SortOrder::Ascending),
            Err(ServiceError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_current_week_defaults_to_one() {
        assert_eq!(current_week(&WeightOverlay::new(), &[]), 1);
        let overlay = WeightOverlay::from_stored(vec![("3-0-0-0", 10.0), ("junk", 1.0)]);
        assert_eq!(current_week(&overlay, &[]), 3);
    }

    #[test]
    fn test_assign_invalid_template() {
        let db = create_db();
        let mut template = create_template();
        template.days[0].blocks[0].exercises[0].series = 0;
        assert!(matches!(
            assign_template(&db, "ana", &template),
            Err(ServiceError::InvalidTemplate(_))
        ));
        assert!(matches!(
            assign_template(&db, "nobody", &create_template()),
            Err(ServiceError::StudentNotFound(_))
        ));
    }

    #[test]
    fn test_log_history_rejects_bad_input() {
        let mut db = create_db();
        let mut req = LogRequest {
            week: 1,
            date: NaiveDate::from_ymd_opt(2025, 5, 6).unwrap(),
            exercise: "Remo".into(),
            weight: -2.0,
            reps: 10,
            series: 1,
            observations: None,
        };
        assert!(log_history(&mut db, "ana", &req).is_err());
        req.weight = 20.0;
        req.exercise = " ".into();
        assert!(log_history(&mut db, "ana", &req).is_err());
        assert!(db.load_history("ana").unwrap().is_empty());
    }
}
