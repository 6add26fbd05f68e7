//! Database module - SQLite storage for students, weights and history
//!
//! The weight overlay is stored one row per coordinate, so saving a
//! student's edit only touches the keys that changed.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::overlay::{Coordinate, WeightOverlay, decode};
use crate::progress::{ExerciseName, HistoryEntry, HistorySet};
use crate::template::RoutineTemplate;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Student record with the routine currently assigned to them
#[derive(Debug, Clone)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub template: Option<RoutineTemplate>,
}

/// One performed exercise to add to the history log
#[derive(Debug, Clone)]
pub struct NewHistorySet<'a> {
    pub week: u32,
    pub date: NaiveDate,
    pub exercise: &'a str,
    pub weight: f64,
    pub reps: u32,
    pub volume: f64,
    pub observations: Option<&'a str>,
}

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Fresh in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                template TEXT
            );

            CREATE TABLE IF NOT EXISTS weight_overlay (
                student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                week INTEGER NOT NULL,
                day_index INTEGER NOT NULL,
                block_index INTEGER NOT NULL,
                exercise_index INTEGER NOT NULL,
                weight REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (student_id, week, day_index, block_index, exercise_index)
            );

            CREATE TABLE IF NOT EXISTS history_sessions (
                student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                week INTEGER NOT NULL,
                observations TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (student_id, date)
            );

            CREATE TABLE IF NOT EXISTS history_sets (
                student_id TEXT NOT NULL,
                date TEXT NOT NULL,
                exercise_name TEXT NOT NULL,
                weight REAL NOT NULL,
                reps INTEGER NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (student_id, date, exercise_name),
                FOREIGN KEY (student_id, date)
                    REFERENCES history_sessions(student_id, date) ON DELETE CASCADE
            );",
        )?;
        Ok(())
    }

    /// Create a student or rename an existing one
    pub fn upsert_student(&self, id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO students (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name],
        )?;
        Ok(())
    }

    /// Get student with assigned template
    pub fn get_student(&self, id: &str) -> Result<Option<Student>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, template FROM students WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, template)) = row else {
            return Ok(None);
        };
        let template = template
            .map(|json| serde_json::from_str::<RoutineTemplate>(&json))
            .transpose()?;

        Ok(Some(Student { id, name, template }))
    }

    /// Attach a routine template. Returns false if the student is unknown.
    /// Existing weights are left alone even if the new shape is smaller.
    pub fn assign_template(&self, id: &str, template: &RoutineTemplate) -> Result<bool> {
        let json = serde_json::to_string(template)?;
        let updated = self.conn.execute(
            "UPDATE students SET template = ?2 WHERE id = ?1",
            params![id, json],
        )?;
        Ok(updated > 0)
    }

    /// Load every stored weight of a student
    pub fn load_overlay(&self, student_id: &str) -> Result<WeightOverlay> {
        let mut stmt = self.conn.prepare(
            "SELECT week, day_index, block_index, exercise_index, weight
             FROM weight_overlay WHERE student_id = ?1",
        )?;

        let rows = stmt
            .query_map(params![student_id], |row| {
                let key = format!(
                    "{}-{}-{}-{}",
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                );
                Ok((key, row.get::<_, f64>(4)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WeightOverlay::from_stored(rows))
    }

    /// Persist pending overlay mutations in one transaction.
    ///
    /// Only changed coordinates are written; concurrent edits to other
    /// coordinates of the same student survive. Same-coordinate writes
    /// are last-write-wins. Returns the number of keys written.
    pub fn save_overlay_changes(&mut self, student_id: &str, overlay: &mut WeightOverlay) -> Result<usize> {
        if !overlay.is_dirty() {
            return Ok(0);
        }

        let changes = overlay.take_changes();
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        for (coordinate, weight) in &changes {
            let [week, day, block, exercise] = columns(coordinate)?;
            match weight {
                Some(w) => {
                    tx.execute(
                        "INSERT INTO weight_overlay
                            (student_id, week, day_index, block_index, exercise_index, weight, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(student_id, week, day_index, block_index, exercise_index)
                         DO UPDATE SET weight = excluded.weight, updated_at = excluded.updated_at",
                        params![student_id, week, day, block, exercise, w.kg(), now],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM weight_overlay
                         WHERE student_id = ?1 AND week = ?2 AND day_index = ?3
                           AND block_index = ?4 AND exercise_index = ?5",
                        params![student_id, week, day, block, exercise],
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!("Saved {} overlay change(s) for {}", changes.len(), student_id);
        Ok(changes.len())
    }

    /// Import a legacy embedded weights document (`"w-d-b-e" -> kg`).
    ///
    /// Keys that do not decode are skipped and returned so the caller can
    /// report them.
    pub fn import_legacy_overlay(
        &mut self,
        student_id: &str,
        document: &BTreeMap<String, f64>,
    ) -> Result<Vec<String>> {
        let mut overlay = WeightOverlay::new();
        let mut skipped = Vec::new();

        for (key, kg) in document {
            let imported = decode(key)
                .map_err(|e| e.to_string())
                .and_then(|c| overlay.set(c, *kg).map(|_| ()).map_err(|e| e.to_string()));
            if let Err(reason) = imported {
                warn!("Skipping legacy weight {}: {}", key, reason);
                skipped.push(key.clone());
            }
        }

        self.save_overlay_changes(student_id, &mut overlay)?;
        Ok(skipped)
    }

    /// Add or overwrite one exercise of a workout day.
    ///
    /// A day holds at most one entry per exercise name.
    pub fn record_history_set(&mut self, student_id: &str, set: &NewHistorySet<'_>) -> Result<()> {
        let date = set.date.format(DATE_FORMAT).to_string();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO history_sessions (student_id, date, week, observations)
             VALUES (?1, ?2, ?3, COALESCE(?4, ''))
             ON CONFLICT(student_id, date) DO UPDATE SET
                week = excluded.week,
                observations = COALESCE(?4, history_sessions.observations)",
            params![student_id, date, set.week, set.observations],
        )?;
        tx.execute(
            "INSERT INTO history_sets (student_id, date, exercise_name, weight, reps, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(student_id, date, exercise_name) DO UPDATE SET
                weight = excluded.weight,
                reps = excluded.reps,
                volume = excluded.volume",
            params![student_id, date, set.exercise, set.weight, set.reps, set.volume],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Get the full history log of a student, oldest day first
    pub fn load_history(&self, student_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.date, s.week, s.observations,
                    h.exercise_name, h.weight, h.reps, h.volume
             FROM history_sessions s
             LEFT JOIN history_sets h
                ON h.student_id = s.student_id AND h.date = s.date
             WHERE s.student_id = ?1
             ORDER BY s.date, h.exercise_name",
        )?;

        let rows = stmt
            .query_map(params![student_id], |row| {
                let set = match row.get::<_, Option<String>>(3)? {
                    Some(name) => Some(HistorySet {
                        exercise: ExerciseName::new(name),
                        weight: row.get(4)?,
                        reps: row.get(5)?,
                        volume: row.get(6)?,
                    }),
                    None => None,
                };
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    set,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut history: Vec<HistoryEntry> = Vec::new();
        for (date_str, week, observations, set) in rows {
            let Ok(date) = NaiveDate::parse_from_str(&date_str, DATE_FORMAT) else {
                warn!("Skipping history row with bad date {:?}", date_str);
                continue;
            };

            let same_day = history.last().is_some_and(|e| e.date == date);
            if !same_day {
                history.push(HistoryEntry {
                    week,
                    date,
                    observations,
                    sets: Vec::new(),
                });
            }
            if let (Some(entry), Some(set)) = (history.last_mut(), set) {
                entry.sets.push(set);
            }
        }

        Ok(history)
    }
}

fn columns(c: &Coordinate) -> Result<[i64; 4]> {
    Ok([
        i64::from(c.week),
        i64::try_from(c.day)?,
        i64::try_from(c.block)?,
        i64::try_from(c.exercise)?,
    ])
}
