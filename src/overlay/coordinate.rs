//! Coordinate codec - positional address of an exercise slot in a week
//!
//! Key format: `"{week}-{day}-{block}-{exercise}"`, plain decimal, no
//! leading zeros. Stored keys are parsed by splitting on `-`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SEPARATOR: char = '-';
const FIELDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("malformed coordinate key {key:?}: {reason}")]
    MalformedKey { key: String, reason: &'static str },
}

/// (week, day, block, exercise) path into a routine template.
///
/// Week numbering starts at 1, indices at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub week: u32,
    pub day: usize,
    pub block: usize,
    pub exercise: usize,
}

impl Coordinate {
    /// Build a coordinate from raw request values
    pub fn new(week: i64, day: i64, block: i64, exercise: i64) -> Result<Self, CoordinateError> {
        if week < 1 {
            return Err(CoordinateError::InvalidCoordinate(format!(
                "week must be >= 1, got {week}"
            )));
        }
        let week = u32::try_from(week).map_err(|_| {
            CoordinateError::InvalidCoordinate(format!("week {week} is too large"))
        })?;

        Ok(Self {
            week,
            day: index("day", day)?,
            block: index("block", block)?,
            exercise: index("exercise", exercise)?,
        })
    }

    /// Canonical string key
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.week, self.day, self.block, self.exercise
        ))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "week {} / day {} / block {} / exercise {}",
            self.week, self.day, self.block, self.exercise
        )
    }
}

fn index(name: &str, value: i64) -> Result<usize, CoordinateError> {
    usize::try_from(value).map_err(|_| {
        CoordinateError::InvalidCoordinate(format!("{name} index must be >= 0, got {value}"))
    })
}

/// Serialized coordinate.
///
/// Keys coming back from storage are kept as-is even when they do not
/// decode; readers skip those instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateKey(String);

impl CoordinateKey {
    /// Wrap a key read from storage without validating it
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Coordinate, CoordinateError> {
        decode(&self.0)
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Coordinate> for CoordinateKey {
    fn from(c: Coordinate) -> Self {
        c.key()
    }
}

/// Encode raw request values into a key
pub fn encode(week: i64, day: i64, block: i64, exercise: i64) -> Result<CoordinateKey, CoordinateError> {
    Coordinate::new(week, day, block, exercise).map(|c| c.key())
}

/// Decode a key into a coordinate.
///
/// Only canonical keys are accepted, so `decode(k)?.key() == k`.
pub fn decode(key: &str) -> Result<Coordinate, CoordinateError> {
    let malformed = |reason: &'static str| CoordinateError::MalformedKey {
        key: key.to_string(),
        reason,
    };

    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    if parts.len() != FIELDS {
        return Err(malformed("expected four fields"));
    }

    let mut values = [0u64; FIELDS];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = parse_field(part).ok_or_else(|| malformed("field is not a canonical non-negative integer"))?;
    }

    let [week, day, block, exercise] = values;
    if week == 0 {
        return Err(CoordinateError::InvalidCoordinate(format!(
            "week must be >= 1 in key {key:?}"
        )));
    }

    let too_large = || malformed("field out of range");
    Ok(Coordinate {
        week: u32::try_from(week).map_err(|_| too_large())?,
        day: usize::try_from(day).map_err(|_| too_large())?,
        block: usize::try_from(block).map_err(|_| too_large())?,
        exercise: usize::try_from(exercise).map_err(|_| too_large())?,
    })
}

fn parse_field(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}
