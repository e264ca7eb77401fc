use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::error::StoreError;
use crate::models::{date_key, parse_date_key, MetricKind, WellnessScoreEntry};
use crate::sensors::{self, DailyReadings};
use crate::store::{decode, encode, paths, DocumentStore};

pub const SLEEP_WEIGHT: f64 = 0.40;
pub const STEPS_WEIGHT: f64 = 0.30;
pub const HEART_RATE_WEIGHT: f64 = 0.20;
pub const BLOOD_PRESSURE_WEIGHT: f64 = 0.10;

pub fn weight(kind: MetricKind) -> f64 {
    match kind {
        MetricKind::Sleep => SLEEP_WEIGHT,
        MetricKind::Steps => STEPS_WEIGHT,
        MetricKind::HeartRate => HEART_RATE_WEIGHT,
        MetricKind::BloodPressure => BLOOD_PRESSURE_WEIGHT,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubScores {
    pub sleep: Option<f64>,
    pub steps: Option<f64>,
    pub heart_rate: Option<f64>,
    pub blood_pressure: Option<f64>,
}

impl SubScores {
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Sleep => self.sleep,
            MetricKind::Steps => self.steps,
            MetricKind::HeartRate => self.heart_rate,
            MetricKind::BloodPressure => self.blood_pressure,
        }
    }
}

impl From<&DailyReadings> for SubScores {
    fn from(day: &DailyReadings) -> Self {
        Self {
            sleep: day.sleep.as_ref().map(|r| r.score),
            steps: day.steps.as_ref().map(|r| r.score),
            heart_rate: day.heart_rate.as_ref().map(|r| r.score),
            blood_pressure: day.blood_pressure.as_ref().map(|r| r.score),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub final_score: Option<u32>,
    /// Absent metrics, in sleep, steps, heart rate, blood pressure order.
    pub missing: Vec<MetricKind>,
}

/// Weighted wellness score; only defined when all four sub-scores exist.
pub fn aggregate(scores: &SubScores) -> Aggregate {
    let missing: Vec<MetricKind> = MetricKind::ALL
        .into_iter()
        .filter(|kind| scores.get(*kind).is_none())
        .collect();
    if !missing.is_empty() {
        return Aggregate {
            final_score: None,
            missing,
        };
    }

    let weighted: f64 = MetricKind::ALL
        .into_iter()
        .map(|kind| weight(kind) * scores.get(kind).unwrap_or_default())
        .sum();
    Aggregate {
        final_score: Some(weighted.round().clamp(0.0, 100.0) as u32),
        missing,
    }
}

/// Writes the day's entry; a second write for the same date replaces it.
#[instrument(skip(store, entry))]
pub async fn persist_entry(
    store: &dyn DocumentStore,
    student_id: &str,
    date: NaiveDate,
    entry: &WellnessScoreEntry,
) -> Result<(), StoreError> {
    let path = paths::scores(student_id);
    let mut doc = Map::new();
    doc.insert(date_key(date), encode(&path, entry)?);
    store.set_merge(&path, Value::Object(doc)).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyWellness {
    pub date: NaiveDate,
    pub readings: DailyReadings,
    pub aggregate: Aggregate,
    pub entry: Option<WellnessScoreEntry>,
    pub persisted: bool,
}

/// Reads the day's metrics and aggregates them. Only today's score is written
/// back; past days are computed for display and left as stored.
#[instrument(skip(store))]
pub async fn daily_wellness(
    store: &dyn DocumentStore,
    student_id: &str,
    date: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> DailyWellness {
    let readings = sensors::read_day(store, student_id, date).await;
    let scores = SubScores::from(&readings);
    let aggregate = aggregate(&scores);

    let entry = aggregate.final_score.map(|final_score| WellnessScoreEntry {
        sleep_score: scores.sleep.unwrap_or_default(),
        steps_score: scores.steps.unwrap_or_default(),
        heart_rate_score: scores.heart_rate.unwrap_or_default(),
        blood_pressure_score: scores.blood_pressure.unwrap_or_default(),
        final_score,
        timestamp: now,
    });

    let mut persisted = false;
    if let Some(entry) = entry.as_ref().filter(|_| date == today) {
        match persist_entry(store, student_id, date, entry).await {
            Ok(()) => {
                persisted = true;
                info!(student_id, %date, final_score = entry.final_score, "wellness score saved");
            }
            Err(e) => warn!(error = %e, student_id, %date, "could not save wellness score"),
        }
    }

    DailyWellness {
        date,
        readings,
        aggregate,
        entry,
        persisted,
    }
}

/// Decodes every well-formed `YYYY-MM-DD` entry of a scores document,
/// ascending by date. Malformed keys or entries are skipped.
pub fn decode_entries(student_id: &str, doc: Value) -> Vec<(NaiveDate, WellnessScoreEntry)> {
    let Value::Object(fields) = doc else {
        return Vec::new();
    };
    let path = paths::scores(student_id);
    let mut entries = Vec::with_capacity(fields.len());
    for (key, raw) in fields {
        let Some(date) = parse_date_key(&key) else {
            continue;
        };
        match decode::<WellnessScoreEntry>(&path, raw) {
            Ok(entry) => entries.push((date, entry)),
            Err(e) => warn!(error = %e, student_id, date = %key, "skipping malformed score entry"),
        }
    }
    entries.sort_by_key(|(date, _)| *date);
    entries
}

/// Most recent stored entry, by largest date key. A malformed entry under
/// that key is an error; older dates are never substituted for it.
pub async fn latest_entry(
    store: &dyn DocumentStore,
    student_id: &str,
) -> Result<Option<(NaiveDate, WellnessScoreEntry)>, StoreError> {
    let path = paths::scores(student_id);
    let Some(Value::Object(mut fields)) = store.get(&path).await? else {
        return Ok(None);
    };
    let Some((date, key)) = fields
        .keys()
        .filter_map(|key| parse_date_key(key).map(|date| (date, key.clone())))
        .max_by_key(|(date, _)| *date)
    else {
        return Ok(None);
    };
    let Some(raw) = fields.remove(&key) else {
        return Ok(None);
    };
    let entry = decode::<WellnessScoreEntry>(&path, raw)?;
    Ok(Some((date, entry)))
}

pub async fn score_history(
    store: &dyn DocumentStore,
    student_id: &str,
    since: NaiveDate,
) -> Result<Vec<(NaiveDate, WellnessScoreEntry)>, StoreError> {
    let doc = store.get(&paths::scores(student_id)).await?;
    Ok(doc
        .map(|doc| decode_entries(student_id, doc))
        .unwrap_or_default()
        .into_iter()
        .filter(|(date, _)| *date >= since)
        .collect())
}
