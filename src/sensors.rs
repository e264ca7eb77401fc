use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::{StoreError, WellnessError};
use crate::models::{date_key, MetricKind, MetricReading, MetricValue, SleepRecord};
use crate::normalize;
use crate::store::{decode, encode, paths, DocumentStore};

const LATEST_SLEEP: &str = "latestSleep";

/// Latest reading of each metric for one student and date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyReadings {
    pub sleep: Option<MetricReading>,
    pub steps: Option<MetricReading>,
    pub heart_rate: Option<MetricReading>,
    pub blood_pressure: Option<MetricReading>,
}

impl DailyReadings {
    pub fn get(&self, kind: MetricKind) -> Option<&MetricReading> {
        match kind {
            MetricKind::Sleep => self.sleep.as_ref(),
            MetricKind::Steps => self.steps.as_ref(),
            MetricKind::HeartRate => self.heart_rate.as_ref(),
            MetricKind::BloodPressure => self.blood_pressure.as_ref(),
        }
    }
}

/// The local calendar date a reading belongs to.
pub fn local_date(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}

/// Latest reading of `kind` recorded on `date`. Storage trouble is logged and
/// read as "no reading" so one metric never sinks the whole day.
#[instrument(skip(store))]
pub async fn latest_reading(
    store: &dyn DocumentStore,
    student_id: &str,
    kind: MetricKind,
    date: NaiveDate,
) -> Option<MetricReading> {
    match try_latest_reading(store, student_id, kind, date).await {
        Ok(reading) => reading,
        Err(e) => {
            warn!(error = %e, student_id, metric = kind.key(), %date, "metric read failed; treating as absent");
            None
        }
    }
}

async fn try_latest_reading(
    store: &dyn DocumentStore,
    student_id: &str,
    kind: MetricKind,
    date: NaiveDate,
) -> Result<Option<MetricReading>, StoreError> {
    let path = paths::sensor(student_id, kind);
    let Some(mut doc) = store.get(&path).await? else {
        return Ok(None);
    };

    if kind == MetricKind::Sleep {
        let Some(raw) = doc.get_mut(LATEST_SLEEP).map(Value::take) else {
            return Ok(None);
        };
        let record: SleepRecord = decode(&path, raw)?;
        return Ok((record.date == date).then_some(record.reading));
    }

    let Some(raw) = doc.get_mut(date_key(date)).map(Value::take) else {
        return Ok(None);
    };
    let readings: Vec<MetricReading> = decode(&path, raw)?;
    Ok(latest_by_timestamp(readings))
}

/// Max by timestamp; equal timestamps resolve to the later-appended reading.
pub fn latest_by_timestamp(readings: Vec<MetricReading>) -> Option<MetricReading> {
    readings.into_iter().reduce(|best, next| {
        if next.timestamp >= best.timestamp {
            next
        } else {
            best
        }
    })
}

pub async fn read_day(store: &dyn DocumentStore, student_id: &str, date: NaiveDate) -> DailyReadings {
    let (sleep, steps, heart_rate, blood_pressure) = tokio::join!(
        latest_reading(store, student_id, MetricKind::Sleep, date),
        latest_reading(store, student_id, MetricKind::Steps, date),
        latest_reading(store, student_id, MetricKind::HeartRate, date),
        latest_reading(store, student_id, MetricKind::BloodPressure, date),
    );
    DailyReadings {
        sleep,
        steps,
        heart_rate,
        blood_pressure,
    }
}

/// Scores a raw value and files it under the local date of `timestamp`.
#[instrument(skip(store))]
pub async fn record_reading(
    store: &dyn DocumentStore,
    student_id: &str,
    kind: MetricKind,
    value: MetricValue,
    timestamp: DateTime<Utc>,
) -> Result<MetricReading, WellnessError> {
    let score = normalize::sub_score(kind, &value).map_err(WellnessError::InvalidInput)?;
    let reading = MetricReading {
        value,
        score,
        timestamp,
    };
    let date = local_date(timestamp);
    let path = paths::sensor(student_id, kind);

    match kind {
        MetricKind::Sleep => {
            let record = SleepRecord {
                reading: reading.clone(),
                date,
            };
            let doc = json!({ LATEST_SLEEP: encode(&path, &record)? });
            store.set_merge(&path, doc).await?;
        }
        MetricKind::Steps | MetricKind::HeartRate | MetricKind::BloodPressure => {
            let item = encode(&path, &reading)?;
            store.array_union(&path, &date_key(date), vec![item]).await?;
        }
    }
    debug!(student_id, metric = kind.key(), %date, score, "reading recorded");
    Ok(reading)
}
