use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MetricKind, MetricValue};
use crate::sensors;
use crate::store::{paths, DocumentStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_COUNSELOR: &str = "c-morgan-hale";

/// One counselor, three students and a day of readings each. Readings are
/// stamped relative to `now`, so re-seeding on another day adds a new day.
pub async fn seed(store: &dyn DocumentStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    store
        .set_merge(
            &paths::counselor(SEED_COUNSELOR),
            json!({"name": "Morgan Hale", "email": "morgan.hale@wellness.example"}),
        )
        .await?;

    let students = [
        ("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "Avery Lee", "avery.lee@wellness.example"),
        ("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc", "Jules Moreno", "jules.moreno@wellness.example"),
        ("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2", "Kiara Patel", "kiara.patel@wellness.example"),
    ];
    for (id, name, email) in students {
        store
            .set_merge(
                &paths::student(id),
                json!({"name": name, "email": email, "counselorId": SEED_COUNSELOR}),
            )
            .await?;
    }

    let pressure = |systolic, diastolic| MetricValue::Pressure {
        systolic,
        diastolic,
    };
    let readings = [
        (students[0].0, MetricKind::Sleep, MetricValue::Scalar(8.0)),
        (students[0].0, MetricKind::Steps, MetricValue::Scalar(11_200.0)),
        (students[0].0, MetricKind::HeartRate, MetricValue::Scalar(68.0)),
        (students[0].0, MetricKind::BloodPressure, pressure(118.0, 76.0)),
        (students[1].0, MetricKind::Sleep, MetricValue::Scalar(4.0)),
        (students[1].0, MetricKind::Steps, MetricValue::Scalar(1_500.0)),
        (students[1].0, MetricKind::HeartRate, MetricValue::Scalar(96.0)),
        (students[1].0, MetricKind::BloodPressure, pressure(142.0, 92.0)),
        (students[2].0, MetricKind::Sleep, MetricValue::Scalar(7.0)),
        (students[2].0, MetricKind::Steps, MetricValue::Scalar(6_400.0)),
    ];
    for (offset, (student_id, kind, value)) in readings.into_iter().enumerate() {
        let at = now - Duration::minutes(offset as i64);
        sensors::record_reading(store, student_id, kind, value, at)
            .await
            .with_context(|| format!("seed {} reading for {student_id}", kind.key()))?;
    }

    Ok(())
}

/// Imports readings from a CSV with columns
/// `student_id,name,email,metric,value,recorded_at`. Student profiles are
/// merged in; an existing counselor assignment is left alone. Rows with an
/// empty `student_id` share one generated id per email within the file.
pub async fn import_csv(store: &dyn DocumentStore, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: Option<String>,
        name: String,
        email: String,
        metric: String,
        value: String,
        recorded_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("open {}", csv_path.display()))?;
    let mut imported = 0usize;
    let mut generated: HashMap<String, String> = HashMap::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("row {}", line + 1))?;
        let student_id = match row.student_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generated
                .entry(row.email.to_lowercase())
                .or_insert_with(|| Uuid::new_v4().to_string())
                .clone(),
        };
        let kind: MetricKind = row
            .metric
            .parse()
            .map_err(|e: String| anyhow::anyhow!("row {}: {e}", line + 1))?;
        let value = MetricValue::parse(kind, &row.value)
            .map_err(|e| anyhow::anyhow!("row {}: {e}", line + 1))?;

        store
            .set_merge(
                &paths::student(&student_id),
                json!({"name": row.name, "email": row.email}),
            )
            .await?;
        sensors::record_reading(store, &student_id, kind, value, row.recorded_at)
            .await
            .with_context(|| format!("row {}", line + 1))?;
        imported += 1;
    }

    Ok(imported)
}
