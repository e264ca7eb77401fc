use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Calendar date keys are always `YYYY-MM-DD`, so lexicographic order is chronological.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub counselor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counselor {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Student(Student),
    Counselor(Counselor),
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Student(_) => "student",
            Role::Counselor(_) => "counselor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    Sleep,
    Steps,
    HeartRate,
    BloodPressure,
}

impl MetricKind {
    /// Aggregation order; also the order missing metrics are reported in.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Sleep,
        MetricKind::Steps,
        MetricKind::HeartRate,
        MetricKind::BloodPressure,
    ];

    /// Document id of the metric under `sensorData`.
    pub fn key(self) -> &'static str {
        match self {
            MetricKind::Sleep => "sleep",
            MetricKind::Steps => "steps",
            MetricKind::HeartRate => "heartRate",
            MetricKind::BloodPressure => "bloodPressure",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MetricKind::Sleep => "Sleep",
            MetricKind::Steps => "Steps",
            MetricKind::HeartRate => "Heart Rate",
            MetricKind::BloodPressure => "Blood Pressure",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "sleep" => Ok(MetricKind::Sleep),
            "steps" => Ok(MetricKind::Steps),
            "heartrate" => Ok(MetricKind::HeartRate),
            "bloodpressure" => Ok(MetricKind::BloodPressure),
            other => Err(format!("unknown metric `{other}`")),
        }
    }
}

/// Raw observation: hours of sleep, step count and bpm are scalars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Pressure { systolic: f64, diastolic: f64 },
}

impl MetricValue {
    /// Parses `120/80` as blood pressure and anything else as a scalar.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match kind {
            MetricKind::BloodPressure => {
                let (sys, dia) = raw
                    .split_once('/')
                    .ok_or_else(|| format!("blood pressure must look like 120/80, got `{raw}`"))?;
                let systolic = sys
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid systolic `{sys}`: {e}"))?;
                let diastolic = dia
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| format!("invalid diastolic `{dia}`: {e}"))?;
                Ok(MetricValue::Pressure {
                    systolic,
                    diastolic,
                })
            }
            _ => raw
                .parse::<f64>()
                .map(MetricValue::Scalar)
                .map_err(|e| format!("invalid {} value `{raw}`: {e}", kind.key())),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Scalar(v) => write!(f, "{v}"),
            MetricValue::Pressure {
                systolic,
                diastolic,
            } => write!(f, "{systolic}/{diastolic}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: MetricValue,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// The single tracked sleep record; it only counts for its own `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    #[serde(flatten)]
    pub reading: MetricReading,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessScoreEntry {
    pub sleep_score: f64,
    pub steps_score: f64,
    pub heart_rate_score: f64,
    pub blood_pressure_score: f64,
    pub final_score: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub average_wellness_score: u32,
    pub total_students: usize,
    pub at_risk_students: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub student_id: String,
    pub student_name: String,
    pub score: u32,
    pub email: String,
    pub flagged_at: DateTime<Utc>,
    pub score_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn date_keys_sort_chronologically() {
        let earlier = date_key(NaiveDate::from_ymd_opt(2025, 9, 30).unwrap());
        let later = date_key(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        assert_eq!(earlier, "2025-09-30");
        assert!(earlier < later);
    }

    #[test]
    fn rejects_malformed_date_keys() {
        assert!(parse_date_key("2025-1-5").is_none());
        assert!(parse_date_key("lastUpdated").is_none());
        assert_eq!(
            parse_date_key("2025-01-05"),
            NaiveDate::from_ymd_opt(2025, 1, 5)
        );
    }

    #[test]
    fn metric_kinds_parse_from_cli_spellings() {
        assert_eq!("heart-rate".parse::<MetricKind>(), Ok(MetricKind::HeartRate));
        assert_eq!("bloodPressure".parse::<MetricKind>(), Ok(MetricKind::BloodPressure));
        assert!("mood".parse::<MetricKind>().is_err());
    }

    #[test]
    fn blood_pressure_values_need_both_parts() {
        assert_eq!(
            MetricValue::parse(MetricKind::BloodPressure, "118/76"),
            Ok(MetricValue::Pressure {
                systolic: 118.0,
                diastolic: 76.0
            })
        );
        assert!(MetricValue::parse(MetricKind::BloodPressure, "118").is_err());
        assert_eq!(
            MetricValue::parse(MetricKind::Steps, "8200"),
            Ok(MetricValue::Scalar(8200.0))
        );
    }

    #[test]
    fn student_documents_use_camel_case_fields() {
        let doc = json!({
            "name": "Avery Lee",
            "email": "avery@example.com",
            "counselorId": "c-1"
        });
        let student: Student = serde_json::from_value(doc).unwrap();
        assert_eq!(student.counselor_id.as_deref(), Some("c-1"));
        assert!(student.avatar.is_none());
    }

    #[test]
    fn sleep_record_keeps_reading_fields_flat() {
        let doc = json!({
            "value": 7.5,
            "score": 100.0,
            "timestamp": "2025-03-02T07:00:00Z",
            "date": "2025-03-02"
        });
        let record: SleepRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(record.reading.value, MetricValue::Scalar(7.5));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }
}
