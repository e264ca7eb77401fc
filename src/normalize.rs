//! Raw metric value to 0-100 sub-score.

use crate::models::{MetricKind, MetricValue};

const STEP_GOAL: f64 = 10_000.0;

pub fn sub_score(kind: MetricKind, value: &MetricValue) -> Result<f64, String> {
    let score = match (kind, *value) {
        (MetricKind::Sleep, MetricValue::Scalar(hours)) => sleep_score(non_negative(kind, hours)?),
        (MetricKind::Steps, MetricValue::Scalar(steps)) => steps_score(non_negative(kind, steps)?),
        (MetricKind::HeartRate, MetricValue::Scalar(bpm)) => {
            heart_rate_score(non_negative(kind, bpm)?)
        }
        (
            MetricKind::BloodPressure,
            MetricValue::Pressure {
                systolic,
                diastolic,
            },
        ) => blood_pressure_score(
            non_negative(kind, systolic)?,
            non_negative(kind, diastolic)?,
        ),
        (kind, value) => {
            return Err(format!("{value} is not a valid {} reading", kind.key()));
        }
    };
    Ok(score.clamp(0.0, 100.0))
}

fn non_negative(kind: MetricKind, v: f64) -> Result<f64, String> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("{} reading must be a non-negative number, got {v}", kind.key()))
    }
}

fn sleep_score(hours: f64) -> f64 {
    if hours < 7.0 {
        100.0 - (7.0 - hours) * 20.0
    } else if hours > 9.0 {
        100.0 - (hours - 9.0) * 15.0
    } else {
        100.0
    }
}

fn steps_score(steps: f64) -> f64 {
    (steps / STEP_GOAL).min(1.0) * 100.0
}

fn heart_rate_score(bpm: f64) -> f64 {
    let off_range = if bpm < 60.0 {
        60.0 - bpm
    } else if bpm > 80.0 {
        bpm - 80.0
    } else {
        0.0
    };
    100.0 - off_range * 4.0
}

fn blood_pressure_score(systolic: f64, diastolic: f64) -> f64 {
    if systolic > 180.0 || diastolic > 120.0 {
        10.0
    } else if systolic < 90.0 || diastolic < 60.0 {
        50.0
    } else if systolic >= 140.0 || diastolic >= 90.0 {
        30.0
    } else if systolic >= 130.0 || diastolic >= 80.0 {
        60.0
    } else if systolic >= 120.0 {
        80.0
    } else {
        100.0
    }
}
