use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::error::{StoreError, WellnessError};
use crate::models::{ActiveAlert, DashboardStats, Student, WellnessScoreEntry};
use crate::roster;
use crate::store::{encode, paths, DocumentStore};
use crate::wellness;

/// Latest wellness scores strictly below this flag a student.
pub const RISK_THRESHOLD: u32 = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct StudentScore {
    pub student: Student,
    pub latest: Option<(NaiveDate, WellnessScoreEntry)>,
    /// The score could not be read this pass, so `latest` says nothing.
    pub fetch_failed: bool,
}

impl StudentScore {
    pub fn final_score(&self) -> Option<u32> {
        self.latest.as_ref().map(|(_, entry)| entry.final_score)
    }
}

/// Outcome of one materialization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPass {
    pub students: Vec<StudentScore>,
    /// Lowest score first.
    pub alerts: Vec<ActiveAlert>,
    pub stats: DashboardStats,
    /// Assigned students whose profile could not be decoded.
    pub unreadable: Vec<String>,
    /// Students whose previous alert was removed because they recovered.
    pub cleared: Vec<String>,
    pub write_failures: usize,
}

pub fn is_at_risk(score: Option<u32>) -> bool {
    matches!(score, Some(s) if s < RISK_THRESHOLD)
}

/// At-risk students sorted ascending by score; the sort is stable so equal
/// scores keep their input order.
pub fn at_risk(students: &[StudentScore], flagged_at: DateTime<Utc>) -> Vec<ActiveAlert> {
    let mut alerts: Vec<ActiveAlert> = students
        .iter()
        .filter_map(|s| {
            let (date, entry) = s.latest.as_ref()?;
            is_at_risk(Some(entry.final_score)).then(|| ActiveAlert {
                student_id: s.student.id.clone(),
                student_name: s.student.name.clone(),
                score: entry.final_score,
                email: s.student.email.clone(),
                flagged_at,
                score_date: *date,
            })
        })
        .collect();
    alerts.sort_by_key(|a| a.score);
    alerts
}

/// `unreadable` assigned students count toward the total but not the average.
pub fn dashboard_stats(
    students: &[StudentScore],
    unreadable: usize,
    at_risk_students: usize,
    last_updated: DateTime<Utc>,
) -> DashboardStats {
    let scores: Vec<u32> = students.iter().filter_map(StudentScore::final_score).collect();
    let average_wellness_score = if scores.is_empty() {
        0
    } else {
        let total: u64 = scores.iter().map(|s| u64::from(*s)).sum();
        (total as f64 / scores.len() as f64).round() as u32
    };
    DashboardStats {
        average_wellness_score,
        total_students: students.len() + unreadable,
        at_risk_students,
        last_updated,
    }
}

/// Fetches every student's latest score concurrently. A failed fetch leaves
/// that student without a score; results keep the input order.
async fn latest_scores(store: &Arc<dyn DocumentStore>, students: Vec<Student>) -> Vec<StudentScore> {
    let handles: Vec<_> = students
        .iter()
        .map(|student| {
            let store = Arc::clone(store);
            let student_id = student.id.clone();
            tokio::spawn(async move { wellness::latest_entry(store.as_ref(), &student_id).await })
        })
        .collect();

    let mut scored = Vec::with_capacity(students.len());
    for (student, handle) in students.into_iter().zip(handles) {
        let (latest, fetch_failed) = match handle.await {
            Ok(Ok(latest)) => (latest, false),
            Ok(Err(e)) => {
                warn!(error = %e, student_id = %student.id, "score fetch failed; treating as no score");
                (None, true)
            }
            Err(e) => {
                warn!(error = %e, student_id = %student.id, "score fetch task aborted");
                (None, true)
            }
        };
        scored.push(StudentScore {
            student,
            latest,
            fetch_failed,
        });
    }
    scored
}

/// Recomputes a counselor's active alerts and dashboard stats and writes them
/// back. Only a failed student listing aborts the pass; individual write
/// failures are logged and counted, and the next pass overwrites them.
#[instrument(skip(store))]
pub async fn materialize(
    store: Arc<dyn DocumentStore>,
    counselor_id: &str,
    now: DateTime<Utc>,
) -> Result<RiskPass, WellnessError> {
    let roster = roster::assigned_students(store.as_ref(), counselor_id)
        .await
        .map_err(|source| WellnessError::StudentList {
            counselor_id: counselor_id.to_string(),
            source,
        })?;

    let scored = latest_scores(&store, roster.students).await;
    let alerts = at_risk(&scored, now);
    let mut write_failures = 0;

    for alert in &alerts {
        let path = paths::alert(counselor_id, &alert.student_id);
        let result = match encode(&path, alert) {
            Ok(doc) => store.set_merge(&path, doc).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            write_failures += 1;
            warn!(error = %e, student_id = %alert.student_id, "could not write alert");
        }
    }

    // Alerts of students whose state is unknown this pass stay in place.
    let mut keep: HashSet<&str> = alerts.iter().map(|a| a.student_id.as_str()).collect();
    keep.extend(
        scored
            .iter()
            .filter(|s| s.fetch_failed)
            .map(|s| s.student.id.as_str()),
    );
    keep.extend(roster.unreadable.iter().map(String::as_str));

    let cleared = match clear_recovered(store.as_ref(), counselor_id, &keep).await {
        Ok((cleared, failures)) => {
            write_failures += failures;
            cleared
        }
        Err(e) => {
            write_failures += 1;
            warn!(error = %e, counselor_id, "could not list existing alerts");
            Vec::new()
        }
    };

    let stats = dashboard_stats(&scored, roster.unreadable.len(), alerts.len(), now);
    let stats_path = paths::stats(counselor_id);
    let result = match encode(&stats_path, &stats) {
        Ok(doc) => store.set_merge(&stats_path, doc).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        write_failures += 1;
        warn!(error = %e, counselor_id, "could not write dashboard stats");
    }

    info!(
        counselor_id,
        total = stats.total_students,
        at_risk = stats.at_risk_students,
        average = stats.average_wellness_score,
        cleared = cleared.len(),
        write_failures,
        "risk pass complete"
    );

    Ok(RiskPass {
        students: scored,
        alerts,
        stats,
        unreadable: roster.unreadable,
        cleared,
        write_failures,
    })
}

/// Deletes stored alerts for every student not in `keep`.
async fn clear_recovered(
    store: &dyn DocumentStore,
    counselor_id: &str,
    keep: &HashSet<&str>,
) -> Result<(Vec<String>, usize), StoreError> {
    let existing = store.list(&paths::alerts(counselor_id)).await?;
    let mut cleared = Vec::new();
    let mut failures = 0;
    for doc in existing {
        if keep.contains(doc.id.as_str()) {
            continue;
        }
        match store.delete(&paths::alert(counselor_id, &doc.id)).await {
            Ok(()) => cleared.push(doc.id),
            Err(e) => {
                failures += 1;
                warn!(error = %e, student_id = %doc.id, "could not clear recovered alert");
            }
        }
    }
    Ok((cleared, failures))
}

/// Local date `since_days` ago; windows are at least one day.
pub fn cutoff_date(since_days: i64) -> NaiveDate {
    Local::now().date_naive() - Duration::days(since_days.max(1))
}
