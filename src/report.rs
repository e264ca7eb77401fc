use std::fmt::Write;

use crate::models::Counselor;
use crate::risk::{RiskPass, RISK_THRESHOLD};

pub fn build_report(counselor: &Counselor, pass: &RiskPass) -> String {
    let mut output = String::new();
    let stats = &pass.stats;

    let _ = writeln!(output, "# Student Wellness Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) at {}",
        counselor.name,
        counselor.email,
        stats.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Dashboard");
    let _ = writeln!(output, "- Students: {}", stats.total_students);
    let _ = writeln!(output, "- Average wellness score: {}", stats.average_wellness_score);
    let _ = writeln!(
        output,
        "- At risk (below {}): {}",
        RISK_THRESHOLD, stats.at_risk_students
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Students");

    if pass.alerts.is_empty() {
        let _ = writeln!(output, "No students below the risk threshold.");
    } else {
        for alert in &pass.alerts {
            let _ = writeln!(
                output,
                "- {} ({}) score {} on {}",
                alert.student_name, alert.email, alert.score, alert.score_date
            );
        }
    }

    let mut unscored: Vec<&str> = pass
        .students
        .iter()
        .filter(|s| s.latest.is_none())
        .map(|s| s.student.name.as_str())
        .collect();
    unscored.sort_unstable();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Without a Score");

    if unscored.is_empty() {
        let _ = writeln!(output, "Every student has a recorded wellness score.");
    } else {
        for name in unscored {
            let _ = writeln!(output, "- {name}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Student, WellnessScoreEntry};
    use crate::risk::{at_risk, dashboard_stats, StudentScore};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn student(id: &str, name: &str, score: Option<u32>) -> StudentScore {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        StudentScore {
            student: Student {
                id: id.into(),
                name: name.into(),
                email: format!("{id}@example.com"),
                avatar: None,
                counselor_id: Some("c-1".into()),
            },
            latest: score.map(|final_score| {
                (
                    NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
                    WellnessScoreEntry {
                        sleep_score: 0.0,
                        steps_score: 0.0,
                        heart_rate_score: 0.0,
                        blood_pressure_score: 0.0,
                        final_score,
                        timestamp: now,
                    },
                )
            }),
            fetch_failed: false,
        }
    }

    fn pass(students: Vec<StudentScore>) -> RiskPass {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let alerts = at_risk(&students, now);
        let stats = dashboard_stats(&students, 0, alerts.len(), now);
        RiskPass {
            students,
            alerts,
            stats,
            unreadable: Vec::new(),
            cleared: Vec::new(),
            write_failures: 0,
        }
    }

    fn counselor() -> Counselor {
        Counselor {
            id: "c-1".into(),
            name: "Morgan Hale".into(),
            email: "morgan@example.com".into(),
        }
    }

    #[test]
    fn report_lists_risk_and_unscored_students() {
        let report = build_report(
            &counselor(),
            &pass(vec![
                student("s-1", "Avery Lee", Some(30)),
                student("s-2", "Jules Moreno", Some(50)),
                student("s-3", "Kiara Patel", None),
            ]),
        );
        assert!(report.contains("- Average wellness score: 40"));
        assert!(report.contains("- At risk (below 40): 1"));
        assert!(report.contains("- Avery Lee (s-1@example.com) score 30 on 2025-03-02"));
        assert!(report.contains("## Students Without a Score\n- Kiara Patel"));
    }

    #[test]
    fn empty_sections_say_so() {
        let report = build_report(&counselor(), &pass(vec![student("s-1", "Avery Lee", Some(88))]));
        assert!(report.contains("No students below the risk threshold."));
        assert!(report.contains("Every student has a recorded wellness score."));
    }
}
