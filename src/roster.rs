use serde_json::json;
use tracing::{info, warn};

use crate::error::{StoreError, WellnessError};
use crate::models::{Counselor, Student};
use crate::session::{load_counselor, load_student};
use crate::store::{decode, paths, DocPath, DocumentStore, STUDENTS};

/// A counselor's assigned students. Documents that matched the assignment
/// but failed to decode are kept by id so they still count as assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub students: Vec<Student>,
    pub unreadable: Vec<String>,
}

/// Students whose `counselorId` names this counselor, in store order.
pub async fn assigned_students(
    store: &dyn DocumentStore,
    counselor_id: &str,
) -> Result<Roster, StoreError> {
    let docs = store
        .query_eq(STUDENTS, "counselorId", &json!(counselor_id))
        .await?;
    let mut roster = Roster {
        students: Vec::with_capacity(docs.len()),
        unreadable: Vec::new(),
    };
    for doc in docs {
        let path = DocPath::new(STUDENTS, doc.id.as_str());
        match decode::<Student>(&path, doc.data) {
            Ok(mut student) => {
                student.id = doc.id;
                roster.students.push(student);
            }
            Err(e) => {
                warn!(error = %e, student_id = %doc.id, "assigned student is malformed");
                roster.unreadable.push(doc.id);
            }
        }
    }
    Ok(roster)
}

/// Points the student at this counselor, replacing any previous assignment.
pub async fn claim_student(
    store: &dyn DocumentStore,
    counselor: &Counselor,
    student_id: &str,
) -> Result<Student, WellnessError> {
    let Some(mut student) = load_student(store, student_id).await? else {
        return Err(WellnessError::InvalidInput(format!("no student with id {student_id}")));
    };
    if load_counselor(store, &counselor.id).await?.is_none() {
        return Err(WellnessError::NotACounselor(counselor.id.clone()));
    }

    store
        .set_merge(&paths::student(student_id), json!({ "counselorId": counselor.id }))
        .await?;
    if let Some(previous) = student.counselor_id.as_deref().filter(|p| *p != counselor.id) {
        info!(student_id, previous, counselor_id = %counselor.id, "student reassigned");
    } else {
        info!(student_id, counselor_id = %counselor.id, "student claimed");
    }
    student.counselor_id = Some(counselor.id.clone());
    Ok(student)
}

/// Fails unless the student is currently assigned to the counselor.
pub async fn ensure_assigned(
    store: &dyn DocumentStore,
    counselor: &Counselor,
    student_id: &str,
) -> Result<Student, WellnessError> {
    match load_student(store, student_id).await? {
        Some(student) if student.counselor_id.as_deref() == Some(counselor.id.as_str()) => Ok(student),
        _ => Err(WellnessError::NotAssigned {
            student_id: student_id.to_string(),
            counselor_id: counselor.id.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn counselor(id: &str) -> Counselor {
        Counselor {
            id: id.to_string(),
            name: "Dana Cole".into(),
            email: "dana@example.com".into(),
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(&paths::counselor("c-1"), json!({"name": "Dana Cole", "email": "dana@example.com"}));
        store.insert(&paths::counselor("c-2"), json!({"name": "Sam Ortiz", "email": "sam@example.com"}));
        store.insert(&paths::student("s-1"), json!({"name": "Avery", "email": "a@example.com", "counselorId": "c-1"}));
        store.insert(&paths::student("s-2"), json!({"name": "Jules", "email": "j@example.com", "counselorId": "c-2"}));
        store.insert(&paths::student("s-3"), json!({"name": "Kiara", "email": "k@example.com"}));
        store
    }

    #[tokio::test]
    async fn lists_only_assigned_students() {
        let store = seeded();
        let roster = assigned_students(&store, "c-1").await.unwrap();
        let ids: Vec<&str> = roster.students.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s-1"]);
        assert!(roster.unreadable.is_empty());
    }

    #[tokio::test]
    async fn malformed_assigned_students_still_count() {
        let store = seeded();
        store.insert(&paths::student("s-4"), json!({"name": "No Email", "counselorId": "c-1"}));
        let roster = assigned_students(&store, "c-1").await.unwrap();
        assert_eq!(roster.students.len(), 1);
        assert_eq!(roster.unreadable, vec!["s-4".to_string()]);
    }

    #[tokio::test]
    async fn claiming_moves_the_student() {
        let store = seeded();
        let claimed = claim_student(&store, &counselor("c-1"), "s-3").await.unwrap();
        assert_eq!(claimed.counselor_id.as_deref(), Some("c-1"));
        let ids: Vec<String> = assigned_students(&store, "c-1")
            .await
            .unwrap()
            .students
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s-1".to_string(), "s-3".to_string()]);

        claim_student(&store, &counselor("c-1"), "s-2").await.unwrap();
        assert!(assigned_students(&store, "c-2").await.unwrap().students.is_empty());
        assert_eq!(
            store.snapshot(&paths::student("s-2")).unwrap()["name"],
            json!("Jules")
        );
    }

    #[tokio::test]
    async fn claiming_unknown_student_fails() {
        let store = seeded();
        let err = claim_student(&store, &counselor("c-1"), "s-404").await.unwrap_err();
        assert!(matches!(err, WellnessError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn assignment_is_checked_before_counselor_access() {
        let store = seeded();
        assert!(ensure_assigned(&store, &counselor("c-1"), "s-1").await.is_ok());
        assert!(matches!(
            ensure_assigned(&store, &counselor("c-1"), "s-2").await,
            Err(WellnessError::NotAssigned { .. })
        ));
    }
}
