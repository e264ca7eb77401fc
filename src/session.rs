use tracing::debug;

use crate::error::WellnessError;
use crate::models::{Counselor, Role, Student};
use crate::store::{decode, paths, DocumentStore};

/// The signed-in user. Holding one is the precondition for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn from_user(user: Option<&str>) -> Result<Self, WellnessError> {
        match user.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(Self {
                user_id: id.to_string(),
            }),
            _ => Err(WellnessError::Unauthenticated),
        }
    }
}

pub async fn load_student(
    store: &dyn DocumentStore,
    student_id: &str,
) -> Result<Option<Student>, WellnessError> {
    let path = paths::student(student_id);
    let Some(doc) = store.get(&path).await? else {
        return Ok(None);
    };
    let mut student: Student = decode(&path, doc)?;
    student.id = student_id.to_string();
    Ok(Some(student))
}

pub async fn load_counselor(
    store: &dyn DocumentStore,
    counselor_id: &str,
) -> Result<Option<Counselor>, WellnessError> {
    let path = paths::counselor(counselor_id);
    let Some(doc) = store.get(&path).await? else {
        return Ok(None);
    };
    let mut counselor: Counselor = decode(&path, doc)?;
    counselor.id = counselor_id.to_string();
    Ok(Some(counselor))
}

pub async fn resolve_role(store: &dyn DocumentStore, session: &Session) -> Result<Role, WellnessError> {
    let role = if let Some(student) = load_student(store, &session.user_id).await? {
        Role::Student(student)
    } else if let Some(counselor) = load_counselor(store, &session.user_id).await? {
        Role::Counselor(counselor)
    } else {
        return Err(WellnessError::UnknownUser(session.user_id.clone()));
    };
    debug!(user_id = %session.user_id, role = role.label(), "role resolved");
    Ok(role)
}

pub async fn require_counselor(
    store: &dyn DocumentStore,
    session: &Session,
) -> Result<Counselor, WellnessError> {
    match resolve_role(store, session).await? {
        Role::Counselor(counselor) => Ok(counselor),
        Role::Student(student) => Err(WellnessError::NotACounselor(student.id)),
    }
}

pub async fn require_student(
    store: &dyn DocumentStore,
    session: &Session,
) -> Result<Student, WellnessError> {
    match resolve_role(store, session).await? {
        Role::Student(student) => Ok(student),
        Role::Counselor(counselor) => Err(WellnessError::NotAStudent(counselor.id)),
    }
}
