use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed document at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not serialize document for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("merge payload for {0} must be a JSON object")]
    NotAnObject(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum WellnessError {
    #[error("no current user; pass --as <id> or set WELLNESS_USER")]
    Unauthenticated,
    #[error("user {0} is neither a student nor a counselor")]
    UnknownUser(String),
    #[error("user {0} is not a student")]
    NotAStudent(String),
    #[error("user {0} is not a counselor")]
    NotACounselor(String),
    #[error("student {student_id} is not assigned to counselor {counselor_id}")]
    NotAssigned {
        student_id: String,
        counselor_id: String,
    },
    #[error("could not list students for counselor {counselor_id}: {source}")]
    StudentList {
        counselor_id: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
