//! Document-store seam.
//!
//! Every component receives a [`DocumentStore`] explicitly instead of reaching
//! for a shared client. Documents are JSON objects addressed by a collection
//! path and an id; nested sub-collections are plain collection paths such as
//! `students/s-1/sensorData`.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::MetricKind;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub const STUDENTS: &str = "students";
pub const COUNSELORS: &str = "counselors";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Collection path of a sub-collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> String {
        format!("{}/{}/{}", self.collection, self.id, name)
    }

    pub fn child(&self, sub_collection: &str, id: impl Into<String>) -> DocPath {
        DocPath::new(self.sub_collection(sub_collection), id)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Documents whose top-level `field` equals `value`, ordered by id.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Upsert merging top-level fields of `data` into the stored document.
    async fn set_merge(&self, path: &DocPath, data: Value) -> Result<(), StoreError>;

    /// Appends the items not already present to the array at `field`.
    async fn array_union(
        &self,
        path: &DocPath,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError>;

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;
}

pub fn decode<T: DeserializeOwned>(path: &DocPath, data: Value) -> Result<T, StoreError> {
    serde_json::from_value(data).map_err(|source| StoreError::Decode {
        path: path.to_string(),
        source,
    })
}

pub fn encode<T: serde::Serialize>(path: &DocPath, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Encode {
        path: path.to_string(),
        source,
    })
}

pub mod paths {
    use super::*;

    pub fn student(student_id: &str) -> DocPath {
        DocPath::new(STUDENTS, student_id)
    }

    pub fn counselor(counselor_id: &str) -> DocPath {
        DocPath::new(COUNSELORS, counselor_id)
    }

    pub fn sensor(student_id: &str, kind: MetricKind) -> DocPath {
        student(student_id).child("sensorData", kind.key())
    }

    pub fn scores(student_id: &str) -> DocPath {
        student(student_id).child("wellnessScore", "scores")
    }

    pub fn alerts(counselor_id: &str) -> String {
        counselor(counselor_id).sub_collection("activeAlerts")
    }

    pub fn alert(counselor_id: &str, student_id: &str) -> DocPath {
        DocPath::new(alerts(counselor_id), student_id)
    }

    pub fn stats(counselor_id: &str) -> DocPath {
        counselor(counselor_id).child("dashboard", "stats")
    }
}
