use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{DocPath, Document, DocumentStore};
use crate::error::StoreError;

/// In-process store for tests. Reads or writes under a path prefix can be
/// made to fail to exercise the degraded paths of the pipeline.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    failing_reads: Mutex<Vec<String>>,
    failing_writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads_under(&self, prefix: &str) {
        self.failing_reads.lock().unwrap().push(prefix.to_string());
    }

    pub fn fail_writes_under(&self, prefix: &str) {
        self.failing_writes.lock().unwrap().push(prefix.to_string());
    }

    pub fn insert(&self, path: &DocPath, data: Value) {
        self.collections
            .lock()
            .unwrap()
            .entry(path.collection().to_string())
            .or_default()
            .insert(path.id().to_string(), data);
    }

    pub fn snapshot(&self, path: &DocPath) -> Option<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()).cloned())
    }

    fn check(list: &Mutex<Vec<String>>, target: &str) -> Result<(), StoreError> {
        if list.lock().unwrap().iter().any(|p| target.starts_with(p)) {
            return Err(StoreError::Unavailable(format!("injected failure at {target}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        Self::check(&self.failing_reads, &path.to_string())?;
        Ok(self.snapshot(path))
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        Self::check(&self.failing_reads, collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| data.get(field) == Some(value))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        Self::check(&self.failing_reads, collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_merge(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        Self::check(&self.failing_writes, &path.to_string())?;
        let Value::Object(fields) = data else {
            return Err(StoreError::NotAnObject(path.to_string()));
        };
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .entry(path.collection().to_string())
            .or_default()
            .entry(path.id().to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(existing) = doc {
            existing.extend(fields);
        } else {
            *doc = Value::Object(fields);
        }
        Ok(())
    }

    async fn array_union(
        &self,
        path: &DocPath,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError> {
        Self::check(&self.failing_writes, &path.to_string())?;
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .entry(path.collection().to_string())
            .or_default()
            .entry(path.id().to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        let Value::Object(existing) = doc else {
            return Err(StoreError::NotAnObject(path.to_string()));
        };
        let slot = existing
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(array) = slot {
            for item in items {
                if !array.contains(&item) {
                    array.push(item);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        Self::check(&self.failing_writes, &path.to_string())?;
        if let Some(docs) = self.collections.lock().unwrap().get_mut(path.collection()) {
            docs.remove(path.id());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = MemoryStore::new();
        let path = DocPath::new("students", "s-1");
        store
            .set_merge(&path, json!({"name": "Avery", "email": "a@x.io"}))
            .await
            .unwrap();
        store
            .set_merge(&path, json!({"counselorId": "c-1"}))
            .await
            .unwrap();
        assert_eq!(
            store.get(&path).await.unwrap(),
            Some(json!({"name": "Avery", "email": "a@x.io", "counselorId": "c-1"}))
        );
    }

    #[tokio::test]
    async fn array_union_skips_duplicates() {
        let store = MemoryStore::new();
        let path = DocPath::new("students/s-1/sensorData", "steps");
        store
            .array_union(&path, "2025-03-02", vec![json!(1), json!(2)])
            .await
            .unwrap();
        store
            .array_union(&path, "2025-03-02", vec![json!(2), json!(3)])
            .await
            .unwrap();
        assert_eq!(
            store.snapshot(&path),
            Some(json!({"2025-03-02": [1, 2, 3]}))
        );
    }

    #[tokio::test]
    async fn injected_failures_only_hit_matching_paths() {
        let store = MemoryStore::new();
        store.fail_reads_under("students/s-2");
        store.insert(&DocPath::new("students", "s-1"), json!({}));
        assert!(store.get(&DocPath::new("students", "s-1")).await.is_ok());
        assert!(store.get(&DocPath::new("students", "s-2")).await.is_err());
    }
}
