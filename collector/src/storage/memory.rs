//! In-process object store used by tests and local dry runs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, PoisonError};

use super::{ListPage, ObjectStorage, ObjectSummary};

#[derive(Debug, Clone)]
enum Access {
    Allowed(Bytes),
    Denied,
}

#[derive(Debug, Clone)]
struct StoredObject {
    access: Access,
    size: u64,
    last_modified: DateTime<Utc>,
}

/// Keys are listed in lexicographic order, `page_size` per page, with the
/// last returned key acting as the continuation token.
#[derive(Debug)]
pub struct MemoryStorage {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            page_size: 1000,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    pub fn put(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let body = body.into();
        let object = StoredObject {
            size: body.len() as u64,
            access: Access::Allowed(body),
            last_modified,
        };
        self.insert(bucket, key, object);
    }

    pub fn put_json(
        &self,
        bucket: &str,
        key: &str,
        value: &serde_json::Value,
        last_modified: DateTime<Utc>,
    ) {
        self.put(bucket, key, value.to_string(), last_modified);
    }

    /// Lists the object normally but rejects every read with access-denied.
    pub fn put_denied(&self, bucket: &str, key: &str, last_modified: DateTime<Utc>) {
        let object = StoredObject {
            access: Access::Denied,
            size: 0,
            last_modified,
        };
        self.insert(bucket, key, object);
    }

    pub fn remove(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.lock().get_mut(bucket) {
            objects.remove(key);
        }
    }

    fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, StoredObject>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let buckets = self.lock();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("bucket {}", bucket)))?;

        let lower = match &continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };

        let mut page: Vec<ObjectSummary> = objects
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                last_modified: object.last_modified,
                size: object.size,
            })
            .collect();

        let next_token = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|object| object.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let buckets = self.lock();
        let object = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| Error::NotFound(format!("memory://{}/{}", bucket, key)))?;

        match &object.access {
            Access::Allowed(body) => Ok(body.clone()),
            Access::Denied => Err(Error::AccessDenied(format!("memory://{}/{}", bucket, key))),
        }
    }
}
