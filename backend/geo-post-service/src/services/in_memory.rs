//! In-process adapters for local runs and tests.
//!
//! They honour the same contracts as the remote adapters: objects are
//! publicly addressable once `put` returns, writes are immediately visible,
//! and geo queries fail until the index has been ensured.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::blob_store::{BlobStore, BlobStoreError};
use super::search_index::{IndexStatus, RawDocument, SearchIndex, SearchIndexError};
use crate::models::{Location, PostDocument, Radius};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

pub struct InMemoryBlobStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(name).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, BlobStoreError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| BlobStoreError::Backend("object map lock poisoned".into()))?;
        objects.insert(
            name.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.base_url, name))
    }
}

#[derive(Default)]
pub struct InMemorySearchIndex {
    exists: AtomicBool,
    documents: RwLock<HashMap<String, Value>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw `_source`, bypassing the typed schema.
    pub fn insert_raw(&self, id: impl Into<String>, source: Value) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(id.into(), source);
        }
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.documents
            .read()
            .ok()
            .and_then(|documents| documents.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .map(|documents| documents.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn require_index(&self) -> Result<(), SearchIndexError> {
        if self.exists.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SearchIndexError::Status {
                status: 404,
                body: "index_not_found_exception".into(),
            })
        }
    }
}

/// Geo point of a stored source, if it has a usable one.
fn geo_point(source: &Value) -> Option<Location> {
    let point = source.get(PostDocument::GEO_FIELD)?;
    let lat = point.get("lat")?.as_f64()?;
    let lon = point.get("lon")?.as_f64()?;
    Location::new(lat, lon).ok()
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn ensure_index(&self) -> Result<IndexStatus, SearchIndexError> {
        let was_present = self.exists.swap(true, Ordering::AcqRel);
        Ok(if was_present {
            IndexStatus::AlreadyExists
        } else {
            IndexStatus::Created
        })
    }

    async fn put_document(
        &self,
        id: &str,
        document: &PostDocument,
    ) -> Result<(), SearchIndexError> {
        self.require_index()?;
        let source = serde_json::to_value(document)?;
        let mut documents = self
            .documents
            .write()
            .map_err(|_| SearchIndexError::Backend("document map lock poisoned".into()))?;
        documents.insert(id.to_string(), source);
        Ok(())
    }

    async fn query_geo_distance(
        &self,
        center: Location,
        radius: Radius,
        size: usize,
    ) -> Result<Vec<RawDocument>, SearchIndexError> {
        self.require_index()?;
        let documents = self
            .documents
            .read()
            .map_err(|_| SearchIndexError::Backend("document map lock poisoned".into()))?;

        Ok(documents
            .iter()
            .filter(|(_, source)| {
                geo_point(source)
                    .map(|point| point.distance_km(&center) <= radius.km())
                    .unwrap_or(false)
            })
            .take(size)
            .map(|(id, source)| RawDocument {
                id: id.clone(),
                source: source.clone(),
            })
            .collect())
    }
}
