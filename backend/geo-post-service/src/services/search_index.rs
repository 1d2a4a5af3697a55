use async_trait::async_trait;
use elasticsearch::{
    http::transport::{BuildError, SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::Refresh,
    Elasticsearch, IndexParts, SearchParts,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::models::{Location, PostDocument, Radius};

#[derive(Debug, Error)]
pub enum SearchIndexError {
    #[error("invalid Elasticsearch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),
    #[error("transport error: {0}")]
    Transport(#[from] elasticsearch::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("search index returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("search index backend failure: {0}")]
    Backend(String),
}

/// Outcome of [`SearchIndex::ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    AlreadyExists,
}

/// A hit as returned by the index, before schema decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub source: Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the post index with a geo-point mapping unless it already exists.
    async fn ensure_index(&self) -> Result<IndexStatus, SearchIndexError>;

    /// Write or overwrite a document, visible to queries once this returns.
    async fn put_document(&self, id: &str, document: &PostDocument)
        -> Result<(), SearchIndexError>;

    /// Every document whose geo field lies within `radius` of `center`.
    async fn query_geo_distance(
        &self,
        center: Location,
        radius: Radius,
        size: usize,
    ) -> Result<Vec<RawDocument>, SearchIndexError>;
}

#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Elasticsearch,
    index: String,
    geo_field: String,
}

impl ElasticsearchIndex {
    pub fn new(url: &str, index: &str) -> Result<Self, SearchIndexError> {
        let parsed = Url::parse(url)?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(pool).build()?;
        let client = Elasticsearch::new(transport);

        Ok(Self {
            client,
            index: index.to_string(),
            geo_field: PostDocument::GEO_FIELD.to_string(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn mapping(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(self.geo_field.clone(), json!({ "type": "geo_point" }));
        properties.insert("user".to_string(), json!({ "type": "keyword" }));
        properties.insert("message".to_string(), json!({ "type": "text" }));
        properties.insert("url".to_string(), json!({ "type": "keyword", "index": false }));

        json!({ "mappings": { "properties": properties } })
    }

    fn geo_distance_query(&self, center: Location, radius: Radius, size: usize) -> Value {
        let mut filter = serde_json::Map::new();
        filter.insert("distance".to_string(), json!(radius.to_query_distance()));
        filter.insert(
            self.geo_field.clone(),
            json!({ "lat": center.latitude, "lon": center.longitude }),
        );

        json!({
            "size": size,
            "query": {
                "bool": {
                    "filter": { "geo_distance": filter }
                }
            }
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ensure_index(&self) -> Result<IndexStatus, SearchIndexError> {
        let exists_response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await?;

        let status = exists_response.status_code();
        if status.is_success() {
            debug!(index = %self.index, "search index already exists");
            return Ok(IndexStatus::AlreadyExists);
        }
        if status.as_u16() != 404 {
            return Err(SearchIndexError::Status {
                status: status.as_u16(),
                body: exists_response.text().await.unwrap_or_default(),
            });
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(self.mapping())
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %self.index, geo_field = %self.geo_field, "search index created");
            return Ok(IndexStatus::Created);
        }

        let body = response.text().await.unwrap_or_default();
        // Another instance created it between our exists check and create
        if body.contains("resource_already_exists_exception") {
            return Ok(IndexStatus::AlreadyExists);
        }
        Err(SearchIndexError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn put_document(
        &self,
        id: &str,
        document: &PostDocument,
    ) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index, id))
            .refresh(Refresh::True)
            .body(document)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchIndexError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        debug!(index = %self.index, id = %id, "document indexed");
        Ok(())
    }

    async fn query_geo_distance(
        &self,
        center: Location,
        radius: Radius,
        size: usize,
    ) -> Result<Vec<RawDocument>, SearchIndexError> {
        let response = self
            .client
            .search(SearchParts::Index(&[self.index.as_str()]))
            .body(self.geo_distance_query(center, radius, size))
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchIndexError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let search_response: SearchResponse = response.json().await?;
        debug!(
            index = %self.index,
            took_ms = search_response.took,
            hits = search_response.hits.hits.len(),
            "geo distance query completed"
        );

        Ok(search_response
            .hits
            .hits
            .into_iter()
            .map(|hit| RawDocument {
                id: hit.id,
                source: hit.source,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    took: u64,
    hits: InnerHits,
}

#[derive(Debug, Deserialize)]
struct InnerHits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}
