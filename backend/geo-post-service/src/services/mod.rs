/// Business logic and the adapters it talks through
pub mod blob_store;
pub mod geo_search;
pub mod in_memory;
pub mod ingestion;
pub mod search_index;

use std::time::Duration;

pub use blob_store::{BlobStore, BlobStoreError, GcsBlobStore};
pub use geo_search::GeoSearchService;
pub use in_memory::{InMemoryBlobStore, InMemorySearchIndex};
pub use ingestion::PostIngestionService;
pub use search_index::{ElasticsearchIndex, IndexStatus, RawDocument, SearchIndex, SearchIndexError};

/// Upper bounds for each external call made while serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub blob_upload: Duration,
    pub index_write: Duration,
    pub index_query: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            blob_upload: Duration::from_secs(30),
            index_write: Duration::from_secs(5),
            index_query: Duration::from_secs(5),
        }
    }
}
