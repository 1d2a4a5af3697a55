//! Post ingestion: validate, store the attachment, then index the post.
//!
//! The attachment upload always completes before the index write starts, so
//! a searchable document never references an object that is still being
//! uploaded. When the index write fails after a successful upload the object
//! is left behind as an orphan; it is logged and counted, not rolled back.

use resilience::with_timeout_result;
use std::sync::Arc;
use tracing::{info, warn};

use super::{BlobStore, CallTimeouts, SearchIndex};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{Attachment, IngestedPost, Location, Post, PostDocument, PostId};

#[derive(Clone)]
pub struct PostIngestionService {
    blob_store: Arc<dyn BlobStore>,
    search_index: Arc<dyn SearchIndex>,
    timeouts: CallTimeouts,
}

impl PostIngestionService {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        search_index: Arc<dyn SearchIndex>,
        timeouts: CallTimeouts,
    ) -> Self {
        Self {
            blob_store,
            search_index,
            timeouts,
        }
    }

    pub async fn ingest(
        &self,
        author: &str,
        message: &str,
        location: Location,
        attachment: Option<Attachment>,
    ) -> Result<IngestedPost> {
        let result = self.try_ingest(author, message, location, attachment).await;
        match &result {
            Ok(_) => metrics::record_post_ingested(),
            Err(err) => metrics::record_ingest_failure(err.kind()),
        }
        result
    }

    async fn try_ingest(
        &self,
        author: &str,
        message: &str,
        location: Location,
        attachment: Option<Attachment>,
    ) -> Result<IngestedPost> {
        if author.trim().is_empty() {
            return Err(AppError::Unauthenticated(
                "no caller identity for post".to_string(),
            ));
        }
        location.validate()?;

        let id = PostId::generate();
        let object_name = id.to_string();

        let attachment_url = match attachment {
            Some(attachment) => {
                let content_type = attachment.content_type().to_string();
                with_timeout_result(
                    self.timeouts.blob_upload,
                    self.blob_store
                        .put(&object_name, attachment.data, &content_type),
                )
                .await
                .map_err(|err| {
                    warn!(
                        post_id = %id,
                        timed_out = err.is_elapsed(),
                        error = %err,
                        "attachment upload failed, post not indexed"
                    );
                    AppError::from(err)
                })?
            }
            None => String::new(),
        };

        let post = Post {
            author: author.to_string(),
            message: message.to_string(),
            location,
            attachment_url,
        };
        let document = PostDocument::from(&post);

        if let Err(err) = with_timeout_result(
            self.timeouts.index_write,
            self.search_index.put_document(&object_name, &document),
        )
        .await
        {
            if err.is_elapsed() {
                // The write may still complete server side, so the attachment
                // is not known to be orphaned.
                metrics::record_index_write_timeout();
                warn!(
                    post_id = %id,
                    object = %object_name,
                    error = %err,
                    "index write timed out, outcome unknown; document may still become searchable"
                );
            } else if !post.attachment_url.is_empty() {
                metrics::record_orphaned_blob();
                warn!(
                    post_id = %id,
                    object = %object_name,
                    url = %post.attachment_url,
                    error = %err,
                    "index write failed after upload, attachment orphaned"
                );
            } else {
                warn!(post_id = %id, error = %err, "index write failed");
            }
            return Err(err.into());
        }

        info!(
            post_id = %id,
            author = %post.author,
            has_attachment = !post.attachment_url.is_empty(),
            "post ingested"
        );

        Ok(IngestedPost { id, post })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::blob_store::{BlobStoreError, MockBlobStore};
    use crate::services::search_index::{MockSearchIndex, SearchIndexError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    fn alice_location() -> Location {
        Location::new(37.0, -120.0).unwrap()
    }

    fn service(blob_store: MockBlobStore, search_index: MockSearchIndex) -> PostIngestionService {
        PostIngestionService::new(
            Arc::new(blob_store),
            Arc::new(search_index),
            CallTimeouts::default(),
        )
    }

    #[tokio::test]
    async fn ingest_without_attachment_skips_blob_store() {
        let mut blob_store = MockBlobStore::new();
        blob_store.expect_put().never();

        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        let mut search_index = MockSearchIndex::new();
        search_index
            .expect_put_document()
            .times(1)
            .returning(move |id, doc| {
                sink.lock().unwrap().push((id.to_string(), doc.clone()));
                Ok(())
            });

        let ingested = service(blob_store, search_index)
            .ingest("alice", "hello", alice_location(), None)
            .await
            .unwrap();

        assert_eq!(ingested.post.attachment_url, "");
        assert_eq!(ingested.post.author, "alice");

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, ingested.id.to_string());
        assert_eq!(written[0].1.user, "alice");
        assert_eq!(written[0].1.url, "");
    }

    #[tokio::test]
    async fn attachment_is_stored_under_post_id_before_indexing() {
        let uploaded_name = Arc::new(Mutex::new(None::<String>));
        let name_sink = uploaded_name.clone();

        let mut blob_store = MockBlobStore::new();
        blob_store
            .expect_put()
            .times(1)
            .returning(move |name, data, content_type| {
                assert_eq!(data, Bytes::from_static(b"\xff\xd8jpeg"));
                assert_eq!(content_type, "image/jpeg");
                *name_sink.lock().unwrap() = Some(name.to_string());
                Ok(format!("https://storage.googleapis.com/post-images/{name}"))
            });

        let name_seen_by_index = uploaded_name.clone();
        let mut search_index = MockSearchIndex::new();
        search_index
            .expect_put_document()
            .times(1)
            .returning(move |id, doc| {
                let uploaded = name_seen_by_index.lock().unwrap().clone();
                assert_eq!(uploaded.as_deref(), Some(id));
                assert!(doc.url.ends_with(id));
                Ok(())
            });

        let attachment = Attachment::new(
            Bytes::from_static(b"\xff\xd8jpeg"),
            Some("image/jpeg".to_string()),
        );
        let ingested = service(blob_store, search_index)
            .ingest("alice", "sunset", alice_location(), Some(attachment))
            .await
            .unwrap();

        assert_eq!(
            ingested.post.attachment_url,
            format!("https://storage.googleapis.com/post-images/{}", ingested.id)
        );
    }

    #[tokio::test]
    async fn failed_upload_never_writes_document() {
        let mut blob_store = MockBlobStore::new();
        blob_store.expect_put().times(1).returning(|_, _, _| {
            Err(BlobStoreError::Status {
                status: 403,
                body: "AccessDenied".into(),
            })
        });
        let mut search_index = MockSearchIndex::new();
        search_index.expect_put_document().never();

        let err = service(blob_store, search_index)
            .ingest(
                "alice",
                "hello",
                alice_location(),
                Some(Attachment::new(Bytes::from_static(b"img"), None)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn index_failure_after_upload_orphans_blob() {
        let before = metrics::orphaned_blobs();

        let mut blob_store = MockBlobStore::new();
        blob_store
            .expect_put()
            .times(1)
            .returning(|name, _, _| Ok(format!("memory://blobs/{name}")));
        let mut search_index = MockSearchIndex::new();
        search_index.expect_put_document().times(1).returning(|_, _| {
            Err(SearchIndexError::Status {
                status: 503,
                body: "cluster_block_exception".into(),
            })
        });

        let err = service(blob_store, search_index)
            .ingest(
                "alice",
                "hello",
                alice_location(),
                Some(Attachment::new(Bytes::from_static(b"img"), None)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::IndexUnavailable(_)));
        assert!(metrics::orphaned_blobs() > before);
    }

    #[tokio::test]
    async fn missing_author_is_unauthenticated() {
        let mut blob_store = MockBlobStore::new();
        blob_store.expect_put().never();
        let mut search_index = MockSearchIndex::new();
        search_index.expect_put_document().never();

        let err = service(blob_store, search_index)
            .ingest("  ", "hello", alice_location(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn out_of_range_location_performs_no_writes() {
        let mut blob_store = MockBlobStore::new();
        blob_store.expect_put().never();
        let mut search_index = MockSearchIndex::new();
        search_index.expect_put_document().never();
        let svc = service(blob_store, search_index);

        for (lat, lon) in [(91.0, 0.0), (-90.5, 0.0), (0.0, 181.0), (0.0, f64::INFINITY)] {
            let location = Location {
                latitude: lat,
                longitude: lon,
            };
            let err = svc
                .ingest(
                    "alice",
                    "hello",
                    location,
                    Some(Attachment::new(Bytes::from_static(b"img"), None)),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidArgument(_)), "{lat},{lon}");
        }
    }

    struct StalledBlobStore;

    #[async_trait]
    impl BlobStore for StalledBlobStore {
        async fn put(
            &self,
            _name: &str,
            _data: Bytes,
            _content_type: &str,
        ) -> std::result::Result<String, BlobStoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("never".into())
        }
    }

    #[tokio::test]
    async fn upload_timeout_is_storage_unavailable() {
        let mut search_index = MockSearchIndex::new();
        search_index.expect_put_document().never();

        let svc = PostIngestionService::new(
            Arc::new(StalledBlobStore),
            Arc::new(search_index),
            CallTimeouts {
                blob_upload: Duration::from_millis(20),
                ..CallTimeouts::default()
            },
        );

        let err = svc
            .ingest(
                "alice",
                "hello",
                alice_location(),
                Some(Attachment::new(Bytes::from_static(b"img"), None)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageUnavailable(ref msg) if msg.contains("timed out")));
    }

    struct StalledSearchIndex;

    #[async_trait]
    impl SearchIndex for StalledSearchIndex {
        async fn ensure_index(
            &self,
        ) -> std::result::Result<crate::services::IndexStatus, SearchIndexError> {
            Ok(crate::services::IndexStatus::AlreadyExists)
        }

        async fn put_document(
            &self,
            _id: &str,
            _document: &PostDocument,
        ) -> std::result::Result<(), SearchIndexError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn query_geo_distance(
            &self,
            _center: Location,
            _radius: crate::models::Radius,
            _size: usize,
        ) -> std::result::Result<Vec<crate::services::RawDocument>, SearchIndexError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn index_write_timeout_is_reported_as_unknown_outcome() {
        let before = metrics::index_write_timeouts();

        let mut blob_store = MockBlobStore::new();
        blob_store
            .expect_put()
            .times(1)
            .returning(|name, _, _| Ok(format!("memory://blobs/{name}")));

        let svc = PostIngestionService::new(
            Arc::new(blob_store),
            Arc::new(StalledSearchIndex),
            CallTimeouts {
                index_write: Duration::from_millis(20),
                ..CallTimeouts::default()
            },
        );

        let err = svc
            .ingest(
                "alice",
                "hello",
                alice_location(),
                Some(Attachment::new(Bytes::from_static(b"img"), None)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::IndexUnavailable(ref msg) if msg.contains("timed out")));
        assert!(metrics::index_write_timeouts() > before);
    }
}
