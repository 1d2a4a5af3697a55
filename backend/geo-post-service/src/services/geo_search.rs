use resilience::with_timeout_result;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CallTimeouts, SearchIndex};
use crate::error::Result;
use crate::metrics;
use crate::models::{Location, Post, Radius};

/// Elasticsearch's default `index.max_result_window`.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// Finds posts within a radius of a point.
///
/// Results are fully materialized and carry no ordering guarantee. Hits that
/// do not decode as posts are dropped, logged and counted instead of failing
/// the whole search.
#[derive(Clone)]
pub struct GeoSearchService {
    search_index: Arc<dyn SearchIndex>,
    timeouts: CallTimeouts,
    default_radius: Radius,
    max_results: usize,
}

impl GeoSearchService {
    pub fn new(search_index: Arc<dyn SearchIndex>, timeouts: CallTimeouts) -> Self {
        Self {
            search_index,
            timeouts,
            default_radius: Radius::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_default_radius(mut self, radius: Radius) -> Self {
        self.default_radius = radius;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn default_radius(&self) -> Radius {
        self.default_radius
    }

    pub async fn search(&self, center: Location, radius: Radius) -> Result<Vec<Post>> {
        center.validate()?;

        let hits = with_timeout_result(
            self.timeouts.index_query,
            self.search_index
                .query_geo_distance(center, radius, self.max_results),
        )
        .await
        .map_err(|err| {
            warn!(error = %err, "geo distance query failed");
            err
        })?;
        metrics::record_search();

        let total = hits.len();
        let posts: Vec<Post> = hits
            .into_iter()
            .filter_map(|hit| match Post::decode(&hit.source) {
                Ok(post) => Some(post),
                Err(err) => {
                    metrics::record_skipped_document();
                    warn!(document_id = %hit.id, error = %err, "skipping malformed post document");
                    None
                }
            })
            .collect();

        info!(
            lat = center.latitude,
            lon = center.longitude,
            radius_km = radius.km(),
            hits = total,
            returned = posts.len(),
            "geo search completed"
        );

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::search_index::{MockSearchIndex, RawDocument, SearchIndexError};
    use serde_json::json;

    fn center() -> Location {
        Location::new(37.0, -120.0).unwrap()
    }

    #[tokio::test]
    async fn invalid_center_issues_no_query() {
        let mut index = MockSearchIndex::new();
        index.expect_query_geo_distance().never();
        let service = GeoSearchService::new(Arc::new(index), CallTimeouts::default());

        let err = service
            .search(
                Location {
                    latitude: 91.0,
                    longitude: 0.0,
                },
                Radius::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn query_uses_radius_and_result_cap() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query_geo_distance()
            .times(1)
            .withf(|c, r, size| *c == center() && r.km() == 1.0 && *size == 250)
            .returning(|_, _, _| Ok(Vec::new()));

        let service = GeoSearchService::new(Arc::new(index), CallTimeouts::default())
            .with_max_results(250);
        let posts = service
            .search(center(), Radius::from_km(1.0).unwrap())
            .await
            .unwrap();

        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped_and_counted() {
        let before = metrics::skipped_documents();

        let mut index = MockSearchIndex::new();
        index.expect_query_geo_distance().returning(|_, _, _| {
            Ok(vec![
                RawDocument {
                    id: "good".into(),
                    source: json!({
                        "user": "alice",
                        "message": "hello",
                        "location": { "lat": 37.0, "lon": -120.0 },
                        "url": ""
                    }),
                },
                RawDocument {
                    id: "legacy".into(),
                    source: json!({ "user": 42, "location": "somewhere" }),
                },
            ])
        });

        let service = GeoSearchService::new(Arc::new(index), CallTimeouts::default());
        let posts = service.search(center(), Radius::default()).await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, "alice");
        assert_eq!(posts[0].attachment_url, "");
        assert!(metrics::skipped_documents() > before);
    }

    #[tokio::test]
    async fn index_failure_is_index_unavailable() {
        let mut index = MockSearchIndex::new();
        index.expect_query_geo_distance().returning(|_, _, _| {
            Err(SearchIndexError::Status {
                status: 400,
                body: "failed to find geo field [location]".into(),
            })
        });

        let service = GeoSearchService::new(Arc::new(index), CallTimeouts::default());
        let err = service
            .search(center(), Radius::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::IndexUnavailable(_)));
    }

    #[test]
    fn default_radius_is_configurable() {
        let service = GeoSearchService::new(
            Arc::new(MockSearchIndex::new()),
            CallTimeouts::default(),
        );
        assert_eq!(service.default_radius().km(), 200.0);

        let service = service.with_default_radius(Radius::from_km(50.0).unwrap());
        assert_eq!(service.default_radius().km(), 50.0);
    }
}
