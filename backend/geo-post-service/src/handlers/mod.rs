/// HTTP handlers for geo-post-service
///
/// - Posts: multipart ingestion and radius search, behind JWT auth
/// - Health and Prometheus metrics, unauthenticated
pub mod posts;

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::auth::JwtVerifier;
use crate::error::AppError;
use crate::metrics::serve_metrics;
use crate::middleware::JwtAuthMiddleware;

pub use posts::{create_post, search_posts, SearchQuery, UploadLimits};

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        AppError::InvalidArgument(format!("invalid query string: {err}")).into()
    })
}

/// Register every route. Services and [`UploadLimits`] must already be in app data.
pub fn configure(verifier: Arc<JwtVerifier>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.route("/health", web::get().to(health))
            .route("/health/live", web::get().to(|| async { HttpResponse::Ok().finish() }))
            .route("/health/ready", web::get().to(|| async { HttpResponse::Ok().finish() }))
            .route("/metrics", web::get().to(serve_metrics))
            .service(
                web::scope("")
                    .wrap(JwtAuthMiddleware::new(verifier))
                    .app_data(query_config())
                    .route("/post", web::post().to(create_post))
                    .route("/search", web::get().to(search_posts)),
            );
    }
}
