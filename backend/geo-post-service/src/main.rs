/// Geo Post Service - HTTP Server
///
/// Ingests geotagged posts and serves radius searches over them.
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use geo_post_service::auth::JwtVerifier;
use geo_post_service::config::{Backend, Config, CorsConfig};
use geo_post_service::handlers::{self, UploadLimits};
use geo_post_service::services::{
    BlobStore, ElasticsearchIndex, GcsBlobStore, GeoSearchService, InMemoryBlobStore,
    InMemorySearchIndex, PostIngestionService, SearchIndex,
};
use geo_post_service::{logging, metrics};
use resilience::with_timeout_result;
use std::io;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    metrics::init_metrics();

    run().await.map_err(|err| {
        tracing::error!(error = %format!("{err:#}"), "geo-post-service failed");
        io::Error::new(io::ErrorKind::Other, format!("{err:#}"))
    })
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let timeouts = config.timeouts.call_timeouts();

    let (blob_store, search_index): (Arc<dyn BlobStore>, Arc<dyn SearchIndex>) =
        match config.backend {
            Backend::Remote => {
                let gcs = GcsBlobStore::from_config(&config.gcs)
                    .context("Failed to initialize GCS client")?;
                gcs.check_bucket()
                    .await
                    .with_context(|| format!("Bucket {} is not reachable", gcs.bucket()))?;

                let index =
                    ElasticsearchIndex::new(&config.elasticsearch.url, &config.elasticsearch.index)
                        .context("Failed to initialize Elasticsearch client")?;
                (Arc::new(gcs), Arc::new(index))
            }
            Backend::Memory => {
                tracing::warn!("using in-memory backend; posts will not survive a restart");
                (
                    Arc::new(InMemoryBlobStore::default()),
                    Arc::new(InMemorySearchIndex::new()),
                )
            }
        };

    let status = with_timeout_result(timeouts.index_write, search_index.ensure_index())
        .await
        .context("Failed to ensure search index")?;
    tracing::info!(?status, index = %config.elasticsearch.index, "search index ready");

    let ingestion = PostIngestionService::new(blob_store, search_index.clone(), timeouts);
    let search = GeoSearchService::new(search_index, timeouts)
        .with_default_radius(config.search.default_radius)
        .with_max_results(config.search.max_results);
    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let limits = UploadLimits {
        max_bytes: config.app.max_upload_bytes,
    };

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!(
        address = %bind_address,
        env = %config.app.env,
        backend = ?config.backend,
        "geo-post-service starting HTTP server"
    );

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ingestion.clone()))
            .app_data(web::Data::new(search.clone()))
            .app_data(web::Data::new(limits))
            .wrap(build_cors(&cors_config))
            .wrap(TracingLogger::default())
            .configure(handlers::configure(verifier.clone()))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    tracing::info!("geo-post-service shutting down");
    Ok(())
}

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600);

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        cors.allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}
