use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

static POSTS_INGESTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "geo_post_posts_ingested_total",
        "Posts fully written to object storage and the search index",
    )
    .expect("failed to create geo_post_posts_ingested_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_posts_ingested_total");
    counter
});

static INGEST_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "geo_post_ingest_failures_total",
            "Rejected or failed post ingestions by error kind",
        ),
        &["kind"],
    )
    .expect("failed to create geo_post_ingest_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_ingest_failures_total");
    counter
});

static ORPHANED_BLOBS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "geo_post_orphaned_blobs_total",
        "Attachments uploaded for posts whose index write then failed",
    )
    .expect("failed to create geo_post_orphaned_blobs_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_orphaned_blobs_total");
    counter
});

static SEARCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("geo_post_searches_total", "Geo searches served")
        .expect("failed to create geo_post_searches_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_searches_total");
    counter
});

static SKIPPED_DOCUMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "geo_post_skipped_documents_total",
        "Search hits dropped because they did not decode as posts",
    )
    .expect("failed to create geo_post_skipped_documents_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_skipped_documents_total");
    counter
});

static INDEX_WRITE_TIMEOUTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "geo_post_index_write_timeouts_total",
        "Index writes abandoned at the deadline; the document may still have landed",
    )
    .expect("failed to create geo_post_index_write_timeouts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register geo_post_index_write_timeouts_total");
    counter
});

/// Register every counter so `/metrics` lists them before the first event.
pub fn init_metrics() {
    Lazy::force(&POSTS_INGESTED_TOTAL);
    Lazy::force(&INGEST_FAILURES_TOTAL);
    Lazy::force(&ORPHANED_BLOBS_TOTAL);
    Lazy::force(&SEARCHES_TOTAL);
    Lazy::force(&SKIPPED_DOCUMENTS_TOTAL);
    Lazy::force(&INDEX_WRITE_TIMEOUTS_TOTAL);
}

pub fn record_post_ingested() {
    POSTS_INGESTED_TOTAL.inc();
}

pub fn record_ingest_failure(kind: &str) {
    INGEST_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_orphaned_blob() {
    ORPHANED_BLOBS_TOTAL.inc();
}

pub fn record_search() {
    SEARCHES_TOTAL.inc();
}

pub fn record_skipped_document() {
    SKIPPED_DOCUMENTS_TOTAL.inc();
}

pub fn record_index_write_timeout() {
    INDEX_WRITE_TIMEOUTS_TOTAL.inc();
}

pub fn orphaned_blobs() -> u64 {
    ORPHANED_BLOBS_TOTAL.get()
}

pub fn skipped_documents() -> u64 {
    SKIPPED_DOCUMENTS_TOTAL.get()
}

pub fn index_write_timeouts() -> u64 {
    INDEX_WRITE_TIMEOUTS_TOTAL.get()
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
