/// Post ingestion and geo search endpoints
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::middleware::Caller;
use crate::models::{Attachment, Location, Radius};
use crate::services::{GeoSearchService, PostIngestionService};

/// Cap on the total bytes read from one multipart request.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 32 << 20,
        }
    }
}

#[derive(Default)]
struct PostForm {
    message: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
    image: Option<Attachment>,
}

/// POST /post
pub async fn create_post(
    caller: Caller,
    service: web::Data<PostIngestionService>,
    limits: web::Data<UploadLimits>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let form = read_form(payload, limits.max_bytes).await?;
    let location = Location::parse(form.lat.as_deref(), form.lon.as_deref())?;
    let message = form.message.unwrap_or_default();

    let ingested = service
        .ingest(caller.username(), &message, location, form.image)
        .await?;

    Ok(HttpResponse::Created().json(ingested))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub range: Option<String>,
}

/// GET /search
pub async fn search_posts(
    _caller: Caller,
    service: web::Data<GeoSearchService>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let center = Location::parse(query.lat.as_deref(), query.lon.as_deref())?;
    let radius = Radius::parse_km_or(query.range.as_deref(), service.default_radius())?;

    let posts = service.search(center, radius).await?;
    Ok(HttpResponse::Ok().json(posts))
}

async fn read_form(mut payload: Multipart, max_bytes: usize) -> Result<PostForm> {
    let mut form = PostForm::default();
    let mut total_bytes = 0usize;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|err| AppError::InvalidArgument(format!("malformed multipart body: {err}")))?;
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let data = read_field(&mut field, &mut total_bytes, max_bytes).await?;
        match name.as_str() {
            "message" => form.message = Some(text_field(&name, data)?),
            "lat" => form.lat = Some(text_field(&name, data)?),
            "lon" => form.lon = Some(text_field(&name, data)?),
            // An empty file part is how browsers submit "no file chosen"
            "image" if !data.is_empty() => form.image = Some(Attachment::new(data, content_type)),
            "image" => {}
            other => debug!(field = %other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn read_field(field: &mut Field, total_bytes: &mut usize, max_bytes: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk
            .map_err(|err| AppError::InvalidArgument(format!("error reading form field: {err}")))?;
        *total_bytes += chunk.len();
        if *total_bytes > max_bytes {
            return Err(AppError::InvalidArgument(format!(
                "request body exceeds {max_bytes} bytes"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn text_field(name: &str, data: Bytes) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| AppError::InvalidArgument(format!("{name} must be valid UTF-8")))
}
