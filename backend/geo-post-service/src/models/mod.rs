/// Domain models for geo-post-service
///
/// `Post` is the public representation returned to clients, while
/// `PostDocument` is the schema stored in the search index. The two are kept
/// apart so legacy index documents (`user`/`url`/`lat`/`lon`) keep decoding
/// while the API speaks `author`/`attachmentUrl`/`latitude`/`longitude`.
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Radius applied when a search does not name one.
pub const DEFAULT_RADIUS_KM: f64 = 200.0;

/// Mean earth radius used for great-circle distances, in kilometres.
const EARTH_RADIUS_KM: f64 = 6_371.008_8;

// ============================================
// Location
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Build a location, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let location = Self {
            latitude,
            longitude,
        };
        location.validate()?;
        Ok(location)
    }

    /// Parse decimal strings as received from a form or query string.
    ///
    /// A missing or unparseable value is an error; it is never coerced to 0.
    pub fn parse(latitude: Option<&str>, longitude: Option<&str>) -> Result<Self> {
        let latitude = parse_coordinate("lat", latitude)?;
        let longitude = parse_coordinate("lon", longitude)?;
        Self::new(latitude, longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::InvalidArgument(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::InvalidArgument(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Great-circle (haversine) distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Location) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

fn parse_coordinate(name: &str, raw: Option<&str>) -> Result<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::InvalidArgument(format!("{name} is required")))?;

    raw.parse::<f64>()
        .map_err(|_| AppError::InvalidArgument(format!("{name} must be a decimal number, got {raw:?}")))
}

// ============================================
// Radius
// ============================================

/// Search radius in kilometres. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radius {
    km: f64,
}

impl Radius {
    pub fn from_km(km: f64) -> Result<Self> {
        if !km.is_finite() || km <= 0.0 {
            return Err(AppError::InvalidArgument(format!(
                "range must be a positive number of kilometres, got {km}"
            )));
        }
        Ok(Self { km })
    }

    /// Parse a bare number of kilometres, falling back to 200 km when absent.
    pub fn parse_km(raw: Option<&str>) -> Result<Self> {
        Self::parse_km_or(raw, Self::default())
    }

    pub fn parse_km_or(raw: Option<&str>, default: Radius) -> Result<Self> {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(default),
            Some(value) => {
                let km = value.parse::<f64>().map_err(|_| {
                    AppError::InvalidArgument(format!(
                        "range must be a number of kilometres, got {value:?}"
                    ))
                })?;
                Self::from_km(km)
            }
        }
    }

    pub fn km(&self) -> f64 {
        self.km
    }

    /// Distance literal understood by the search index, e.g. `"200km"`.
    pub fn to_query_distance(&self) -> String {
        format!("{}km", self.km)
    }
}

impl Default for Radius {
    fn default() -> Self {
        Self {
            km: DEFAULT_RADIUS_KM,
        }
    }
}

// ============================================
// Post identity
// ============================================

/// Join key between the blob object name and the index document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(Uuid);

impl PostId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for PostId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ============================================
// Post (public representation)
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub author: String,
    pub message: String,
    pub location: Location,
    /// Public URL of the stored attachment, empty when the post has none.
    pub attachment_url: String,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedPost {
    pub id: PostId,
    pub post: Post,
}

/// Binary attachment as received from the transport.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub data: Bytes,
    pub content_type: Option<String>,
}

impl Attachment {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn new(data: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            data: data.into(),
            content_type,
        }
    }

    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
    }
}

// ============================================
// Index schema
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Document shape stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDocument {
    pub user: String,
    #[serde(default)]
    pub message: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub url: String,
}

impl PostDocument {
    /// Field mapped as `geo_point` in the index.
    pub const GEO_FIELD: &'static str = "location";
}

impl From<&Post> for PostDocument {
    fn from(post: &Post) -> Self {
        Self {
            user: post.author.clone(),
            message: post.message.clone(),
            location: GeoPoint {
                lat: post.location.latitude,
                lon: post.location.longitude,
            },
            url: post.attachment_url.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document does not match post schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("document has no author")]
    MissingAuthor,
    #[error("document has invalid location: {0}")]
    InvalidLocation(String),
}

impl TryFrom<PostDocument> for Post {
    type Error = DecodeError;

    fn try_from(doc: PostDocument) -> std::result::Result<Self, Self::Error> {
        if doc.user.trim().is_empty() {
            return Err(DecodeError::MissingAuthor);
        }
        let location = Location::new(doc.location.lat, doc.location.lon)
            .map_err(|err| DecodeError::InvalidLocation(err.to_string()))?;

        Ok(Post {
            author: doc.user,
            message: doc.message,
            location,
            attachment_url: doc.url,
        })
    }
}

impl Post {
    /// Typed decode of a raw index `_source`.
    pub fn decode(source: &serde_json::Value) -> std::result::Result<Self, DecodeError> {
        let doc = PostDocument::deserialize(source)?;
        Post::try_from(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_rejects_out_of_range() {
        assert!(matches!(
            Location::new(91.0, 0.0),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Location::new(0.0, -180.5),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Location::new(f64::NAN, 0.0),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(Location::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn location_parse_never_defaults_to_zero() {
        assert!(matches!(
            Location::parse(Some("abc"), Some("1.0")),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Location::parse(None, Some("1.0")),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Location::parse(Some("  "), Some("1.0")),
            Err(AppError::InvalidArgument(_))
        ));

        let location = Location::parse(Some(" 37.5 "), Some("-120")).unwrap();
        assert_eq!(location.latitude, 37.5);
        assert_eq!(location.longitude, -120.0);
    }

    #[test]
    fn distance_between_london_and_california() {
        let london = Location::new(51.5, -0.1).unwrap();
        let california = Location::new(37.0, -120.0).unwrap();

        let km = london.distance_km(&california);
        assert!((8_500.0..8_800.0).contains(&km), "got {km}");
        assert_eq!(california.distance_km(&california), 0.0);
    }

    #[test]
    fn radius_defaults_and_rejects_non_positive() {
        assert_eq!(Radius::parse_km(None).unwrap().km(), DEFAULT_RADIUS_KM);
        assert_eq!(Radius::parse_km(Some("")).unwrap().km(), DEFAULT_RADIUS_KM);
        assert_eq!(Radius::parse_km(Some("15.5")).unwrap().km(), 15.5);
        assert_eq!(Radius::parse_km(Some("1")).unwrap().to_query_distance(), "1km");

        for raw in ["0", "-3", "ten", "NaN", "inf", "5km"] {
            assert!(
                matches!(Radius::parse_km(Some(raw)), Err(AppError::InvalidArgument(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn post_serializes_public_field_names() {
        let post = Post {
            author: "alice".into(),
            message: "hello".into(),
            location: Location::new(37.0, -120.0).unwrap(),
            attachment_url: String::new(),
        };

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(
            json,
            json!({
                "author": "alice",
                "message": "hello",
                "location": { "latitude": 37.0, "longitude": -120.0 },
                "attachmentUrl": ""
            })
        );
    }

    #[test]
    fn decode_accepts_legacy_document() {
        let source = json!({
            "user": "bob",
            "message": "Loving the view",
            "location": { "lat": 37, "lon": -120 },
            "url": "https://storage.googleapis.com/bucket/abc"
        });

        let post = Post::decode(&source).unwrap();
        assert_eq!(post.author, "bob");
        assert_eq!(post.location, Location::new(37.0, -120.0).unwrap());
        assert_eq!(post.attachment_url, "https://storage.googleapis.com/bucket/abc");
    }

    #[test]
    fn decode_rejects_malformed_documents() {
        let wrong_type = json!({ "user": "bob", "location": { "lat": "north", "lon": 1 } });
        assert!(matches!(Post::decode(&wrong_type), Err(DecodeError::Schema(_))));

        let anonymous = json!({ "user": "", "location": { "lat": 1, "lon": 1 } });
        assert!(matches!(Post::decode(&anonymous), Err(DecodeError::MissingAuthor)));

        let off_planet = json!({ "user": "bob", "location": { "lat": 120, "lon": 1 } });
        assert!(matches!(
            Post::decode(&off_planet),
            Err(DecodeError::InvalidLocation(_))
        ));
    }

    #[test]
    fn document_round_trips_through_public_post() {
        let post = Post {
            author: "carol".into(),
            message: String::new(),
            location: Location::new(-33.9, 151.2).unwrap(),
            attachment_url: "https://example.test/p".into(),
        };

        let source = serde_json::to_value(PostDocument::from(&post)).unwrap();
        assert_eq!(source["location"], json!({ "lat": -33.9, "lon": 151.2 }));
        assert_eq!(Post::decode(&source).unwrap(), post);
    }
}
