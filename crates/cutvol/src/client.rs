//! Elevation service backed by the Open-Elevation HTTP API.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::HeightCache;
use crate::ellipsoid::Cartographic;
use crate::error::ServiceError;
use crate::service::{ElevationService, HeightsFuture};

/// Public Open-Elevation endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.open-elevation.com";

/// Terrain level reported for the service's roughly 30 m source data.
pub const DEFAULT_MAX_LEVEL: u32 = 13;

/// Number of prefetched heights kept by default.
pub const DEFAULT_CACHE_ENTRIES: usize = 4096;

const USER_AGENT: &str = concat!("cutvol/", env!("CARGO_PKG_VERSION"));

/// Errors from the Open-Elevation client.
#[derive(Debug)]
pub enum RequestError {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// The response body could not be used.
    InvalidResponse {
        /// The URL that returned the response.
        url: String,
        /// Description of what was invalid.
        detail: String,
    },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            RequestError::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            RequestError::InvalidResponse { url, detail } => {
                write!(f, "invalid response from {url}: {detail}")
            }
        }
    }
}

impl std::error::Error for RequestError {}

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: f64,
}

impl LookupRequest {
    fn new(points: &[Cartographic]) -> Self {
        Self {
            locations: points
                .iter()
                .map(|p| Location {
                    latitude: p.latitude_degrees(),
                    longitude: p.longitude_degrees(),
                })
                .collect(),
        }
    }
}

impl LookupResponse {
    fn into_heights(self, url: &str, expected: usize) -> Result<Vec<f64>, RequestError> {
        if self.results.len() != expected {
            return Err(RequestError::InvalidResponse {
                url: url.to_string(),
                detail: format!("expected {expected} results, got {}", self.results.len()),
            });
        }
        Ok(self.results.into_iter().map(|r| r.elevation).collect())
    }
}

/// Resolves heights through Open-Elevation's batch lookup endpoint.
///
/// [`height_at`](ElevationService::height_at) answers from a bounded
/// [`HeightCache`] filled by [`prefetch`](Self::prefetch); call it on a
/// polygon's corners before measuring it. Dense-mesh samples are not cached.
#[derive(Debug, Clone)]
pub struct OpenElevationClient {
    http: reqwest::Client,
    base_url: String,
    max_level: u32,
    cache: HeightCache,
}

impl OpenElevationClient {
    /// Create a client for the public endpoint.
    pub fn new() -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RequestError::Http {
                url: DEFAULT_BASE_URL.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::with_client(http))
    }

    /// Create a client around an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_level: DEFAULT_MAX_LEVEL,
            cache: HeightCache::with_max_entries(DEFAULT_CACHE_ENTRIES),
        }
    }

    /// Use a different height cache, e.g. one shared with other clients.
    #[must_use]
    pub fn with_cache(mut self, cache: HeightCache) -> Self {
        self.cache = cache;
        self
    }

    /// Use a different server, e.g. a self-hosted instance.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the terrain level reported to the subdivider.
    #[must_use]
    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    /// The cache of fetched heights.
    #[must_use]
    pub fn cache(&self) -> &HeightCache {
        &self.cache
    }

    fn lookup_url(&self) -> String {
        format!("{}/api/v1/lookup", self.base_url)
    }

    /// Fetch heights for `points`, one per point in input order.
    pub async fn lookup(&self, points: &[Cartographic]) -> Result<Vec<f64>, RequestError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.lookup_url();
        tracing::debug!(points = points.len(), "requesting elevations");

        let response = self
            .http
            .post(&url)
            .json(&LookupRequest::new(points))
            .send()
            .await
            .map_err(|e| RequestError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RequestError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        let body: LookupResponse =
            response
                .json()
                .await
                .map_err(|e| RequestError::InvalidResponse {
                    url: url.clone(),
                    detail: e.to_string(),
                })?;

        body.into_heights(&url, points.len())
    }

    /// Fetch and cache heights so later synchronous lookups succeed.
    pub async fn prefetch(&self, points: &[Cartographic]) -> Result<(), RequestError> {
        let heights = self.lookup(points).await?;
        self.cache.extend(points.iter().copied().zip(heights));
        Ok(())
    }
}

impl ElevationService for OpenElevationClient {
    fn query_heights<'a>(&'a self, points: &'a [Cartographic]) -> HeightsFuture<'a> {
        Box::pin(async move {
            self.lookup(points)
                .await
                .map_err(|e| Box::new(e) as ServiceError)
        })
    }

    fn maximum_level_near(&self, _point: &Cartographic) -> u32 {
        self.max_level
    }

    fn height_at(&self, point: &Cartographic) -> Option<f64> {
        self.cache.get(point)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Serve Open-Elevation lookups on a local port, answering every location
    /// with `elevation`. Returns the base URL.
    async fn serve_elevations(elevation: f64) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let body_start = loop {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };

                    let headers = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
                    let length: usize = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse().ok())
                        .unwrap_or(0);
                    while buf.len() < body_start + length {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let request: serde_json::Value =
                        serde_json::from_slice(&buf[body_start..]).unwrap();
                    let count = request["locations"].as_array().map_or(0, Vec::len);
                    let results: Vec<serde_json::Value> = (0..count)
                        .map(|_| serde_json::json!({ "elevation": elevation }))
                        .collect();
                    let body = serde_json::json!({ "results": results }).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    #[test]
    fn test_request_body_uses_degrees() {
        let request = LookupRequest::new(&[Cartographic::from_degrees(-74.0, 40.5, 0.0)]);
        let json = serde_json::to_value(&request).unwrap();
        let location = &json["locations"][0];
        assert!((location["latitude"].as_f64().unwrap() - 40.5).abs() < 1e-9);
        assert!((location["longitude"].as_f64().unwrap() + 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_parsing() {
        let body: LookupResponse = serde_json::from_str(
            r#"{"results":[{"latitude":1.0,"longitude":2.0,"elevation":31.5},{"latitude":1.0,"longitude":2.1,"elevation":-3}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_heights("test", 2).unwrap(), vec![31.5, -3.0]);
    }

    #[test]
    fn test_response_count_mismatch() {
        let body: LookupResponse =
            serde_json::from_str(r#"{"results":[{"elevation":1.0}]}"#).unwrap();
        let err = body.into_heights("http://x/api/v1/lookup", 2).unwrap_err();
        assert!(matches!(err, RequestError::InvalidResponse { .. }));
        assert!(err.to_string().contains("expected 2 results"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OpenElevationClient::with_client(reqwest::Client::new())
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.lookup_url(), "http://localhost:8080/api/v1/lookup");
    }

    #[test]
    fn test_height_at_answers_from_cache() {
        let client = OpenElevationClient::with_client(reqwest::Client::new()).with_max_level(9);
        let point = Cartographic::from_degrees(10.0, 20.0, 0.0);
        assert_eq!(client.height_at(&point), None);

        client.cache().insert(&point, 88.0);
        assert_eq!(client.height_at(&point), Some(88.0));
        assert_eq!(client.maximum_level_near(&point), 9);
    }

    #[test]
    fn test_default_cache_is_bounded() {
        let client = OpenElevationClient::with_client(reqwest::Client::new());
        client.cache().extend((0..DEFAULT_CACHE_ENTRIES + 50).map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let lon = i as f64 * 1e-4;
            (Cartographic::from_degrees(lon, 0.0, 0.0), 1.0)
        }));
        assert_eq!(client.cache().len(), DEFAULT_CACHE_ENTRIES);
    }

    #[tokio::test]
    async fn test_sampling_does_not_fill_cache() {
        let base_url = serve_elevations(42.0).await;
        let client =
            OpenElevationClient::with_client(reqwest::Client::new()).with_base_url(base_url);

        let dense: Vec<Cartographic> = (0..200)
            .map(|i| Cartographic::from_degrees(10.0 + f64::from(i) * 1e-4, 20.0, 0.0))
            .collect();
        let heights = client.query_heights(&dense).await.unwrap();
        assert_eq!(heights.len(), dense.len());
        assert!(heights.iter().all(|&h| (h - 42.0).abs() < 1e-9));
        assert!(client.cache().is_empty());

        client.prefetch(&dense[..3]).await.unwrap();
        assert_eq!(client.cache().len(), 3);
        assert_eq!(client.height_at(&dense[1]), Some(42.0));
        assert_eq!(client.height_at(&dense[100]), None);
    }

    #[tokio::test]
    async fn test_empty_lookup_skips_request() {
        let client = OpenElevationClient::with_client(reqwest::Client::new())
            .with_base_url("http://127.0.0.1:9");
        assert!(client.lookup(&[]).await.unwrap().is_empty());
    }
}
