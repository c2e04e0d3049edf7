use handy_core::types::GeoPoint;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/";

/// Client for a Google-Geocoding-compatible JSON API, used to turn postal codes into coordinates.
#[derive(Clone)]
pub struct GeocodingClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl GeocodingClient {
    /// Creates a new geocoding client with the provided configuration.
    ///
    /// The base URL is treated as a directory: a missing trailing slash is added so
    /// `https://host/maps/api/geocode` and `https://host/maps/api/geocode/` behave the same.
    pub fn new(api_key: impl Into<String>, mut base_url: Url, http: Client) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Resolves a postal code (or any free-form address) to the first matching coordinate.
    pub async fn lookup_postal_code(&self, postal_code: &str) -> Result<GeoPoint, GeocodeError> {
        let trimmed = postal_code.trim();
        if trimmed.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }

        let mut url = self.base_url.join("json")?;
        url.query_pairs_mut()
            .append_pair("address", trimmed)
            .append_pair("key", &self.api_key);

        let response = self.http.get(url).send().await?;
        let body: GeocodeResponse = parse_json(response).await?;

        if body.status != "OK" {
            if body.status == "ZERO_RESULTS" {
                return Err(GeocodeError::NoResults);
            }
            return Err(GeocodeError::Api {
                status: body.status,
                message: body.error_message,
            });
        }

        let location = body
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)
            .ok_or(GeocodeError::NoResults)?;

        let point = GeoPoint::new(location.lat, location.lng);
        if !point.is_valid() {
            return Err(GeocodeError::InvalidCoordinates);
        }
        Ok(point)
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Errors produced by the geocoding client.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("postal code is empty")]
    EmptyQuery,
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("geocoding api returned {status}")]
    Api {
        status: String,
        message: Option<String>,
    },
    #[error("no location found for postal code")]
    NoResults,
    #[error("geocoding api returned out-of-range coordinates")]
    InvalidCoordinates,
}

impl GeocodeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::Url(_) => "url",
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Api { .. } => "api",
            Self::NoResults => "no_results",
            Self::InvalidCoordinates => "invalid_coordinates",
        }
    }
}

async fn parse_json<T>(response: Response) -> Result<T, GeocodeError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(GeocodeError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> GeocodingClient {
        let base = Url::parse(&server.url("/maps/api/geocode/")).expect("url");
        GeocodingClient::new("api-key", base, Client::builder().build().expect("client"))
    }

    #[tokio::test]
    async fn lookup_returns_first_result() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/maps/api/geocode/json")
                    .query_param("address", "M5V2T6")
                    .query_param("key", "api-key");
                then.status(200).json_body(json!({
                    "status": "OK",
                    "results": [
                        { "geometry": { "location": { "lat": 43.6426, "lng": -79.3871 } } },
                        { "geometry": { "location": { "lat": 0.0, "lng": 0.0 } } }
                    ]
                }));
            })
            .await;

        let point = client(&server)
            .lookup_postal_code("  M5V2T6 ")
            .await
            .expect("lookup");
        mock.assert_async().await;
        assert_eq!(point, GeoPoint::new(43.6426, -79.3871));
    }

    #[tokio::test]
    async fn base_url_without_trailing_slash_keeps_its_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/maps/api/geocode/json")
                    .query_param("address", "M5V2T6");
                then.status(200).json_body(json!({
                    "status": "OK",
                    "results": [{ "geometry": { "location": { "lat": 43.6426, "lng": -79.3871 } } }]
                }));
            })
            .await;

        let base = Url::parse(&server.url("/maps/api/geocode")).expect("url");
        let client = GeocodingClient::new("api-key", base, Client::builder().build().expect("client"));
        let point = client.lookup_postal_code("M5V2T6").await.expect("lookup");
        mock.assert_async().await;
        assert_eq!(point, GeoPoint::new(43.6426, -79.3871));
    }

    #[tokio::test]
    async fn zero_results_maps_to_no_results() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/maps/api/geocode/json");
                then.status(200)
                    .json_body(json!({ "status": "ZERO_RESULTS", "results": [] }));
            })
            .await;

        let err = client(&server)
            .lookup_postal_code("00000")
            .await
            .expect_err("should error");
        assert!(matches!(err, GeocodeError::NoResults));
    }

    #[tokio::test]
    async fn api_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/maps/api/geocode/json");
                then.status(200).json_body(json!({
                    "status": "REQUEST_DENIED",
                    "error_message": "The provided API key is invalid."
                }));
            })
            .await;

        let err = client(&server)
            .lookup_postal_code("M5V2T6")
            .await
            .expect_err("should error");
        match err {
            GeocodeError::Api { status, message } => {
                assert_eq!(status, "REQUEST_DENIED");
                assert_eq!(message.as_deref(), Some("The provided API key is invalid."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn http_error_returns_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/maps/api/geocode/json");
                then.status(503).body("unavailable");
            })
            .await;

        let err = client(&server)
            .lookup_postal_code("M5V2T6")
            .await
            .expect_err("should error");
        match err {
            GeocodeError::Status { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_postal_code_is_rejected_without_a_request() {
        let server = MockServer::start_async().await;
        let err = client(&server)
            .lookup_postal_code("   ")
            .await
            .expect_err("should error");
        assert!(matches!(err, GeocodeError::EmptyQuery));
        assert_eq!(err.kind(), "empty_query");
    }
}
