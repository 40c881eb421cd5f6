// ABOUTME: HTTP client for the directions and geocoding provider
// ABOUTME: Handles request shaping, status classification and the geocode-then-retry fallback

use anyhow::Context;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::models::{
    CollectedRoute, DirectionsResponse, GeocodeResponse, RouteDetails, RouteOptions,
    RoutePreview, RouteStep, TravelMode, WireRoute,
};
use super::polyline::{self, LatLng, PolylineError};
use crate::config::ProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("GOOGLE_MAPS_API_KEY not configured; set it in the environment or the [provider] config section")]
    MissingCredential,
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider rejected the request ({status}){}", fmt_message(.message))]
    Rejected {
        status: String,
        message: Option<String>,
    },
    #[error("provider error ({status}){}", fmt_message(.message))]
    Provider {
        status: String,
        message: Option<String>,
    },
    #[error("provider returned an unreadable route geometry: {0}")]
    Polyline(#[from] PolylineError),
}

fn fmt_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {}", m))
        .unwrap_or_default()
}

impl DirectionsError {
    /// Configuration problems that retrying on the next tick cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DirectionsError::MissingCredential | DirectionsError::Rejected { .. }
        )
    }
}

pub struct DirectionsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    language: Option<String>,
}

impl DirectionsClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.credential().map(str::to_string),
            language: config.language.clone(),
        })
    }

    pub fn ensure_configured(&self) -> Result<(), DirectionsError> {
        self.key().map(|_| ())
    }

    fn key(&self) -> Result<&str, DirectionsError> {
        self.api_key
            .as_deref()
            .ok_or(DirectionsError::MissingCredential)
    }

    /// Best single route for a map preview, or `None` when the provider
    /// finds nothing.
    pub async fn fetch_primary_route(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
    ) -> Result<Option<RoutePreview>, DirectionsError> {
        let routes = self
            .directions_with_fallback(origin, destination, options, 0)
            .await?;

        let Some(route) = routes.into_iter().next() else {
            return Ok(None);
        };
        let Some(encoded) = route.overview_polyline.as_ref().map(|p| p.points.as_str()) else {
            return Ok(None);
        };

        let points = polyline::decode(encoded)?;
        let leg = route.legs.first();
        let start = leg
            .and_then(|l| l.start_location)
            .map(LatLng::from)
            .or_else(|| points.first().copied());
        let end = leg
            .and_then(|l| l.end_location)
            .map(LatLng::from)
            .or_else(|| points.last().copied());

        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(RoutePreview { points, start, end })),
            _ => Ok(None),
        }
    }

    /// Primary route plus any requested alternates, with per-step detail.
    pub async fn fetch_routes_for_collection(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
    ) -> Result<Vec<CollectedRoute>, DirectionsError> {
        let alternatives = options.capped_alternatives();
        let routes = self
            .directions_with_fallback(origin, destination, options, alternatives)
            .await?;

        Ok(routes
            .into_iter()
            .take(1 + alternatives as usize)
            .enumerate()
            .map(|(index, route)| to_collected(index as u32, route, options.mode))
            .collect())
    }

    /// Resolve a free-text address to coordinates.
    pub async fn geocode(&self, address: &str) -> Result<Option<LatLng>, DirectionsError> {
        let key = self.key()?;
        let url = format!("{}/geocode/json", self.base_url);

        let mut params = vec![("address", address.to_string()), ("key", key.to_string())];
        if let Some(language) = &self.language {
            params.push(("language", language.clone()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let parsed: GeocodeResponse = response.json().await?;
        if !check_status(&parsed.status, parsed.error_message)? {
            return Ok(None);
        }

        Ok(parsed
            .results
            .into_iter()
            .next()
            .map(|r| LatLng::from(r.geometry.location)))
    }

    async fn directions_with_fallback(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
        alternatives: u8,
    ) -> Result<Vec<WireRoute>, DirectionsError> {
        let routes = self
            .request_directions(origin, destination, options, alternatives)
            .await?;
        if !routes.is_empty() {
            return Ok(routes);
        }

        let origin_is_text = !looks_like_coordinates(origin);
        let destination_is_text = !looks_like_coordinates(destination);
        if !origin_is_text && !destination_is_text {
            return Ok(routes);
        }

        let resolved_origin = if origin_is_text {
            match self.geocode(origin).await? {
                Some(point) => format_coordinates(point),
                None => return Ok(Vec::new()),
            }
        } else {
            origin.to_string()
        };
        let resolved_destination = if destination_is_text {
            match self.geocode(destination).await? {
                Some(point) => format_coordinates(point),
                None => return Ok(Vec::new()),
            }
        } else {
            destination.to_string()
        };

        debug!(
            origin = %resolved_origin,
            destination = %resolved_destination,
            "no route for text input, retrying with geocoded coordinates"
        );

        self.request_directions(&resolved_origin, &resolved_destination, options, alternatives)
            .await
    }

    async fn request_directions(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
        alternatives: u8,
    ) -> Result<Vec<WireRoute>, DirectionsError> {
        let key = self.key()?;
        let url = format!("{}/directions/json", self.base_url);

        let mut params = vec![
            ("origin", origin.to_string()),
            ("destination", destination.to_string()),
            ("mode", options.mode.as_str().to_string()),
            ("alternatives", (alternatives > 0).to_string()),
            ("key", key.to_string()),
        ];
        if let Some(avoid) = options.avoid_param() {
            params.push(("avoid", avoid));
        }
        if options.mode == TravelMode::Driving {
            // required for duration_in_traffic
            params.push(("departure_time", "now".to_string()));
        }
        if let Some(language) = &self.language {
            params.push(("language", language.clone()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let parsed: DirectionsResponse = response.json().await?;
        if !check_status(&parsed.status, parsed.error_message)? {
            return Ok(Vec::new());
        }

        Ok(parsed.routes)
    }
}

/// Non-2xx response. Authentication failures are rejections, not transient.
async fn http_error(response: reqwest::Response) -> DirectionsError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DirectionsError::Rejected {
            status: format!("HTTP {}", status.as_u16()),
            message: Some(body).filter(|b| !b.trim().is_empty()),
        },
        _ => DirectionsError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

/// `Ok(true)` when results follow, `Ok(false)` for an empty answer.
fn check_status(status: &str, message: Option<String>) -> Result<bool, DirectionsError> {
    match status {
        "OK" => Ok(true),
        "ZERO_RESULTS" | "NOT_FOUND" => Ok(false),
        "REQUEST_DENIED" | "OVER_DAILY_LIMIT" | "INVALID_REQUEST" => {
            Err(DirectionsError::Rejected {
                status: status.to_string(),
                message,
            })
        }
        _ => Err(DirectionsError::Provider {
            status: status.to_string(),
            message,
        }),
    }
}

fn to_collected(route_index: u32, route: WireRoute, mode: TravelMode) -> CollectedRoute {
    let polyline = route.overview_polyline.map(|p| p.points);
    let leg = route.legs.into_iter().next();

    let (duration_seconds, distance_meters, steps) = match leg {
        Some(leg) => {
            let traffic = if mode == TravelMode::Driving {
                leg.duration_in_traffic.map(|d| d.value)
            } else {
                None
            };
            let steps = leg
                .steps
                .into_iter()
                .map(|s| RouteStep {
                    instruction: s.html_instructions,
                    duration_seconds: s.duration.map(|d| d.value),
                    distance_meters: s.distance.map(|d| d.value),
                })
                .collect();
            (
                traffic.or(leg.duration.map(|d| d.value)),
                leg.distance.map(|d| d.value),
                steps,
            )
        }
        None => (None, None, Vec::new()),
    };

    CollectedRoute {
        route_index,
        duration_seconds,
        distance_meters,
        details: RouteDetails {
            summary: route.summary,
            steps,
            polyline,
        },
    }
}

/// True for inputs of the form "lat,lng" with both parts in range.
pub fn looks_like_coordinates(input: &str) -> bool {
    let mut parts = input.split(',');
    let (Some(lat), Some(lng), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    match (lat.trim().parse::<f64>(), lng.trim().parse::<f64>()) {
        (Ok(lat), Ok(lng)) => (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng),
        _ => false,
    }
}

fn format_coordinates(point: LatLng) -> String {
    format!("{:.6},{:.6}", point.lat, point.lng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    fn ok_route(summary: &str, seconds: i64, meters: i64) -> serde_json::Value {
        json!({
            "summary": summary,
            "overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@"},
            "legs": [{
                "duration": {"value": seconds, "text": "x"},
                "distance": {"value": meters, "text": "y"},
                "start_location": {"lat": 38.5, "lng": -120.2},
                "end_location": {"lat": 43.252, "lng": -126.453},
                "steps": [{
                    "html_instructions": "Head north",
                    "duration": {"value": 30},
                    "distance": {"value": 200}
                }]
            }]
        })
    }

    #[test]
    fn test_client_creation() {
        let client = DirectionsClient::new(&config("https://api.example.com"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_placeholder_key_is_missing_credential() {
        let cfg = ProviderConfig {
            api_key: Some("your_api_key_here".to_string()),
            ..Default::default()
        };
        let client = DirectionsClient::new(&cfg).unwrap();
        let err = client.ensure_configured().unwrap_err();
        assert!(matches!(err, DirectionsError::MissingCredential));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_looks_like_coordinates() {
        assert!(looks_like_coordinates("40.7128,-74.0060"));
        assert!(looks_like_coordinates(" 40.7128 , -74.0060 "));
        assert!(!looks_like_coordinates("Main St, Springfield"));
        assert!(!looks_like_coordinates("91.0,10.0"));
        assert!(!looks_like_coordinates("1,2,3"));
        assert!(!looks_like_coordinates("Paris"));
    }

    #[test]
    fn test_check_status_classification() {
        assert!(check_status("OK", None).unwrap());
        assert!(!check_status("ZERO_RESULTS", None).unwrap());
        assert!(check_status("REQUEST_DENIED", None).unwrap_err().is_fatal());
        assert!(!check_status("OVER_QUERY_LIMIT", None).unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_fetch_primary_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("origin", "A"))
            .and(query_param("destination", "B"))
            .and(query_param("alternatives", "false"))
            .and(query_param("key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "routes": [ok_route("I-5", 600, 5000)]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let preview = client
            .fetch_primary_route("A", "B", &RouteOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(preview.points.len(), 3);
        assert_eq!(preview.start, LatLng::new(38.5, -120.2));
        assert_eq!(preview.end, LatLng::new(43.252, -126.453));
    }

    #[tokio::test]
    async fn test_collection_prefers_traffic_duration_when_driving() {
        let server = MockServer::start().await;
        let mut route = ok_route("I-5", 600, 5000);
        route["legs"][0]["duration_in_traffic"] = json!({"value": 840, "text": "14 mins"});
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("mode", "driving"))
            .and(query_param("departure_time", "now"))
            .and(query_param("avoid", "highways|tolls"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "routes": [route]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let options = RouteOptions {
            mode: TravelMode::Driving,
            avoid_highways: true,
            avoid_tolls: true,
            alternatives: 0,
        };
        let routes = client
            .fetch_routes_for_collection("A", "B", &options)
            .await
            .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_index, 0);
        assert_eq!(routes[0].duration_seconds, Some(840));
        assert_eq!(routes[0].distance_meters, Some(5000));
        assert_eq!(routes[0].details.summary.as_deref(), Some("I-5"));
        assert_eq!(routes[0].details.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_walking_drops_avoidance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("mode", "walking"))
            .and(query_param_is_missing("avoid"))
            .and(query_param_is_missing("departure_time"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "routes": [ok_route("Park", 1800, 2000)]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let options = RouteOptions {
            mode: TravelMode::Walking,
            avoid_highways: true,
            avoid_tolls: true,
            alternatives: 0,
        };
        let routes = client
            .fetch_routes_for_collection("A", "B", &options)
            .await
            .unwrap();
        assert_eq!(routes[0].duration_seconds, Some(1800));
    }

    #[tokio::test]
    async fn test_alternates_are_indexed_and_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("alternatives", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "routes": [
                    ok_route("one", 100, 1),
                    ok_route("two", 200, 2),
                    ok_route("three", 300, 3),
                    ok_route("four", 400, 4)
                ]
            })))
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let options = RouteOptions {
            alternatives: 5,
            ..Default::default()
        };
        let routes = client
            .fetch_routes_for_collection("A", "B", &options)
            .await
            .unwrap();

        let indexes: Vec<u32> = routes.iter().map(|r| r.route_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_zero_results_for_coordinates_is_empty_without_geocoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS", "routes": []})),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let routes = client
            .fetch_routes_for_collection("10.0,20.0", "11.0,21.0", &RouteOptions::default())
            .await
            .unwrap();
        assert!(routes.is_empty());

        let preview = client
            .fetch_primary_route("10.0,20.0", "11.0,21.0", &RouteOptions::default())
            .await;
        assert!(preview.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_text_input_falls_back_to_geocoded_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("origin", "Springfield"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "ZERO_RESULTS", "routes": []})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .and(query_param("address", "Springfield"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{
                    "formatted_address": "Springfield, IL, USA",
                    "geometry": {"location": {"lat": 39.7817, "lng": -89.6501}}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .and(query_param("origin", "39.781700,-89.650100"))
            .and(query_param("destination", "41.0,-87.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "routes": [ok_route("I-55", 7200, 300000)]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let routes = client
            .fetch_routes_for_collection("Springfield", "41.0,-87.0", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].duration_seconds, Some(7200));
    }

    #[tokio::test]
    async fn test_request_denied_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let err = client
            .fetch_routes_for_collection("A", "B", &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("API key is invalid"));
    }

    #[tokio::test]
    async fn test_http_failure_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let err = client
            .fetch_routes_for_collection("A", "B", &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectionsError::Http { status: 503, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_http_forbidden_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/directions/json"))
            .respond_with(ResponseTemplate::new(403).set_body_string("key not authorized"))
            .mount(&server)
            .await;

        let client = DirectionsClient::new(&config(&server.uri())).unwrap();
        let err = client
            .fetch_routes_for_collection("A", "B", &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectionsError::Rejected { .. }));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("HTTP 403"));
        assert!(err.to_string().contains("key not authorized"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cfg = ProviderConfig {
            api_key: None,
            base_url: server.uri(),
            ..Default::default()
        };
        let client = DirectionsClient::new(&cfg).unwrap();
        let err = client
            .fetch_primary_route("A", "B", &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectionsError::MissingCredential));
    }
}
