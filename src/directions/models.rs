// ABOUTME: Request options, domain results and provider wire formats for directions
// ABOUTME: Wire structs mirror the provider's JSON; domain structs are what callers see

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::polyline::LatLng;

/// Provider cap on routes per request is three, i.e. two alternates.
pub const MAX_ALTERNATE_ROUTES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Transit => "transit",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driving" => Ok(TravelMode::Driving),
            "walking" => Ok(TravelMode::Walking),
            "transit" => Ok(TravelMode::Transit),
            other => Err(format!(
                "unknown travel mode '{}': expected driving, walking or transit",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    pub mode: TravelMode,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
    /// Extra candidate routes to request; capped at [`MAX_ALTERNATE_ROUTES`].
    pub alternatives: u8,
}

impl RouteOptions {
    /// Provider `avoid` parameter. Only driving honours avoidance.
    pub fn avoid_param(&self) -> Option<String> {
        if self.mode != TravelMode::Driving {
            return None;
        }
        let mut avoid = Vec::new();
        if self.avoid_highways {
            avoid.push("highways");
        }
        if self.avoid_tolls {
            avoid.push("tolls");
        }
        if avoid.is_empty() {
            None
        } else {
            Some(avoid.join("|"))
        }
    }

    pub fn capped_alternatives(&self) -> u8 {
        self.alternatives.min(MAX_ALTERNATE_ROUTES)
    }
}

/// Best route for a live map preview. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePreview {
    pub points: Vec<LatLng>,
    pub start: LatLng,
    pub end: LatLng,
}

/// One candidate route as measured during a collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedRoute {
    pub route_index: u32,
    pub duration_seconds: Option<i64>,
    pub distance_meters: Option<i64>,
    pub details: RouteDetails,
}

/// Opaque payload stored alongside each snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDetails {
    pub summary: Option<String>,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
    /// Encoded overview geometry; see `polyline::decode`.
    pub polyline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: Option<String>,
    pub duration_seconds: Option<i64>,
    pub distance_meters: Option<i64>,
}

// Provider wire format

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsResponse {
    pub status: String,
    pub error_message: Option<String>,
    #[serde(default)]
    pub routes: Vec<WireRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRoute {
    pub summary: Option<String>,
    #[serde(default)]
    pub legs: Vec<WireLeg>,
    pub overview_polyline: Option<WirePolyline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePolyline {
    pub points: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLeg {
    pub duration: Option<TextValue>,
    pub duration_in_traffic: Option<TextValue>,
    pub distance: Option<TextValue>,
    pub start_location: Option<WireLatLng>,
    pub end_location: Option<WireLatLng>,
    #[serde(default)]
    pub steps: Vec<WireStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireStep {
    pub html_instructions: Option<String>,
    pub duration: Option<TextValue>,
    pub distance: Option<TextValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub value: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireLatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<WireLatLng> for LatLng {
    fn from(w: WireLatLng) -> Self {
        LatLng::new(w.lat, w.lng)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    pub error_message: Option<String>,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: Option<String>,
    pub geometry: GeocodeGeometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeGeometry {
    pub location: WireLatLng,
}
