// ABOUTME: Directions provider module
// ABOUTME: Client, wire/domain models, polyline codec and the route-source seam used by the scheduler

pub mod client;
pub mod models;
pub mod polyline;

pub use client::{looks_like_coordinates, DirectionsClient, DirectionsError};
pub use models::{CollectedRoute, RouteDetails, RouteOptions, RoutePreview, RouteStep, TravelMode};
pub use polyline::{LatLng, PolylineError};

use async_trait::async_trait;

/// What the scheduler needs from a directions provider.
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Fail fast when the provider cannot be used at all.
    fn ensure_configured(&self) -> Result<(), DirectionsError>;

    async fn fetch_routes_for_collection(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
    ) -> Result<Vec<CollectedRoute>, DirectionsError>;
}

#[async_trait]
impl RouteSource for DirectionsClient {
    fn ensure_configured(&self) -> Result<(), DirectionsError> {
        DirectionsClient::ensure_configured(self)
    }

    async fn fetch_routes_for_collection(
        &self,
        origin: &str,
        destination: &str,
        options: &RouteOptions,
    ) -> Result<Vec<CollectedRoute>, DirectionsError> {
        DirectionsClient::fetch_routes_for_collection(self, origin, destination, options).await
    }
}
