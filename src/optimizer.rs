//! Drive-time optimisation for inefficient routes.

use crate::model::{InefficientRoute, round2};
use std::future::Future;

/// Something that can estimate the fastest drive between two addresses.
pub trait RouteOptimizer {
    /// Optimised drive time in hours, or `None` when no estimate is available.
    fn optimized_hours(
        &self,
        base_address: &str,
        shipping_address: &str,
    ) -> impl Future<Output = Option<f64>> + Send;
}

/// Fill in optimisation data for every route that lacks it.
///
/// A route is only updated when the optimised time beats its actual
/// duration. Returns `true` if any route changed, so the caller knows to
/// persist the dataset.
pub async fn refresh_routes<O: RouteOptimizer>(
    routes: &mut [InefficientRoute],
    optimizer: &O,
) -> bool {
    let mut updated = false;

    for route in routes.iter_mut().filter(|route| route.needs_optimization()) {
        let Some(optimized) = optimizer
            .optimized_hours(&route.base_address, &route.shipping_address)
            .await
        else {
            continue;
        };

        let actual = route.actual_duration_hours();
        if actual > optimized {
            route.optimized_delivery_time = Some(round2(optimized));
            route.time_saved = Some(round2(actual - optimized));
            updated = true;
        }
    }

    updated
}

#[cfg(feature = "web")]
pub use geoapify::Geoapify;

#[cfg(feature = "web")]
mod geoapify {
    use super::RouteOptimizer;
    use crate::error::Result;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct GeocodeResponse {
        #[serde(default)]
        results: Vec<GeocodeResult>,
    }

    #[derive(Debug, Deserialize)]
    struct GeocodeResult {
        lat: Option<f64>,
        lon: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    struct RoutingResponse {
        #[serde(default)]
        results: Vec<RoutingResult>,
    }

    #[derive(Debug, Deserialize)]
    struct RoutingResult {
        /// Seconds
        time: Option<f64>,
    }

    /// Geoapify geocoding + routing client.
    ///
    /// Without an API key every lookup returns `None` and no request is made.
    /// Each request gives up after the configured timeout, which also reads
    /// as `None`.
    #[derive(Clone)]
    pub struct Geoapify {
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
    }

    impl Geoapify {
        pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Geoapify {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                api_key: api_key.filter(|key| !key.trim().is_empty()),
            })
        }

        pub fn is_enabled(&self) -> bool {
            self.api_key.is_some()
        }

        async fn coordinates(&self, api_key: &str, address: &str) -> Option<(f64, f64)> {
            let url = format!("{}/v1/geocode/search", self.base_url);
            let response = self
                .client
                .get(url)
                .header("Accept", "application/json")
                .query(&[
                    ("text", address),
                    ("apiKey", api_key),
                    ("lang", "vi"),
                    ("limit", "1"),
                    ("format", "json"),
                ])
                .send()
                .await;

            let body: GeocodeResponse = match response {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(body) => body,
                    Err(e) => {
                        log::warn!("geocoding response for {:?} unreadable: {}", address, e);
                        return None;
                    }
                },
                Ok(resp) => {
                    log::warn!("geocoding {:?} failed with status {}", address, resp.status());
                    return None;
                }
                Err(e) => {
                    log::warn!("geocoding {:?} failed: {}", address, e);
                    return None;
                }
            };

            let first = body.results.into_iter().next()?;
            Some((first.lat?, first.lon?))
        }
    }

    impl RouteOptimizer for Geoapify {
        async fn optimized_hours(&self, base_address: &str, shipping_address: &str) -> Option<f64> {
            let api_key = self.api_key.as_deref()?;
            let (start_lat, start_lon) = self.coordinates(api_key, base_address).await?;
            let (end_lat, end_lon) = self.coordinates(api_key, shipping_address).await?;

            let url = format!("{}/v1/routing", self.base_url);
            let waypoints = format!("{},{}|{},{}", start_lat, start_lon, end_lat, end_lon);
            let response = self
                .client
                .get(url)
                .header("Accept", "application/json")
                .query(&[
                    ("waypoints", waypoints.as_str()),
                    ("mode", "drive"),
                    ("type", "short"),
                    ("units", "metric"),
                    ("apiKey", api_key),
                    ("limit", "1"),
                    ("format", "json"),
                ])
                .send()
                .await;

            let body: RoutingResponse = match response {
                Ok(resp) if resp.status().is_success() => resp.json().await.ok()?,
                Ok(resp) => {
                    log::warn!("routing request failed with status {}", resp.status());
                    return None;
                }
                Err(e) => {
                    log::warn!("routing request failed: {}", e);
                    return None;
                }
            };

            let seconds = body.results.into_iter().next()?.time?;
            Some(seconds / 3600.0)
        }
    }
}
