use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as _;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

use crate::circuit_breaker::{create_geocode_circuit_breaker, GeocodeCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::Coordinates;

/// Status string the provider uses for a successful lookup.
pub const STATUS_OK: &str = "OK";

/// A provider answer: its status plus every candidate location, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResponse {
    pub status: String,
    pub candidates: Vec<Coordinates>,
}

/// Why a single geocoding attempt produced no coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeError {
    /// Provider answered with a status other than `OK`.
    Status(String),
    /// Provider answered `OK` without any candidate.
    NoCandidates,
    /// The call did not finish within the configured timeout.
    Timeout,
    /// Connection failure, non-2xx HTTP status or unreadable body.
    Transport(String),
    /// The circuit breaker is open; the provider was not called.
    CircuitOpen,
}

impl fmt::Display for GeocodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeError::Status(status) => write!(f, "provider returned status {}", status),
            GeocodeError::NoCandidates => write!(f, "provider returned no candidates"),
            GeocodeError::Timeout => write!(f, "provider call timed out"),
            GeocodeError::Transport(msg) => write!(f, "transport error: {}", msg),
            GeocodeError::CircuitOpen => write!(f, "circuit breaker open"),
        }
    }
}

impl GeocodeResponse {
    /// First candidate of an `OK` answer.
    pub fn first_candidate(&self) -> Result<Coordinates, GeocodeError> {
        if self.status != STATUS_OK {
            return Err(GeocodeError::Status(self.status.clone()));
        }
        self.candidates
            .first()
            .copied()
            .ok_or(GeocodeError::NoCandidates)
    }
}

/// Turns a free-text address into candidate coordinates.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Single attempt; implementations must bound the call with a timeout.
    async fn geocode(&self, query: &str) -> Result<GeocodeResponse, GeocodeError>;
}

// ============ Google Geocoding API ============

#[derive(Debug, Deserialize)]
struct GoogleGeocodeBody {
    status: String,
    #[serde(default)]
    results: Vec<GoogleGeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleGeocodeResult {
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: Coordinates,
}

/// Client for the Google Geocoding web service (or anything speaking its
/// `/maps/api/geocode/json` dialect).
#[derive(Clone)]
pub struct GoogleGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: GeocodeCircuitBreaker,
}

impl GoogleGeocoder {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.geocode_timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create geocoding client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.geocode_base_url.trim_end_matches('/').to_string(),
            api_key: config.google_maps_api_key.clone(),
            breaker: create_geocode_circuit_breaker(),
        })
    }

    async fn fetch(&self, url: reqwest::Url) -> Result<GoogleGeocodeBody, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.json::<GoogleGeocodeBody>().await
    }
}

#[async_trait]
impl GeocodeProvider for GoogleGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeocodeResponse, GeocodeError> {
        // Build URL with proper parameter encoding; addresses carry commas and '#'
        let url = reqwest::Url::parse_with_params(
            &format!("{}/maps/api/geocode/json", self.base_url),
            &[("address", query), ("key", self.api_key.as_str())],
        )
        .map_err(|e| GeocodeError::Transport(format!("Failed to build URL: {}", e)))?;

        // Redact key from logs
        tracing::debug!(
            "Geocoding URL: {}/maps/api/geocode/json?address={}&key=[REDACTED]",
            self.base_url,
            query
        );

        let body = match self.breaker.call(self.fetch(url)).await {
            Ok(body) => body,
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Geocoding circuit open, skipping lookup for '{}'", query);
                return Err(GeocodeError::CircuitOpen);
            }
            Err(failsafe::Error::Inner(e)) if e.is_timeout() => {
                tracing::warn!("Geocoding timed out for '{}'", query);
                return Err(GeocodeError::Timeout);
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::warn!("Geocoding request failed for '{}': {}", query, e);
                return Err(GeocodeError::Transport(e.to_string()));
            }
        };

        if body.status != STATUS_OK {
            tracing::info!(
                "Geocoder returned {} for '{}'{}",
                body.status,
                query,
                body.error_message
                    .as_deref()
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            );
        }

        Ok(GeocodeResponse {
            status: body.status,
            candidates: body
                .results
                .into_iter()
                .map(|r| r.geometry.location)
                .collect(),
        })
    }
}
