use moka::future::Cache;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::db_storage::RecordStore;
use crate::models::{
    CompDetails, CompRecord, Coordinates, HomeDetails, HomeRecord, PointDetails, RecordKey,
    RecordKind, ResolvedPoint,
};
use crate::services::{GeocodeError, GeocodeProvider};

/// A stored record that can be placed on the map.
pub trait Geocodable {
    fn key(&self) -> RecordKey;

    /// Persisted coordinates, if the record was geocoded before.
    fn coordinates(&self) -> Option<Coordinates>;

    /// Free-text query sent to the provider. `region` is the state qualifier.
    fn geocode_query(&self, region: &str) -> String;

    fn to_point(&self, coordinates: Coordinates) -> ResolvedPoint;
}

impl Geocodable for HomeRecord {
    fn key(&self) -> RecordKey {
        RecordKey {
            kind: RecordKind::Home,
            id: self.id,
        }
    }

    fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    fn geocode_query(&self, region: &str) -> String {
        format!(
            "{}, {}, {} {}",
            self.address, self.city, region, self.postal_code
        )
    }

    fn to_point(&self, coordinates: Coordinates) -> ResolvedPoint {
        ResolvedPoint {
            lat: coordinates.lat,
            lng: coordinates.lng,
            address: self.address.clone(),
            details: PointDetails::Home(HomeDetails {
                sales_price: self.sales_price.clone(),
                sold_date: self.sold_date.clone(),
                link: self.link.clone(),
            }),
        }
    }
}

impl Geocodable for CompRecord {
    fn key(&self) -> RecordKey {
        RecordKey {
            kind: RecordKind::Comp,
            id: self.id,
        }
    }

    fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    fn geocode_query(&self, region: &str) -> String {
        format!("{}, {}", self.address, region)
    }

    fn to_point(&self, coordinates: Coordinates) -> ResolvedPoint {
        ResolvedPoint {
            lat: coordinates.lat,
            lng: coordinates.lng,
            address: self.address.clone(),
            details: PointDetails::Comp(CompDetails {
                bed_count: self.bed_count,
                bath_count: self.bath_count,
                square_footage: self.square_footage,
                year_built: self.year_built,
                arv: self.arv.clone(),
            }),
        }
    }
}

/// Why one record could not be placed on the map. Recovered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    Geocode(GeocodeError),
    /// Geocoding succeeded but the coordinates could not be stored.
    Persistence(String),
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveFailure::Geocode(e) => write!(f, "geocoding failed: {}", e),
            ResolveFailure::Persistence(msg) => write!(f, "could not store coordinates: {}", msg),
        }
    }
}

/// Returns a record's coordinates, geocoding and persisting them on first use.
///
/// Concurrent resolutions of the same never-geocoded record are coalesced
/// through `in_flight`, so the provider sees one call per record key. Entries
/// expire quickly; after the first success the store itself is the cache.
#[derive(Clone)]
pub struct CoordinateResolver {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn GeocodeProvider>,
    region: String,
    timeout: Duration,
    in_flight: Cache<RecordKey, Coordinates>,
}

impl CoordinateResolver {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn GeocodeProvider>,
        region: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let in_flight = Cache::builder()
            .time_to_live(Duration::from_secs(60))
            .max_capacity(10_000)
            .build();

        Self {
            store,
            provider,
            region: region.into(),
            timeout,
            in_flight,
        }
    }

    pub async fn resolve<R>(&self, record: &R) -> Result<ResolvedPoint, ResolveFailure>
    where
        R: Geocodable + Sync,
    {
        if let Some(coordinates) = record.coordinates() {
            return Ok(record.to_point(coordinates));
        }

        let key = record.key();
        let query = record.geocode_query(&self.region);

        let coordinates = self
            .in_flight
            .try_get_with(key, self.geocode_and_store(key, query))
            .await
            .map_err(|e| (*e).clone())?;

        Ok(record.to_point(coordinates))
    }

    async fn geocode_and_store(
        &self,
        key: RecordKey,
        query: String,
    ) -> Result<Coordinates, ResolveFailure> {
        tracing::info!("Coordinate cache MISS for {} - geocoding '{}'", key, query);

        let response = tokio::time::timeout(self.timeout, self.provider.geocode(&query))
            .await
            .map_err(|_| ResolveFailure::Geocode(GeocodeError::Timeout))?
            .map_err(ResolveFailure::Geocode)?;

        let coordinates = response
            .first_candidate()
            .map_err(ResolveFailure::Geocode)?;

        self.store
            .update_coordinates(key.kind, key.id, coordinates)
            .await
            .map_err(|e| ResolveFailure::Persistence(e.to_string()))?;

        tracing::info!(
            "Backfilled {} at ({}, {})",
            key,
            coordinates.lat,
            coordinates.lng
        );
        Ok(coordinates)
    }
}
