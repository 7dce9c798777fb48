//! Map aggregation: loads records, applies the recency window, resolves
//! coordinates for every survivor and drops the ones that cannot be placed.
//!
//! Resolution fans out across records with an order-preserving buffered
//! stream, so results come back in store order no matter which geocoding call
//! finishes first. One record's failure never affects its siblings; only a
//! failure to read the collection itself fails the call.

use chrono::{Local, NaiveDate};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db_storage::RecordStore;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CompInput, CompRecord, HomeInput, HomeRecord, RangeToken, RecordKey, ResolvedPoint,
};
use crate::recency::RecencyFilter;
use crate::resolver::{CoordinateResolver, Geocodable, ResolveFailure};
use crate::services::GeocodeProvider;

/// One record's resolution result, tagged with the record it came from.
pub type Outcome = (RecordKey, Result<ResolvedPoint, ResolveFailure>);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub region: String,
    pub geocode_timeout: Duration,
    pub concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            region: "CA".to_string(),
            geocode_timeout: Duration::from_secs(10),
            concurrency: 8,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            region: config.geocode_region.clone(),
            geocode_timeout: config.geocode_timeout,
            concurrency: config.geocode_concurrency,
        }
    }
}

/// Result of a batch backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct AggregationPipeline {
    store: Arc<dyn RecordStore>,
    resolver: CoordinateResolver,
    concurrency: usize,
}

impl AggregationPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn GeocodeProvider>,
        settings: PipelineSettings,
    ) -> Self {
        let resolver = CoordinateResolver::new(
            store.clone(),
            provider,
            settings.region,
            settings.geocode_timeout,
        );

        Self {
            store,
            resolver,
            concurrency: settings.concurrency.max(1),
        }
    }

    /// Map points for homes sold inside `range`, as of today's local date.
    pub async fn list_homes(&self, range: RangeToken) -> Result<Vec<ResolvedPoint>, AppError> {
        self.list_homes_as_of(range, Local::now().date_naive()).await
    }

    pub async fn list_homes_as_of(
        &self,
        range: RangeToken,
        today: NaiveDate,
    ) -> Result<Vec<ResolvedPoint>, AppError> {
        let homes = self
            .store
            .find_all_homes()
            .await
            .context("Failed to load homes for map")?;
        let total = homes.len();

        let filter = RecencyFilter::new(range, today);
        let eligible: Vec<HomeRecord> = homes
            .into_iter()
            .filter(|home| home.sold_date.is_some())
            .filter(|home| filter.includes(home.sold_date.as_deref()))
            .collect();

        tracing::debug!(
            "Range '{}' (cutoff {:?}): {} of {} homes eligible",
            range,
            filter.cutoff(),
            eligible.len(),
            total
        );

        let (points, failures) = partition_outcomes(self.resolve_all(&eligible).await);
        log_failures(&failures);

        tracing::info!(
            "Home map for range '{}': {} points, {} dropped",
            range,
            points.len(),
            failures.len()
        );
        Ok(points)
    }

    /// Map points for every comp.
    pub async fn list_comps(&self) -> Result<Vec<ResolvedPoint>, AppError> {
        let comps = self
            .store
            .find_all_comps()
            .await
            .context("Failed to load comps for map")?;

        let (points, failures) = partition_outcomes(self.resolve_all(&comps).await);
        log_failures(&failures);

        tracing::info!(
            "Comp map: {} points, {} dropped",
            points.len(),
            failures.len()
        );
        Ok(points)
    }

    /// Homes exactly as stored.
    pub async fn list_raw_homes(&self) -> Result<Vec<HomeRecord>, AppError> {
        self.store
            .find_all_homes()
            .await
            .context("Failed to fetch homes")
    }

    pub async fn save_home(&self, input: HomeInput) -> Result<HomeRecord, AppError> {
        let home = input.into_new_home()?;
        self.store.insert_home(home).await
    }

    pub async fn save_comp(&self, input: CompInput) -> Result<CompRecord, AppError> {
        let comp = input.into_new_comp()?;
        self.store.insert_comp(comp).await
    }

    /// Geocodes every home and comp still missing coordinates, regardless of
    /// sold date.
    pub async fn backfill_missing(&self) -> Result<BackfillSummary, AppError> {
        let homes: Vec<HomeRecord> = self
            .store
            .find_all_homes()
            .await
            .context("Failed to load homes for backfill")?
            .into_iter()
            .filter(|home| home.coordinates.is_none())
            .collect();
        let comps: Vec<CompRecord> = self
            .store
            .find_all_comps()
            .await
            .context("Failed to load comps for backfill")?
            .into_iter()
            .filter(|comp| comp.coordinates.is_none())
            .collect();

        let mut outcomes = self.resolve_all(&homes).await;
        outcomes.extend(self.resolve_all(&comps).await);

        let attempted = outcomes.len();
        let (points, failures) = partition_outcomes(outcomes);
        log_failures(&failures);

        Ok(BackfillSummary {
            attempted,
            resolved: points.len(),
            failed: failures.len(),
        })
    }

    async fn resolve_all<R>(&self, records: &[R]) -> Vec<Outcome>
    where
        R: Geocodable + Sync,
    {
        // Boxed up front so the stream's future stays Send inside handlers
        let pending: Vec<BoxFuture<'_, Outcome>> = records
            .iter()
            .map(|record| Box::pin(self.resolve_one(record)) as BoxFuture<'_, Outcome>)
            .collect();

        stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn resolve_one<R>(&self, record: &R) -> Outcome
    where
        R: Geocodable + Sync,
    {
        (record.key(), self.resolver.resolve(record).await)
    }
}

/// Splits per-record outcomes into placed points and dropped records,
/// keeping the input order on both sides.
pub fn partition_outcomes(
    outcomes: Vec<Outcome>,
) -> (Vec<ResolvedPoint>, Vec<(RecordKey, ResolveFailure)>) {
    let mut points = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (key, outcome) in outcomes {
        match outcome {
            Ok(point) => points.push(point),
            Err(failure) => failures.push((key, failure)),
        }
    }

    (points, failures)
}

fn log_failures(failures: &[(RecordKey, ResolveFailure)]) {
    for (key, failure) in failures {
        tracing::warn!("Dropping {} from map results: {}", key, failure);
    }
}
