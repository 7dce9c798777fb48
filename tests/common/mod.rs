//! Shared fixtures: a scriptable geocoder and record builders.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use hawthorn_map_api::aggregation::{AggregationPipeline, PipelineSettings};
use hawthorn_map_api::db_storage::InMemoryRecordStore;
use hawthorn_map_api::models::{CompRecord, Coordinates, HomeRecord};
use hawthorn_map_api::services::{GeocodeError, GeocodeProvider, GeocodeResponse, STATUS_OK};

/// Geocoder that answers from a script and counts every call.
pub struct FakeGeocoder {
    default_answer: Result<GeocodeResponse, GeocodeError>,
    answers: Mutex<HashMap<String, Result<GeocodeResponse, GeocodeError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    fn with_default(default_answer: Result<GeocodeResponse, GeocodeError>) -> Self {
        Self {
            default_answer,
            answers: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            default_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Answers every query with one `OK` candidate.
    pub fn always(lat: f64, lng: f64) -> Self {
        Self::with_default(Ok(ok_response(lat, lng)))
    }

    /// Answers every query with the given status and no candidates.
    pub fn status(status: &str) -> Self {
        Self::with_default(Ok(GeocodeResponse {
            status: status.to_string(),
            candidates: vec![],
        }))
    }

    pub fn failing(error: GeocodeError) -> Self {
        Self::with_default(Err(error))
    }

    pub fn answer(self, query: &str, answer: Result<GeocodeResponse, GeocodeError>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(query.to_string(), answer);
        self
    }

    pub fn delay(self, query: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
        self
    }

    pub fn delay_all(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeocodeProvider for FakeGeocoder {
    async fn geocode(&self, query: &str) -> Result<GeocodeResponse, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let answer = self.answers.lock().unwrap().get(query).cloned();
        answer.unwrap_or_else(|| self.default_answer.clone())
    }
}

pub fn ok_response(lat: f64, lng: f64) -> GeocodeResponse {
    GeocodeResponse {
        status: STATUS_OK.to_string(),
        candidates: vec![Coordinates { lat, lng }],
    }
}

pub fn home(address: &str, sold_date: Option<&str>, coordinates: Option<Coordinates>) -> HomeRecord {
    HomeRecord {
        id: Uuid::new_v4(),
        address: address.to_string(),
        city: "San Diego".to_string(),
        postal_code: "92104".to_string(),
        purchase_date: "1/10/2022".to_string(),
        sold_date: sold_date.map(str::to_string),
        budget: BigDecimal::from(60_000),
        purchase_price: BigDecimal::from(540_000),
        list_price: BigDecimal::from(725_000),
        sales_price: BigDecimal::from(715_000),
        link: format!("https://example.com/{}", address.replace(' ', "-")),
        coordinates,
    }
}

pub fn comp(address: &str, coordinates: Option<Coordinates>) -> CompRecord {
    CompRecord {
        id: Uuid::new_v4(),
        address: address.to_string(),
        bed_count: Some(3),
        bath_count: Some(2.5),
        square_footage: Some(1650),
        year_built: Some(1948),
        arv: Some(BigDecimal::from(905_000)),
        coordinates,
    }
}

/// `"{address}, San Diego, CA 92104"`, the query built for fixture homes.
pub fn home_query(address: &str) -> String {
    format!("{}, San Diego, CA 92104", address)
}

pub fn pipeline(store: Arc<InMemoryRecordStore>, geocoder: Arc<FakeGeocoder>) -> AggregationPipeline {
    pipeline_with(store, geocoder, PipelineSettings::default())
}

pub fn pipeline_with(
    store: Arc<InMemoryRecordStore>,
    geocoder: Arc<FakeGeocoder>,
    settings: PipelineSettings,
) -> AggregationPipeline {
    AggregationPipeline::new(store, geocoder, settings)
}
