//! Hawthorn Map API Library
//!
//! Tracks sold homes and comparable properties and serves them as map points.
//! Coordinates are geocoded once per record and written back to storage, so
//! later requests are served from the store.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Aggregation, coordinate resolution and recency rules.
//! - `integrations`: Geocoding provider and record storage.
//! - `aggregation`: Map aggregation pipeline and record operations.
//! - `circuit_breaker`: Circuit breaker for the geocoding provider.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema bootstrap.
//! - `db_storage`: Record store trait with Postgres and in-memory backends.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and routes.
//! - `models`: Records, map points and create payloads.
//! - `recency`: Sold-date parsing and recency window.
//! - `resolver`: Per-record coordinate resolution and backfill.
//! - `services`: Geocoding provider client.

pub mod api;
pub mod core;
pub mod integrations;

pub mod aggregation;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod recency;
pub mod resolver;
pub mod services;
