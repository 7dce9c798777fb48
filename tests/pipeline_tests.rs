/// Aggregation pipeline behavior against an in-memory store and a scripted
/// geocoder: cache hits, backfill, failure isolation, ordering and recency.
mod common;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{comp, home, home_query, ok_response, pipeline, pipeline_with, FakeGeocoder};
use hawthorn_map_api::aggregation::{BackfillSummary, PipelineSettings};
use hawthorn_map_api::db_storage::InMemoryRecordStore;
use hawthorn_map_api::errors::AppError;
use hawthorn_map_api::models::{
    CompInput, Coordinates, HomeInput, PointDetails, RangeToken, ResolvedPoint,
};
use hawthorn_map_api::services::GeocodeError;

fn june_first_2024() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn addresses(points: &[ResolvedPoint]) -> Vec<&str> {
    points.iter().map(|p| p.address.as_str()).collect()
}

const HAWTHORN: Coordinates = Coordinates {
    lat: 32.7486,
    lng: -117.1294,
};

#[tokio::test]
async fn cached_coordinates_skip_the_geocoder() {
    let record = home("3010 Upas St", Some("5/2/2024"), Some(HAWTHORN));
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let geocoder = Arc::new(FakeGeocoder::always(0.0, 0.0));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].coordinates(), HAWTHORN);
    assert_eq!(geocoder.calls(), 0);
    assert_eq!(store.coordinate_writes(), 0);
}

#[tokio::test]
async fn missing_coordinates_are_geocoded_and_persisted() {
    let record = home("2325 Juniper St", Some("5/2/2024"), None);
    let id = record.id;
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let geocoder = Arc::new(FakeGeocoder::always(32.7311, -117.1398));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert_eq!(points.len(), 1);
    assert_eq!(geocoder.queries(), vec![home_query("2325 Juniper St")]);

    let stored = store.home(id).unwrap().coordinates.unwrap();
    assert_eq!(stored, points[0].coordinates());
    assert_eq!(stored, Coordinates { lat: 32.7311, lng: -117.1398 });
    assert_eq!(store.coordinate_writes(), 1);
}

#[tokio::test]
async fn provider_failures_drop_the_record_without_writing() {
    let failures = vec![
        FakeGeocoder::status("ZERO_RESULTS"),
        FakeGeocoder::status("OK"),
        FakeGeocoder::status("OVER_QUERY_LIMIT"),
        FakeGeocoder::failing(GeocodeError::Transport("connection reset".to_string())),
        FakeGeocoder::failing(GeocodeError::CircuitOpen),
    ];

    for geocoder in failures {
        let record = home("1 Nowhere Ln", Some("5/2/2024"), None);
        let id = record.id;
        let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
        let geocoder = Arc::new(geocoder);
        let pipeline = pipeline(store.clone(), geocoder.clone());

        let points = pipeline
            .list_homes_as_of(RangeToken::All, june_first_2024())
            .await
            .unwrap();

        assert!(points.is_empty());
        assert_eq!(geocoder.calls(), 1, "single attempt, no retry");
        assert_eq!(store.coordinate_writes(), 0);
        assert_eq!(store.home(id).unwrap().coordinates, None);
    }
}

#[tokio::test]
async fn one_failure_does_not_affect_siblings() {
    let homes = vec![
        home("100 First Ave", Some("5/2/2024"), None),
        home("200 Bad Address", Some("5/2/2024"), None),
        home("300 Third Ave", Some("5/2/2024"), Some(HAWTHORN)),
    ];
    let store = Arc::new(InMemoryRecordStore::with_records(homes, vec![]));
    let geocoder = Arc::new(
        FakeGeocoder::always(32.72, -117.16).answer(
            &home_query("200 Bad Address"),
            Err(GeocodeError::Transport("boom".to_string())),
        ),
    );
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert_eq!(addresses(&points), vec!["100 First Ave", "300 Third Ave"]);
    assert_eq!(geocoder.calls(), 2);
    assert_eq!(store.coordinate_writes(), 1);
}

#[tokio::test]
async fn second_listing_is_a_pure_cache_read() {
    let record = home("4190 Park Blvd", Some("4/20/2024"), None);
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let geocoder = Arc::new(FakeGeocoder::always(32.7528, -117.1461));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let first = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();
    let second = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(geocoder.calls(), 1);
    assert_eq!(store.coordinate_writes(), 1);
}

#[tokio::test]
async fn recency_window_end_to_end() {
    // A: geocoded, sold two months before today
    // B: not geocoded, sold thirteen months before today
    // C: no sold date
    let a = home("A St", Some("4/1/2024"), Some(HAWTHORN));
    let b = home("B St", Some("5/1/2023"), None);
    let c = home("C St", None, None);
    let store = Arc::new(InMemoryRecordStore::with_records(vec![a, b, c], vec![]));
    let geocoder = Arc::new(FakeGeocoder::always(32.74, -117.12));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let recent = pipeline
        .list_homes_as_of(RangeToken::SixMonths, june_first_2024())
        .await
        .unwrap();
    assert_eq!(addresses(&recent), vec!["A St"]);
    assert_eq!(geocoder.calls(), 0);

    let everything = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();
    assert_eq!(addresses(&everything), vec!["A St", "B St"]);
    assert_eq!(geocoder.queries(), vec![home_query("B St")]);

    let two_years = pipeline
        .list_homes_as_of(RangeToken::TwoYears, june_first_2024())
        .await
        .unwrap();
    assert_eq!(addresses(&two_years), vec!["A St", "B St"]);
}

#[tokio::test]
async fn unparsable_sold_dates_only_survive_the_all_range() {
    let record = home("5 Legacy Row", Some("sometime in 2023"), Some(HAWTHORN));
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let pipeline = pipeline(store, Arc::new(FakeGeocoder::always(0.0, 0.0)));

    let windowed = pipeline
        .list_homes_as_of(RangeToken::OneYear, june_first_2024())
        .await
        .unwrap();
    assert!(windowed.is_empty());

    let all = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();
    assert_eq!(addresses(&all), vec!["5 Legacy Row"]);
}

#[tokio::test]
async fn results_follow_store_order_not_completion_order() {
    let homes = vec![
        home("Slow St", Some("5/2/2024"), None),
        home("Medium St", Some("5/2/2024"), None),
        home("Fast St", Some("5/2/2024"), None),
    ];
    let store = Arc::new(InMemoryRecordStore::with_records(homes, vec![]));
    let geocoder = Arc::new(
        FakeGeocoder::always(32.7, -117.1)
            .delay(&home_query("Slow St"), Duration::from_millis(120))
            .delay(&home_query("Medium St"), Duration::from_millis(60)),
    );
    let pipeline = pipeline(store, geocoder);

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert_eq!(addresses(&points), vec!["Slow St", "Medium St", "Fast St"]);
}

#[tokio::test]
async fn store_read_failure_fails_the_whole_call() {
    let store = Arc::new(InMemoryRecordStore::with_records(
        vec![home("A St", Some("4/1/2024"), Some(HAWTHORN))],
        vec![comp("1 Main St", Some(HAWTHORN))],
    ));
    store.set_fail_reads(true);
    let pipeline = pipeline(store, Arc::new(FakeGeocoder::always(0.0, 0.0)));

    assert!(pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .is_err());
    assert!(pipeline.list_comps().await.is_err());
}

#[tokio::test]
async fn failed_coordinate_write_drops_the_record() {
    let record = home("9 Readonly Way", Some("5/2/2024"), None);
    let id = record.id;
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    store.set_fail_writes(true);
    let geocoder = Arc::new(FakeGeocoder::always(32.7, -117.1));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert!(points.is_empty());
    assert_eq!(geocoder.calls(), 1);
    assert_eq!(store.home(id).unwrap().coordinates, None);
}

#[tokio::test]
async fn slow_provider_times_out_as_a_failure() {
    let record = home("77 Molasses Ct", Some("5/2/2024"), None);
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let geocoder = Arc::new(FakeGeocoder::always(32.7, -117.1).delay_all(Duration::from_secs(5)));
    let settings = PipelineSettings {
        geocode_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    let pipeline = pipeline_with(store.clone(), geocoder.clone(), settings);

    let points = pipeline
        .list_homes_as_of(RangeToken::All, june_first_2024())
        .await
        .unwrap();

    assert!(points.is_empty());
    assert_eq!(store.coordinate_writes(), 0);
}

#[tokio::test]
async fn concurrent_listings_share_one_geocoding_call() {
    let record = home("1 Shared Key Pl", Some("5/2/2024"), None);
    let store = Arc::new(InMemoryRecordStore::with_records(vec![record], vec![]));
    let geocoder =
        Arc::new(FakeGeocoder::always(32.7, -117.1).delay_all(Duration::from_millis(100)));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let (left, right) = tokio::join!(
        pipeline.list_homes_as_of(RangeToken::All, june_first_2024()),
        pipeline.list_homes_as_of(RangeToken::All, june_first_2024()),
    );

    assert_eq!(left.unwrap().len(), 1);
    assert_eq!(right.unwrap().len(), 1);
    assert_eq!(geocoder.calls(), 1);
    assert_eq!(store.coordinate_writes(), 1);
}

#[tokio::test]
async fn listings_run_on_spawned_tasks() {
    let store = Arc::new(InMemoryRecordStore::with_records(
        vec![home("3010 Upas St", Some("5/2/2024"), None)],
        vec![comp("1 Main St", None)],
    ));
    let geocoder = Arc::new(FakeGeocoder::always(32.7, -117.1));
    let pipeline = pipeline(store, geocoder);

    let homes = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.list_homes(RangeToken::All).await }
    });
    let comps = tokio::spawn(async move { pipeline.list_comps().await });

    assert_eq!(homes.await.unwrap().unwrap().len(), 1);
    assert_eq!(comps.await.unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn comps_are_listed_without_recency_and_keep_their_fields() {
    let comps = vec![
        comp("1 Main St", Some(HAWTHORN)),
        comp("2 Main St", None),
    ];
    let store = Arc::new(InMemoryRecordStore::with_records(vec![], comps));
    let geocoder = Arc::new(FakeGeocoder::always(32.71, -117.15));
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let points = pipeline.list_comps().await.unwrap();

    assert_eq!(addresses(&points), vec!["1 Main St", "2 Main St"]);
    assert_eq!(geocoder.queries(), vec!["2 Main St, CA".to_string()]);
    match &points[1].details {
        PointDetails::Comp(details) => {
            assert_eq!(details.bed_count, Some(3));
            assert_eq!(details.bath_count, Some(2.5));
            assert_eq!(details.square_footage, Some(1650));
            assert_eq!(details.year_built, Some(1948));
            assert_eq!(details.arv, Some(BigDecimal::from(905_000)));
        }
        other => panic!("expected comp details, got {:?}", other),
    }
}

#[tokio::test]
async fn save_comp_coerces_numeric_strings() {
    let store = Arc::new(InMemoryRecordStore::new());
    let pipeline = pipeline(store.clone(), Arc::new(FakeGeocoder::always(0.0, 0.0)));

    let input: CompInput =
        serde_json::from_value(json!({"address": "1 Main St", "bedCount": "3"})).unwrap();
    let saved = pipeline.save_comp(input).await.unwrap();

    assert_eq!(saved.bed_count, Some(3));
    assert_eq!(saved.bath_count, None);
    assert_eq!(saved.square_footage, None);
    assert_eq!(saved.year_built, None);
    assert_eq!(saved.arv, None);
    assert_eq!(saved.coordinates, None);
    assert_eq!(store.comp(saved.id), Some(saved));
}

#[tokio::test]
async fn invalid_home_is_not_persisted() {
    let store = Arc::new(InMemoryRecordStore::new());
    let pipeline = pipeline(store.clone(), Arc::new(FakeGeocoder::always(0.0, 0.0)));

    let input: HomeInput = serde_json::from_value(json!({
        "address": "4021 Hawthorn St",
        "city": "San Diego",
        "postalCode": "92103",
        "purchaseDate": "1/15/2024",
        "budget": 85000,
        "purchasePrice": 610000,
        "listPrice": 799000,
        "salesPrice": 785000,
        "link": "https://example.com/4021"
    }))
    .unwrap();

    let result = pipeline.save_home(input).await;

    assert!(matches!(result, Err(AppError::ValidationError(ref msg)) if msg.contains("soldDate")));
    assert!(pipeline.list_raw_homes().await.unwrap().is_empty());
}

#[tokio::test]
async fn backfill_geocodes_everything_missing_regardless_of_date() {
    let homes = vec![
        home("Old Sale Ave", Some("3/3/2015"), None),
        home("No Date Ave", None, None),
        home("Done Ave", Some("5/2/2024"), Some(HAWTHORN)),
    ];
    let comps = vec![comp("1 Main St", None), comp("2 Main St", Some(HAWTHORN))];
    let store = Arc::new(InMemoryRecordStore::with_records(homes, comps));
    let geocoder = Arc::new(
        FakeGeocoder::always(32.7, -117.1)
            .answer(&home_query("No Date Ave"), Ok(ok_response(32.8, -117.2)))
            .answer("1 Main St, CA", Err(GeocodeError::Status("ZERO_RESULTS".to_string()))),
    );
    let pipeline = pipeline(store.clone(), geocoder.clone());

    let summary = pipeline.backfill_missing().await.unwrap();

    assert_eq!(
        summary,
        BackfillSummary {
            attempted: 3,
            resolved: 2,
            failed: 1
        }
    );
    assert_eq!(store.coordinate_writes(), 2);

    let again = pipeline.backfill_missing().await.unwrap();
    assert_eq!(again.attempted, 1);
}
