use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{FromRow, PgPool};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{CompRecord, Coordinates, HomeRecord, NewComp, NewHome, RecordKind};
use crate::recency::format_entry_date;

/// Keyed collection of homes and comps.
///
/// `find_all_*` return records in the store's natural iteration order
/// (insertion order). Coordinate updates touch latitude and longitude only.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_all_homes(&self) -> Result<Vec<HomeRecord>, AppError>;

    async fn find_all_comps(&self) -> Result<Vec<CompRecord>, AppError>;

    async fn update_coordinates(
        &self,
        kind: RecordKind,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<(), AppError>;

    async fn insert_home(&self, home: NewHome) -> Result<HomeRecord, AppError>;

    async fn insert_comp(&self, comp: NewComp) -> Result<CompRecord, AppError>;
}

fn home_from_new(id: Uuid, home: NewHome) -> HomeRecord {
    HomeRecord {
        id,
        address: home.address,
        city: home.city,
        postal_code: home.postal_code,
        purchase_date: format_entry_date(home.purchase_date),
        sold_date: Some(format_entry_date(home.sold_date)),
        budget: home.budget,
        purchase_price: home.purchase_price,
        list_price: home.list_price,
        sales_price: home.sales_price,
        link: home.link,
        coordinates: home.coordinates,
    }
}

fn comp_from_new(id: Uuid, comp: NewComp) -> CompRecord {
    CompRecord {
        id,
        address: comp.address,
        bed_count: comp.bed_count,
        bath_count: comp.bath_count,
        square_footage: comp.square_footage,
        year_built: comp.year_built,
        arv: comp.arv,
        coordinates: None,
    }
}

// ============ PostgreSQL ============

#[derive(Debug, FromRow)]
struct HomeRow {
    id: Uuid,
    address: String,
    city: String,
    postal_code: String,
    purchase_date: String,
    sold_date: Option<String>,
    budget: BigDecimal,
    purchase_price: BigDecimal,
    list_price: BigDecimal,
    sales_price: BigDecimal,
    link: String,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl From<HomeRow> for HomeRecord {
    fn from(row: HomeRow) -> Self {
        HomeRecord {
            id: row.id,
            address: row.address,
            city: row.city,
            postal_code: row.postal_code,
            purchase_date: row.purchase_date,
            sold_date: row.sold_date.filter(|d| !d.trim().is_empty()),
            budget: row.budget,
            purchase_price: row.purchase_price,
            list_price: row.list_price,
            sales_price: row.sales_price,
            link: row.link,
            coordinates: Coordinates::from_parts(row.lat, row.lng),
        }
    }
}

#[derive(Debug, FromRow)]
struct CompRow {
    id: Uuid,
    address: String,
    bed_count: Option<i32>,
    bath_count: Option<f64>,
    square_footage: Option<i32>,
    year_built: Option<i32>,
    arv: Option<BigDecimal>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl From<CompRow> for CompRecord {
    fn from(row: CompRow) -> Self {
        CompRecord {
            id: row.id,
            address: row.address,
            bed_count: row.bed_count,
            bath_count: row.bath_count,
            square_footage: row.square_footage,
            year_built: row.year_built,
            arv: row.arv,
            coordinates: Coordinates::from_parts(row.lat, row.lng),
        }
    }
}

const HOME_COLUMNS: &str = "id, address, city, postal_code, purchase_date, sold_date, budget, \
     purchase_price, list_price, sales_price, link, lat, lng";

const COMP_COLUMNS: &str =
    "id, address, bed_count, bath_count, square_footage, year_built, arv, lat, lng";

/// Record store backed by the `homes` and `comps` tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_all_homes(&self) -> Result<Vec<HomeRecord>, AppError> {
        let rows = sqlx::query_as::<_, HomeRow>(&format!(
            "SELECT {} FROM homes ORDER BY seq ASC",
            HOME_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch homes")?;

        Ok(rows.into_iter().map(HomeRecord::from).collect())
    }

    async fn find_all_comps(&self) -> Result<Vec<CompRecord>, AppError> {
        let rows = sqlx::query_as::<_, CompRow>(&format!(
            "SELECT {} FROM comps ORDER BY seq ASC",
            COMP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch comps")?;

        Ok(rows.into_iter().map(CompRecord::from).collect())
    }

    async fn update_coordinates(
        &self,
        kind: RecordKind,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<(), AppError> {
        // Table name comes from a closed enum, never from input
        let result = sqlx::query(&format!(
            "UPDATE {} SET lat = $2, lng = $3 WHERE id = $1",
            kind.table()
        ))
        .bind(id)
        .bind(coordinates.lat)
        .bind(coordinates.lng)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store coordinates for {} {}", kind, id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::PersistenceError(format!(
                "No {} with id {} to update",
                kind, id
            )));
        }

        Ok(())
    }

    async fn insert_home(&self, home: NewHome) -> Result<HomeRecord, AppError> {
        let record = home_from_new(Uuid::new_v4(), home);
        let coordinates = record.coordinates;

        let row = sqlx::query_as::<_, HomeRow>(&format!(
            r#"
            INSERT INTO homes (
                id, address, city, postal_code, purchase_date, sold_date, budget,
                purchase_price, list_price, sales_price, link, lat, lng
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            HOME_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.address)
        .bind(&record.city)
        .bind(&record.postal_code)
        .bind(&record.purchase_date)
        .bind(&record.sold_date)
        .bind(&record.budget)
        .bind(&record.purchase_price)
        .bind(&record.list_price)
        .bind(&record.sales_price)
        .bind(&record.link)
        .bind(coordinates.map(|c| c.lat))
        .bind(coordinates.map(|c| c.lng))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert home: {}", e);
            AppError::PersistenceError("could not save home".to_string())
        })?;

        tracing::info!("Inserted home {} ({})", row.id, row.address);
        Ok(row.into())
    }

    async fn insert_comp(&self, comp: NewComp) -> Result<CompRecord, AppError> {
        let record = comp_from_new(Uuid::new_v4(), comp);

        let row = sqlx::query_as::<_, CompRow>(&format!(
            r#"
            INSERT INTO comps (
                id, address, bed_count, bath_count, square_footage, year_built, arv
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            COMP_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.address)
        .bind(record.bed_count)
        .bind(record.bath_count)
        .bind(record.square_footage)
        .bind(record.year_built)
        .bind(&record.arv)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert comp: {}", e);
            AppError::PersistenceError("could not save comp".to_string())
        })?;

        tracing::info!("Inserted comp {} ({})", row.id, row.address);
        Ok(row.into())
    }
}

// ============ In-memory ============

/// Vec-backed store for tests and local experiments. Keeps insertion order
/// and can be told to fail reads or writes.
#[derive(Default)]
pub struct InMemoryRecordStore {
    homes: RwLock<Vec<HomeRecord>>,
    comps: RwLock<Vec<CompRecord>>,
    coordinate_writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(homes: Vec<HomeRecord>, comps: Vec<CompRecord>) -> Self {
        Self {
            homes: RwLock::new(homes),
            comps: RwLock::new(comps),
            ..Self::default()
        }
    }

    /// Number of successful `update_coordinates` calls so far.
    pub fn coordinate_writes(&self) -> usize {
        self.coordinate_writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn home(&self, id: Uuid) -> Option<HomeRecord> {
        self.homes
            .read()
            .ok()?
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    pub fn comp(&self, id: Uuid) -> Option<CompRecord> {
        self.comps
            .read()
            .ok()?
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    fn check_reads(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceError("record store unreachable".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self, what: &str) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceError(format!(
                "could not save {}: write rejected",
                what
            )));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::PersistenceError("record store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_all_homes(&self) -> Result<Vec<HomeRecord>, AppError> {
        self.check_reads()?;
        Ok(self.homes.read().map_err(poisoned)?.clone())
    }

    async fn find_all_comps(&self) -> Result<Vec<CompRecord>, AppError> {
        self.check_reads()?;
        Ok(self.comps.read().map_err(poisoned)?.clone())
    }

    async fn update_coordinates(
        &self,
        kind: RecordKind,
        id: Uuid,
        coordinates: Coordinates,
    ) -> Result<(), AppError> {
        self.check_writes("coordinates")?;

        let updated = match kind {
            RecordKind::Home => self
                .homes
                .write()
                .map_err(poisoned)?
                .iter_mut()
                .find(|h| h.id == id)
                .map(|h| h.coordinates = Some(coordinates))
                .is_some(),
            RecordKind::Comp => self
                .comps
                .write()
                .map_err(poisoned)?
                .iter_mut()
                .find(|c| c.id == id)
                .map(|c| c.coordinates = Some(coordinates))
                .is_some(),
        };

        if !updated {
            return Err(AppError::PersistenceError(format!(
                "No {} with id {} to update",
                kind, id
            )));
        }

        self.coordinate_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_home(&self, home: NewHome) -> Result<HomeRecord, AppError> {
        self.check_writes("home")?;
        let record = home_from_new(Uuid::new_v4(), home);
        self.homes.write().map_err(poisoned)?.push(record.clone());
        Ok(record)
    }

    async fn insert_comp(&self, comp: NewComp) -> Result<CompRecord, AppError> {
        self.check_writes("comp")?;
        let record = comp_from_new(Uuid::new_v4(), comp);
        self.comps.write().map_err(poisoned)?.push(record.clone());
        Ok(record)
    }
}
