use sqlx::{postgres::PgPoolOptions, PgPool};

/// Idempotent schema bootstrap. Dates stay in their data-entry text form;
/// currency is NUMERIC; coordinates are both-or-neither.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS homes (
        id UUID PRIMARY KEY,
        address TEXT NOT NULL,
        city TEXT NOT NULL,
        postal_code TEXT NOT NULL,
        purchase_date TEXT NOT NULL,
        sold_date TEXT,
        budget NUMERIC NOT NULL,
        purchase_price NUMERIC NOT NULL,
        list_price NUMERIC NOT NULL,
        sales_price NUMERIC NOT NULL,
        link TEXT NOT NULL,
        lat DOUBLE PRECISION,
        lng DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT homes_coordinates_paired CHECK ((lat IS NULL) = (lng IS NULL))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comps (
        id UUID PRIMARY KEY,
        address TEXT NOT NULL,
        bed_count INTEGER,
        bath_count DOUBLE PRECISION,
        square_footage INTEGER,
        year_built INTEGER,
        arv NUMERIC,
        lat DOUBLE PRECISION,
        lng DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT comps_coordinates_paired CHECK ((lat IS NULL) = (lng IS NULL))
    )
    "#,
    // Insertion order; created_at can tie within one transaction
    r#"
    DO $$
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_name = 'homes' AND column_name = 'seq'
        ) THEN
            ALTER TABLE homes ADD COLUMN seq BIGSERIAL;
        END IF;
    END
    $$
    "#,
    r#"
    DO $$
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_name = 'comps' AND column_name = 'seq'
        ) THEN
            ALTER TABLE comps ADD COLUMN seq BIGSERIAL;
        END IF;
    END
    $$
    "#,
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}
