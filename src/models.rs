use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;
use crate::recency::parse_input_date;

// ============ Identity ============

/// Which collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Home,
    Comp,
}

impl RecordKind {
    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Home => "homes",
            RecordKind::Comp => "comps",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Home => write!(f, "home"),
            RecordKind::Comp => write!(f, "comp"),
        }
    }
}

/// Store-wide identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: Uuid,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ============ Coordinates ============

/// A latitude/longitude pair. Records hold `Option<Coordinates>`, so a
/// half-populated pair cannot exist in the domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Builds a pair from two nullable storage columns.
    ///
    /// Returns `None` unless both halves are present and finite; a partial or
    /// NaN pair is treated as "not yet geocoded".
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some(Self { lat, lng })
            }
            _ => None,
        }
    }
}

// ============ Stored records ============

/// A transacted home as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRecord {
    pub id: Uuid,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    /// Data-entry format `M/D/YYYY`.
    pub purchase_date: String,
    /// Data-entry format `M/D/YYYY`; may be missing on imported rows.
    pub sold_date: Option<String>,
    pub budget: BigDecimal,
    pub purchase_price: BigDecimal,
    pub list_price: BigDecimal,
    pub sales_price: BigDecimal,
    pub link: String,
    #[serde(flatten)]
    pub coordinates: Option<Coordinates>,
}

/// A comparable property used for valuation analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompRecord {
    pub id: Uuid,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bed_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bath_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arv: Option<BigDecimal>,
    #[serde(flatten)]
    pub coordinates: Option<Coordinates>,
}

// ============ Map output ============

/// A display-ready map point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPoint {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    #[serde(flatten)]
    pub details: PointDetails,
}

impl ResolvedPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointDetails {
    Home(HomeDetails),
    Comp(CompDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeDetails {
    pub sales_price: BigDecimal,
    pub sold_date: Option<String>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bed_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bath_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arv: Option<BigDecimal>,
}

// ============ Recency window ============

/// Lookback window applied to home sold dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeToken {
    #[default]
    All,
    SixMonths,
    OneYear,
    TwoYears,
}

impl RangeToken {
    /// Window length in calendar months, `None` for `All`.
    pub fn lookback_months(&self) -> Option<u32> {
        match self {
            RangeToken::All => None,
            RangeToken::SixMonths => Some(6),
            RangeToken::OneYear => Some(12),
            RangeToken::TwoYears => Some(24),
        }
    }

    /// Lenient parse used at the HTTP boundary: a missing or unknown token
    /// means no filtering.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            None => RangeToken::All,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::debug!("Unknown range token '{}', falling back to 'all'", raw);
                RangeToken::All
            }),
        }
    }
}

impl FromStr for RangeToken {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(RangeToken::All),
            "6months" | "last-6-months" => Ok(RangeToken::SixMonths),
            "1year" | "last-1-year" => Ok(RangeToken::OneYear),
            "2years" | "last-2-years" => Ok(RangeToken::TwoYears),
            other => Err(AppError::ParseError(format!(
                "Unknown range '{}', expected all, 6months, 1year or 2years",
                other
            ))),
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            RangeToken::All => "all",
            RangeToken::SixMonths => "6months",
            RangeToken::OneYear => "1year",
            RangeToken::TwoYears => "2years",
        };
        f.write_str(token)
    }
}

// ============ Create payloads ============

/// Raw `POST /sold-homes` body. Every field is kept loosely typed so that
/// validation can report all problems at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeInput {
    pub address: Option<Value>,
    pub city: Option<Value>,
    #[serde(alias = "zip", alias = "zipCode")]
    pub postal_code: Option<Value>,
    pub purchase_date: Option<Value>,
    pub sold_date: Option<Value>,
    pub budget: Option<Value>,
    pub purchase_price: Option<Value>,
    pub list_price: Option<Value>,
    pub sales_price: Option<Value>,
    pub link: Option<Value>,
    /// Only honored by bulk import.
    pub lat: Option<Value>,
    pub lng: Option<Value>,
}

/// A fully validated home, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHome {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub purchase_date: NaiveDate,
    pub sold_date: NaiveDate,
    pub budget: BigDecimal,
    pub purchase_price: BigDecimal,
    pub list_price: BigDecimal,
    pub sales_price: BigDecimal,
    pub link: String,
    pub coordinates: Option<Coordinates>,
}

impl HomeInput {
    /// Validates every required field, collecting all failures into one
    /// `ValidationError`. Coordinates are dropped; use [`HomeInput::into_imported_home`]
    /// to keep them.
    pub fn into_new_home(self) -> Result<NewHome, AppError> {
        let mut home = self.into_imported_home()?;
        home.coordinates = None;
        Ok(home)
    }

    /// Same validation as [`HomeInput::into_new_home`], but keeps a complete
    /// coordinate pair when the source document carries one.
    pub fn into_imported_home(self) -> Result<NewHome, AppError> {
        let mut problems = Vec::new();

        let address = required_text(&self.address, "address", &mut problems);
        let city = required_text(&self.city, "city", &mut problems);
        let postal_code = required_text(&self.postal_code, "postalCode", &mut problems);
        let link = required_text(&self.link, "link", &mut problems);
        let purchase_date = required_date(&self.purchase_date, "purchaseDate", &mut problems);
        let sold_date = required_date(&self.sold_date, "soldDate", &mut problems);
        let budget = required_decimal(&self.budget, "budget", &mut problems);
        let purchase_price = required_decimal(&self.purchase_price, "purchasePrice", &mut problems);
        let list_price = required_decimal(&self.list_price, "listPrice", &mut problems);
        let sales_price = required_decimal(&self.sales_price, "salesPrice", &mut problems);

        let coordinates = Coordinates::from_parts(
            self.lat.as_ref().and_then(coerce_float),
            self.lng.as_ref().and_then(coerce_float),
        );

        match (
            address,
            city,
            postal_code,
            link,
            purchase_date,
            sold_date,
            budget,
            purchase_price,
            list_price,
            sales_price,
        ) {
            (
                Some(address),
                Some(city),
                Some(postal_code),
                Some(link),
                Some(purchase_date),
                Some(sold_date),
                Some(budget),
                Some(purchase_price),
                Some(list_price),
                Some(sales_price),
            ) if problems.is_empty() => Ok(NewHome {
                address,
                city,
                postal_code,
                purchase_date,
                sold_date,
                budget,
                purchase_price,
                list_price,
                sales_price,
                link,
                coordinates,
            }),
            _ => Err(AppError::ValidationError(problems.join("; "))),
        }
    }
}

/// Raw `POST /api/comps` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompInput {
    pub address: Option<Value>,
    pub bed_count: Option<Value>,
    pub bath_count: Option<Value>,
    pub square_footage: Option<Value>,
    pub year_built: Option<Value>,
    pub arv: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComp {
    pub address: String,
    pub bed_count: Option<i32>,
    pub bath_count: Option<f64>,
    pub square_footage: Option<i32>,
    pub year_built: Option<i32>,
    pub arv: Option<BigDecimal>,
}

impl CompInput {
    /// Only the address is required. Numeric fields that are missing or do not
    /// coerce are stored as absent.
    pub fn into_new_comp(self) -> Result<NewComp, AppError> {
        let mut problems = Vec::new();
        let address = required_text(&self.address, "address", &mut problems)
            .ok_or_else(|| AppError::ValidationError(problems.join("; ")))?;

        Ok(NewComp {
            address,
            bed_count: self.bed_count.as_ref().and_then(coerce_integer),
            bath_count: self.bath_count.as_ref().and_then(coerce_float),
            square_footage: self.square_footage.as_ref().and_then(coerce_integer),
            year_built: self.year_built.as_ref().and_then(coerce_integer),
            arv: self.arv.as_ref().and_then(coerce_decimal),
        })
    }
}

// ============ Coercion ============

/// Trims and drops thousands separators, so "1,800" reads as "1800".
fn without_separators(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ',').collect()
}

/// Accepts JSON numbers and numeric strings ("3", " 3 ", "3.0", "1,800").
/// Fractional values do not coerce.
pub fn coerce_integer(value: &Value) -> Option<i32> {
    let as_float = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i32::try_from(i).ok();
            }
            n.as_f64()?
        }
        Value::String(s) => {
            let s = without_separators(s);
            if let Ok(i) = s.parse::<i64>() {
                return i32::try_from(i).ok();
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if as_float.is_finite()
        && as_float.fract() == 0.0
        && as_float >= i32::MIN as f64
        && as_float <= i32::MAX as f64
    {
        Some(as_float as i32)
    } else {
        None
    }
}

/// Plain numbers only. Used for coordinates and bath counts, where a comma
/// is not a thousands separator.
pub fn coerce_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Currency coercion. Strings may carry a leading `$` and thousands separators.
pub fn coerce_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => {
            if !n.as_f64().map(f64::is_finite).unwrap_or(false) {
                return None;
            }
            BigDecimal::from_str(&n.to_string()).ok()
        }
        Value::String(s) => {
            let cleaned = without_separators(s.trim().trim_start_matches('$'));
            if cleaned.is_empty() {
                return None;
            }
            BigDecimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

fn required_text(value: &Option<Value>, field: &str, problems: &mut Vec<String>) -> Option<String> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(_) => {
            problems.push(format!("{} must be text", field));
            return None;
        }
    };
    if text.is_empty() {
        problems.push(format!("{} is required", field));
        return None;
    }
    Some(text)
}

fn required_date(value: &Option<Value>, field: &str, problems: &mut Vec<String>) -> Option<NaiveDate> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => match parse_input_date(s) {
            Ok(date) => Some(date),
            Err(_) => {
                problems.push(format!("{} must be a date like 6/21/2024", field));
                None
            }
        },
        Some(Value::Null) | None => {
            problems.push(format!("{} is required", field));
            None
        }
        Some(Value::String(_)) => {
            problems.push(format!("{} is required", field));
            None
        }
        Some(_) => {
            problems.push(format!("{} must be a date like 6/21/2024", field));
            None
        }
    }
}

fn required_decimal(
    value: &Option<Value>,
    field: &str,
    problems: &mut Vec<String>,
) -> Option<BigDecimal> {
    match value {
        Some(Value::Null) | None => {
            problems.push(format!("{} is required", field));
            None
        }
        Some(v) => {
            let parsed = coerce_decimal(v);
            if parsed.is_none() {
                problems.push(format!("{} must be a number", field));
            }
            parsed
        }
    }
}
