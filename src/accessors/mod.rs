// Domain accessors: thin, typed callers of the gateway.
//
// Each accessor validates its parameters, derives a tagged cache key, picks
// TTLs that match how volatile the data is and hands the request to
// `GatewayClient::fetch_json`. Upstream JSON is passed through untouched.

pub mod activity;
pub mod flight;
pub mod hotel;
pub mod location;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::GatewayConfig,
    error::{ConfigError, GatewayError},
    gateway::GatewayClient,
};

pub use activity::{ActivityAccessor, ActivitySearchParams, ActivitySquareParams};
pub use flight::{FlightAccessor, FlightSearchParams, TravelClass};
pub use hotel::{HotelAccessor, HotelOfferParams, HotelsByCityParams};
pub use location::{LocationAccessor, LocationSearchParams, LocationSubType, NearbyAirportsParams};

// A gateway failure tagged with the user-facing operation that hit it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Error during {operation}: {source}")]
pub struct AccessError {
    pub operation: &'static str,
    pub source: GatewayError,
}

impl AccessError {
    pub fn new(operation: &'static str, source: GatewayError) -> Self {
        Self { operation, source }
    }

    pub(crate) fn during(operation: &'static str) -> impl FnOnce(GatewayError) -> AccessError {
        move |source| AccessError::new(operation, source)
    }
}

// The structured result handed to callers outside the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<Result<T, AccessError>> for ApiResponse<T> {
    fn from(result: Result<T, AccessError>) -> Self {
        match result {
            Ok(data) => ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => ApiResponse {
                success: false,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

// All four accessors sharing one gateway.
pub struct TravelApi {
    pub flights: FlightAccessor,
    pub hotels: HotelAccessor,
    pub locations: LocationAccessor,
    pub activities: ActivityAccessor,
}

impl TravelApi {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self {
            flights: FlightAccessor::new(gateway.clone()),
            hotels: HotelAccessor::new(gateway.clone()),
            locations: LocationAccessor::new(gateway.clone()),
            activities: ActivityAccessor::new(gateway),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(GatewayClient::from_config(config)?)))
    }
}

// Parameter validation shared by the accessors

fn invalid(field: &str, reason: impl std::fmt::Display) -> GatewayError {
    GatewayError::Validation(format!("{field}: {reason}"))
}

// Upper-cased IATA style code of exactly `len` alphanumeric characters.
pub(crate) fn code(field: &str, value: &str, len: usize) -> Result<String, GatewayError> {
    let value = value.trim().to_ascii_uppercase();
    if value.len() != len || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(field, format!("expected a {len}-character code, got {value:?}")));
    }
    Ok(value)
}

// Identifier safe to splice into an endpoint path.
pub(crate) fn path_id(field: &str, value: &str) -> Result<String, GatewayError> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(invalid(field, format!("invalid identifier {value:?}")));
    }
    Ok(value.to_string())
}

pub(crate) fn in_range<T>(field: &str, value: T, min: T, max: T) -> Result<T, GatewayError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(invalid(field, format!("must be between {min} and {max}, got {value}")));
    }
    Ok(value)
}

pub(crate) fn latitude(field: &str, value: f64) -> Result<f64, GatewayError> {
    if !value.is_finite() {
        return Err(invalid(field, "must be a finite number"));
    }
    in_range(field, value, -90.0, 90.0)
}

pub(crate) fn longitude(field: &str, value: f64) -> Result<f64, GatewayError> {
    if !value.is_finite() {
        return Err(invalid(field, "must be a finite number"));
    }
    in_range(field, value, -180.0, 180.0)
}

pub(crate) fn ordered_dates(
    start_field: &str,
    start: NaiveDate,
    end_field: &str,
    end: NaiveDate,
) -> Result<(), GatewayError> {
    if end < start {
        return Err(invalid(end_field, format!("{end} is before {start_field} {start}")));
    }
    Ok(())
}

// Upper-cased, sorted and de-duplicated, so that equivalent lists share a
// cache key.
pub(crate) fn code_list(field: &str, values: &[String], len: usize) -> Result<Vec<String>, GatewayError> {
    if values.is_empty() {
        return Err(invalid(field, "at least one value is required"));
    }
    let mut codes = values
        .iter()
        .map(|value| code(field, value, len))
        .collect::<Result<Vec<_>, _>>()?;
    codes.sort();
    codes.dedup();
    Ok(codes)
}
