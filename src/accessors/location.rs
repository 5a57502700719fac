// Airport and city lookup by keyword, by id and by proximity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{in_range, latitude, longitude, path_id, AccessError};
use crate::{
    cache_key::CacheKey,
    error::GatewayError,
    executor::HttpMethod,
    gateway::{CacheTtl, GatewayClient},
};

const LOCATIONS: &str = "/v1/reference-data/locations";
const NEAREST_AIRPORTS: &str = "/v1/reference-data/locations/airports";

const SEARCH_TTL: CacheTtl = CacheTtl::hours(6, 24);
const LOCATION_TTL: CacheTtl = CacheTtl::hours(12, 24);
const NEAREST_TTL: CacheTtl = CacheTtl::hours(6, 24);

const MIN_KEYWORD_LEN: usize = 2;
const MAX_RADIUS_KM: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationSubType {
    Airport,
    City,
}

impl LocationSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSubType::Airport => "AIRPORT",
            LocationSubType::City => "CITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSearchParams {
    pub keyword: String,
    pub sub_types: Vec<LocationSubType>,
    pub page_limit: Option<u16>,
}

impl LocationSearchParams {
    // Airports and cities matching `keyword`.
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            sub_types: vec![LocationSubType::Airport, LocationSubType::City],
            page_limit: None,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        let keyword = self.keyword.trim();
        if keyword.chars().count() < MIN_KEYWORD_LEN {
            return Err(GatewayError::Validation(format!(
                "keyword: at least {MIN_KEYWORD_LEN} characters are required"
            )));
        }
        if self.sub_types.is_empty() {
            return Err(GatewayError::Validation(
                "subType: at least one location type is required".into(),
            ));
        }
        if let Some(limit) = self.page_limit {
            in_range("page[limit]", limit, 1, 100)?;
        }

        let mut sub_types = self.sub_types.clone();
        sub_types.sort();
        sub_types.dedup();

        Ok(Self {
            keyword: keyword.to_uppercase(),
            sub_types,
            page_limit: self.page_limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyAirportsParams {
    pub latitude: f64,
    pub longitude: f64,
    // kilometres
    pub radius: Option<u32>,
    pub page_limit: Option<u16>,
}

impl NearbyAirportsParams {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: None,
            page_limit: None,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        latitude("latitude", self.latitude)?;
        longitude("longitude", self.longitude)?;
        if let Some(radius) = self.radius {
            in_range("radius", radius, 1, MAX_RADIUS_KM)?;
        }
        if let Some(limit) = self.page_limit {
            in_range("page[limit]", limit, 1, 100)?;
        }
        Ok(self.clone())
    }
}

pub struct LocationAccessor {
    gateway: Arc<GatewayClient>,
}

impl LocationAccessor {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }

    pub async fn search_locations(&self, params: &LocationSearchParams) -> Result<Value, AccessError> {
        self.search_locations_inner(params)
            .await
            .map_err(AccessError::during("location search"))
    }

    async fn search_locations_inner(&self, params: &LocationSearchParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new("locationSearch", &params)?;

        let sub_types = params
            .sub_types
            .iter()
            .map(LocationSubType::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .gateway
            .request(HttpMethod::Get, LOCATIONS)
            .with_query("keyword", &params.keyword)
            .with_query("subType", sub_types)
            .with_optional_query("page[limit]", params.page_limit);

        self.gateway.fetch_json(&key, SEARCH_TTL, request).await
    }

    pub async fn location(&self, location_id: &str) -> Result<Value, AccessError> {
        self.location_inner(location_id)
            .await
            .map_err(AccessError::during("location lookup"))
    }

    async fn location_inner(&self, location_id: &str) -> Result<Value, GatewayError> {
        let location_id = path_id("locationId", location_id)?.to_uppercase();
        let key = CacheKey::for_id("location", &location_id);

        let request = self
            .gateway
            .request(HttpMethod::Get, format!("{LOCATIONS}/{location_id}"));

        self.gateway.fetch_json(&key, LOCATION_TTL, request).await
    }

    pub async fn nearest_airports(&self, params: &NearbyAirportsParams) -> Result<Value, AccessError> {
        self.nearest_airports_inner(params)
            .await
            .map_err(AccessError::during("nearest airport search"))
    }

    async fn nearest_airports_inner(&self, params: &NearbyAirportsParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new("nearestAirports", &params)?;

        let request = self
            .gateway
            .request(HttpMethod::Get, NEAREST_AIRPORTS)
            .with_query("latitude", params.latitude)
            .with_query("longitude", params.longitude)
            .with_optional_query("radius", params.radius)
            .with_optional_query("page[limit]", params.page_limit);

        self.gateway.fetch_json(&key, NEAREST_TTL, request).await
    }
}
