// Tours and activities around a point, inside a bounding box, or by id.

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

const ACTIVITIES: &str = "/v1/shopping/activities";
const ACTIVITIES_BY_SQUARE: &str = "/v1/shopping/activities/by-square";

const SEARCH_TTL: CacheTtl = CacheTtl::minutes(30, 120);
const ACTIVITY_TTL: CacheTtl = CacheTtl::hours(1, 6);

const MAX_RADIUS_KM: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySearchParams {
    pub latitude: f64,
    pub longitude: f64,
    // kilometres
    pub radius: Option<u32>,
}

impl ActivitySearchParams {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: None,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        latitude("latitude", self.latitude)?;
        longitude("longitude", self.longitude)?;
        if let Some(radius) = self.radius {
            in_range("radius", radius, 0, MAX_RADIUS_KM)?;
        }
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySquareParams {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl ActivitySquareParams {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Self {
        Self {
            north,
            west,
            south,
            east,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        latitude("north", self.north)?;
        latitude("south", self.south)?;
        longitude("west", self.west)?;
        longitude("east", self.east)?;
        if self.north <= self.south {
            return Err(GatewayError::Validation(
                "north: must be greater than south".into(),
            ));
        }
        Ok(self.clone())
    }
}

pub struct ActivityAccessor {
    gateway: Arc<GatewayClient>,
}

impl ActivityAccessor {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }

    pub async fn search_activities(&self, params: &ActivitySearchParams) -> Result<Value, AccessError> {
        self.search_activities_inner(params)
            .await
            .map_err(AccessError::during("activity search"))
    }

    async fn search_activities_inner(&self, params: &ActivitySearchParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new("activitySearch", &params)?;

        let request = self
            .gateway
            .request(HttpMethod::Get, ACTIVITIES)
            .with_query("latitude", params.latitude)
            .with_query("longitude", params.longitude)
            .with_optional_query("radius", params.radius);

        self.gateway.fetch_json(&key, SEARCH_TTL, request).await
    }

    pub async fn activities_in_square(&self, params: &ActivitySquareParams) -> Result<Value, AccessError> {
        self.activities_in_square_inner(params)
            .await
            .map_err(AccessError::during("activity search"))
    }

    async fn activities_in_square_inner(&self, params: &ActivitySquareParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new("activitySquare", &params)?;

        let request = self
            .gateway
            .request(HttpMethod::Get, ACTIVITIES_BY_SQUARE)
            .with_query("north", params.north)
            .with_query("west", params.west)
            .with_query("south", params.south)
            .with_query("east", params.east);

        self.gateway.fetch_json(&key, SEARCH_TTL, request).await
    }

    pub async fn activity(&self, activity_id: &str) -> Result<Value, AccessError> {
        self.activity_inner(activity_id)
            .await
            .map_err(AccessError::during("activity lookup"))
    }

    async fn activity_inner(&self, activity_id: &str) -> Result<Value, GatewayError> {
        let activity_id = path_id("activityId", activity_id)?;
        let key = CacheKey::for_id("activity", &activity_id);

        let request = self
            .gateway
            .request(HttpMethod::Get, format!("{ACTIVITIES}/{activity_id}"));

        self.gateway.fetch_json(&key, ACTIVITY_TTL, request).await
    }
}
