// Hotel lists per city, room offers and single-offer details.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{code, in_range, ordered_dates, path_id, AccessError};
use crate::{
    cache_key::CacheKey,
    error::GatewayError,
    executor::HttpMethod,
    gateway::{CacheTtl, GatewayClient},
};

const HOTELS_BY_CITY: &str = "/v1/reference-data/locations/hotels/by-city";
const HOTEL_OFFERS: &str = "/v3/shopping/hotel-offers";

const HOTEL_LIST_TTL: CacheTtl = CacheTtl::hours(6, 24);
const OFFERS_TTL: CacheTtl = CacheTtl::minutes(5, 15);
const OFFER_TTL: CacheTtl = CacheTtl::minutes(2, 5);

const MAX_HOTEL_IDS: usize = 50;

// Every offer tag starts with OFFER_TAG, so `invalidate_offers` drops searches
// and single-offer lookups with one prefix. Keep new offer tags under it.
const OFFER_TAG: &str = "hotelOffer";
const OFFER_SEARCH_TAG: &str = "hotelOffers";
const HOTEL_LIST_TAG: &str = "hotelsByCity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelsByCityParams {
    pub city_code: String,
    // kilometres
    pub radius: Option<u32>,
    pub ratings: Option<Vec<u8>>,
}

impl HotelsByCityParams {
    pub fn new(city_code: &str) -> Self {
        Self {
            city_code: city_code.to_string(),
            radius: None,
            ratings: None,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        if let Some(radius) = self.radius {
            in_range("radius", radius, 1, 300)?;
        }
        let ratings = match &self.ratings {
            Some(ratings) => {
                let mut ratings = ratings
                    .iter()
                    .map(|&r| in_range("ratings", r, 1, 5))
                    .collect::<Result<Vec<_>, _>>()?;
                ratings.sort_unstable();
                ratings.dedup();
                Some(ratings)
            }
            None => None,
        };

        Ok(Self {
            city_code: code("cityCode", &self.city_code, 3)?,
            radius: self.radius,
            ratings,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelOfferParams {
    pub hotel_ids: Vec<String>,
    pub adults: u8,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub room_quantity: Option<u8>,
    pub currency: Option<String>,
}

impl HotelOfferParams {
    pub fn new(hotel_ids: Vec<String>, adults: u8) -> Self {
        Self {
            hotel_ids,
            adults,
            check_in_date: None,
            check_out_date: None,
            room_quantity: None,
            currency: None,
        }
    }

    fn validated(&self) -> Result<Self, GatewayError> {
        if self.hotel_ids.is_empty() || self.hotel_ids.len() > MAX_HOTEL_IDS {
            return Err(GatewayError::Validation(format!(
                "hotelIds: between 1 and {MAX_HOTEL_IDS} ids are required"
            )));
        }
        let mut hotel_ids = self
            .hotel_ids
            .iter()
            .map(|id| code("hotelIds", id, 8))
            .collect::<Result<Vec<_>, _>>()?;
        hotel_ids.sort();
        hotel_ids.dedup();

        in_range("adults", self.adults, 1, 9)?;
        if let Some(rooms) = self.room_quantity {
            in_range("roomQuantity", rooms, 1, 9)?;
        }
        if let (Some(check_in), Some(check_out)) = (self.check_in_date, self.check_out_date) {
            if check_out == check_in {
                return Err(GatewayError::Validation(
                    "checkOutDate: must be after checkInDate".into(),
                ));
            }
            ordered_dates("checkInDate", check_in, "checkOutDate", check_out)?;
        }

        Ok(Self {
            hotel_ids,
            currency: self
                .currency
                .as_deref()
                .map(|c| code("currency", c, 3))
                .transpose()?,
            ..self.clone()
        })
    }
}

pub struct HotelAccessor {
    gateway: Arc<GatewayClient>,
}

impl HotelAccessor {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }

    pub async fn hotels_by_city(&self, params: &HotelsByCityParams) -> Result<Value, AccessError> {
        self.hotels_by_city_inner(params)
            .await
            .map_err(AccessError::during("hotel list"))
    }

    async fn hotels_by_city_inner(&self, params: &HotelsByCityParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new(HOTEL_LIST_TAG, &params)?;

        let ratings = params.ratings.as_ref().map(|ratings| {
            ratings
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",")
        });
        let request = self
            .gateway
            .request(HttpMethod::Get, HOTELS_BY_CITY)
            .with_query("cityCode", &params.city_code)
            .with_optional_query("radius", params.radius)
            .with_optional_query("radiusUnit", params.radius.map(|_| "KM"))
            .with_optional_query("ratings", ratings);

        self.gateway.fetch_json(&key, HOTEL_LIST_TTL, request).await
    }

    pub async fn search_offers(&self, params: &HotelOfferParams) -> Result<Value, AccessError> {
        self.search_offers_inner(params)
            .await
            .map_err(AccessError::during("hotel search"))
    }

    async fn search_offers_inner(&self, params: &HotelOfferParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new(OFFER_SEARCH_TAG, &params)?;

        let request = self
            .gateway
            .request(HttpMethod::Get, HOTEL_OFFERS)
            .with_query("hotelIds", params.hotel_ids.join(","))
            .with_query("adults", params.adults)
            .with_optional_query("checkInDate", params.check_in_date)
            .with_optional_query("checkOutDate", params.check_out_date)
            .with_optional_query("roomQuantity", params.room_quantity)
            .with_optional_query("currency", params.currency.as_deref());

        self.gateway.fetch_json(&key, OFFERS_TTL, request).await
    }

    pub async fn offer_details(&self, offer_id: &str) -> Result<Value, AccessError> {
        self.offer_details_inner(offer_id)
            .await
            .map_err(AccessError::during("hotel offer lookup"))
    }

    async fn offer_details_inner(&self, offer_id: &str) -> Result<Value, GatewayError> {
        let offer_id = path_id("offerId", offer_id)?;
        let key = CacheKey::for_id(OFFER_TAG, &offer_id);

        let request = self
            .gateway
            .request(HttpMethod::Get, format!("{HOTEL_OFFERS}/{offer_id}"));

        self.gateway.fetch_json(&key, OFFER_TTL, request).await
    }

    // Drops cached offers so the next search sees live availability, e.g.
    // right after a booking.
    pub fn invalidate_offers(&self) -> usize {
        self.gateway.invalidate(OFFER_TAG)
    }
}
