// Flight offers search, offer pricing and airline reference data.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{code, code_list, in_range, ordered_dates, AccessError};
use crate::{
    cache_key::CacheKey,
    error::GatewayError,
    executor::HttpMethod,
    gateway::{CacheTtl, GatewayClient},
};

const FLIGHT_OFFERS: &str = "/v2/shopping/flight-offers";
const FLIGHT_PRICING: &str = "/v1/shopping/flight-offers/pricing";
const AIRLINES: &str = "/v1/reference-data/airlines";

// live pricing goes stale quickly; airline metadata barely changes
const SEARCH_TTL: CacheTtl = CacheTtl::minutes(5, 15);
const PRICING_TTL: CacheTtl = CacheTtl::minutes(2, 5);
const AIRLINES_TTL: CacheTtl = CacheTtl::hours(12, 24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl TravelClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelClass::Economy => "ECONOMY",
            TravelClass::PremiumEconomy => "PREMIUM_ECONOMY",
            TravelClass::Business => "BUSINESS",
            TravelClass::First => "FIRST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearchParams {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub adults: u8,
    pub children: Option<u8>,
    pub travel_class: Option<TravelClass>,
    pub non_stop: Option<bool>,
    pub currency_code: Option<String>,
    pub max: Option<u16>,
}

impl FlightSearchParams {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate, adults: u8) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            adults,
            children: None,
            travel_class: None,
            non_stop: None,
            currency_code: None,
            max: None,
        }
    }

    // Normalized copy, or the first problem found.
    fn validated(&self) -> Result<Self, GatewayError> {
        let origin = code("origin", &self.origin, 3)?;
        let destination = code("destination", &self.destination, 3)?;
        if origin == destination {
            return Err(GatewayError::Validation(
                "destination: must differ from origin".into(),
            ));
        }
        if let Some(return_date) = self.return_date {
            ordered_dates("departureDate", self.departure_date, "returnDate", return_date)?;
        }

        let adults = in_range("adults", self.adults, 1, 9)?;
        let travellers = u16::from(adults) + u16::from(self.children.unwrap_or(0));
        in_range("travellers", travellers, 1, 9)?;
        if let Some(max) = self.max {
            in_range("max", max, 1, 250)?;
        }

        Ok(Self {
            origin,
            destination,
            currency_code: self
                .currency_code
                .as_deref()
                .map(|c| code("currencyCode", c, 3))
                .transpose()?,
            ..self.clone()
        })
    }
}

pub struct FlightAccessor {
    gateway: Arc<GatewayClient>,
}

impl FlightAccessor {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }

    pub async fn search_flights(&self, params: &FlightSearchParams) -> Result<Value, AccessError> {
        self.search_flights_inner(params)
            .await
            .map_err(AccessError::during("flight search"))
    }

    async fn search_flights_inner(&self, params: &FlightSearchParams) -> Result<Value, GatewayError> {
        let params = params.validated()?;
        let key = CacheKey::new("flightSearch", &params)?;

        let request = self
            .gateway
            .request(HttpMethod::Get, FLIGHT_OFFERS)
            .with_query("originLocationCode", &params.origin)
            .with_query("destinationLocationCode", &params.destination)
            .with_query("departureDate", params.departure_date)
            .with_optional_query("returnDate", params.return_date)
            .with_query("adults", params.adults)
            .with_optional_query("children", params.children)
            .with_optional_query("travelClass", params.travel_class.map(|c| c.as_str()))
            .with_optional_query("nonStop", params.non_stop)
            .with_optional_query("currencyCode", params.currency_code.as_deref())
            .with_optional_query("max", params.max);

        self.gateway.fetch_json(&key, SEARCH_TTL, request).await
    }

    // Confirms the live price of an offer returned by `search_flights`.
    pub async fn price_offer(&self, offer: &Value) -> Result<Value, AccessError> {
        self.price_offer_inner(offer)
            .await
            .map_err(AccessError::during("flight pricing"))
    }

    async fn price_offer_inner(&self, offer: &Value) -> Result<Value, GatewayError> {
        if !offer.is_object() || offer.get("id").is_none() {
            return Err(GatewayError::Validation(
                "flightOffer: expected an offer object with an id".into(),
            ));
        }

        let key = CacheKey::new("flightPrice", offer)?;
        let body = json!({
            "data": {
                "type": "flight-offers-pricing",
                "flightOffers": [offer],
            }
        });
        let request = self
            .gateway
            .request(HttpMethod::Post, FLIGHT_PRICING)
            .with_body(body);

        self.gateway.fetch_json(&key, PRICING_TTL, request).await
    }

    pub async fn airlines(&self, codes: &[String]) -> Result<Value, AccessError> {
        self.airlines_inner(codes)
            .await
            .map_err(AccessError::during("airline lookup"))
    }

    async fn airlines_inner(&self, codes: &[String]) -> Result<Value, GatewayError> {
        let codes = code_list("airlineCodes", codes, 2)?.join(",");
        let key = CacheKey::new("airlines", &json!({ "airlineCodes": codes }))?;

        let request = self
            .gateway
            .request(HttpMethod::Get, AIRLINES)
            .with_query("airlineCodes", &codes);

        self.gateway.fetch_json(&key, AIRLINES_TTL, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{scripted_gateway, ScriptedTransport},
        transport::UpstreamResponse,
    };
    use std::time::Duration;

    fn del_bom() -> FlightSearchParams {
        FlightSearchParams::new("DEL", "BOM", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 1)
    }

    fn offers() -> Value {
        json!({
            "meta": {"count": 1},
            "data": [{"type": "flight-offer", "id": "1", "price": {"total": "5321.00", "currency": "INR"}}]
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_searches_make_one_upstream_call() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(300)));
        transport.push(Ok(UpstreamResponse::json(200, &offers())));
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        let params = del_bom();
        let (a, b) = tokio::join!(flights.search_flights(&params), flights.search_flights(&params));

        assert_eq!(transport.calls(), 1);
        assert_eq!(a.unwrap(), offers());
        assert_eq!(b.unwrap(), offers());
    }

    #[tokio::test]
    async fn test_search_builds_upstream_query() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Ok(UpstreamResponse::json(200, &offers())));
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        let params = FlightSearchParams {
            origin: "del".into(),
            travel_class: Some(TravelClass::Business),
            non_stop: Some(true),
            ..del_bom()
        };
        flights.search_flights(&params).await.unwrap();

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.endpoint(), FLIGHT_OFFERS);
        assert_eq!(request.query_value("originLocationCode"), Some("DEL"));
        assert_eq!(request.query_value("destinationLocationCode"), Some("BOM"));
        assert_eq!(request.query_value("departureDate"), Some("2025-01-01"));
        assert_eq!(request.query_value("adults"), Some("1"));
        assert_eq!(request.query_value("travelClass"), Some("BUSINESS"));
        assert_eq!(request.query_value("nonStop"), Some("true"));
        assert_eq!(request.query_value("returnDate"), None);

        // the same search with an upper-case origin hits the cache
        let params = FlightSearchParams {
            travel_class: Some(TravelClass::Business),
            non_stop: Some(true),
            ..del_bom()
        };
        flights.search_flights(&params).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_search_never_reaches_upstream() {
        let transport = Arc::new(ScriptedTransport::new());
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        let bad = [
            FlightSearchParams::new("DELHI", "BOM", del_bom().departure_date, 1),
            FlightSearchParams::new("DEL", "DEL", del_bom().departure_date, 1),
            FlightSearchParams::new("DEL", "BOM", del_bom().departure_date, 0),
            FlightSearchParams {
                return_date: NaiveDate::from_ymd_opt(2024, 12, 31),
                ..del_bom()
            },
            FlightSearchParams {
                adults: 6,
                children: Some(4),
                ..del_bom()
            },
        ];

        for params in bad {
            let err = flights.search_flights(&params).await.unwrap_err();
            assert_eq!(err.operation, "flight search");
            assert!(matches!(err.source, GatewayError::Validation(_)), "{err}");
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_error_names_operation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Ok(UpstreamResponse::json(
            400,
            &json!({"errors": [{"detail": "Date/Time is in the past"}]}),
        )));
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        let err = flights.search_flights(&del_bom()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error during flight search: Invalid request: Date/Time is in the past"
        );
    }

    #[tokio::test]
    async fn test_price_offer_posts_offer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Ok(UpstreamResponse::json(200, &json!({"data": {"type": "flight-offers-pricing"}}))));
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        let offer = offers()["data"][0].clone();
        flights.price_offer(&offer).await.unwrap();

        let requests = transport.requests();
        let request = &requests[0];
        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.endpoint(), FLIGHT_PRICING);
        assert_eq!(request.body().unwrap()["data"]["flightOffers"][0]["id"], "1");

        let err = flights.price_offer(&json!("not an offer")).await.unwrap_err();
        assert!(matches!(err.source, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_airline_codes_share_cache_entry_in_any_order() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(Ok(UpstreamResponse::json(200, &json!({"data": [{"iataCode": "AI"}, {"iataCode": "BA"}]}))));
        let flights = FlightAccessor::new(scripted_gateway(transport.clone()));

        flights.airlines(&["BA".into(), "AI".into()]).await.unwrap();
        flights.airlines(&["ai".into(), "ba".into(), "AI".into()]).await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requests()[0].query_value("airlineCodes"), Some("AI,BA"));
    }
}
