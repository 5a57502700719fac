use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use travel_gateway::{
    accessors::{
        ActivitySearchParams, ActivitySquareParams, FlightSearchParams, HotelOfferParams,
        HotelsByCityParams, LocationSearchParams, LocationSubType, NearbyAirportsParams, TravelClass,
    },
    telemetry, ApiResponse, GatewayClient, GatewayConfig, TravelApi,
};

#[derive(Parser)]
#[command(name = "travel-gateway")]
#[command(about = "Query the travel content API through the caching gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Upstream base URL (overrides TRAVEL_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search flight offers
    Flights(FlightArgs),
    /// List hotels in a city, or search room offers
    Hotels(HotelArgs),
    /// Find airports and cities
    Locations(LocationArgs),
    /// Find tours and activities
    Activities(ActivityArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum CabinArg {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl From<CabinArg> for TravelClass {
    fn from(cabin: CabinArg) -> Self {
        match cabin {
            CabinArg::Economy => TravelClass::Economy,
            CabinArg::PremiumEconomy => TravelClass::PremiumEconomy,
            CabinArg::Business => TravelClass::Business,
            CabinArg::First => TravelClass::First,
        }
    }
}

#[derive(Args)]
struct FlightArgs {
    /// Origin IATA code (e.g. DEL)
    origin: String,
    /// Destination IATA code (e.g. BOM)
    destination: String,
    /// Departure date, YYYY-MM-DD
    date: NaiveDate,
    /// Return date for round trips
    #[arg(long)]
    return_date: Option<NaiveDate>,
    #[arg(long, default_value_t = 1)]
    adults: u8,
    #[arg(long)]
    children: Option<u8>,
    #[arg(long, value_enum)]
    class: Option<CabinArg>,
    #[arg(long)]
    non_stop: bool,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    max: Option<u16>,
}

#[derive(Args)]
struct HotelArgs {
    /// City code for a hotel list (e.g. PAR)
    #[arg(long, conflicts_with = "hotel_ids", required_unless_present_any = ["hotel_ids", "offer"])]
    city: Option<String>,
    /// Comma separated hotel ids for an offer search
    #[arg(long, value_delimiter = ',')]
    hotel_ids: Vec<String>,
    /// Hotel list radius in km
    #[arg(long)]
    radius: Option<u32>,
    #[arg(long, default_value_t = 1)]
    adults: u8,
    #[arg(long)]
    check_in: Option<NaiveDate>,
    #[arg(long)]
    check_out: Option<NaiveDate>,
    /// Fetch one offer by id instead of searching
    #[arg(long, conflicts_with_all = ["city", "hotel_ids"])]
    offer: Option<String>,
}

#[derive(Args)]
struct LocationArgs {
    /// Keyword to search for (e.g. "new york")
    #[arg(required_unless_present_any = ["id", "near"])]
    keyword: Option<String>,
    /// Look up a single location id
    #[arg(long)]
    id: Option<String>,
    /// Nearest airports to LAT,LON
    #[arg(long, value_delimiter = ',', num_args = 2, allow_hyphen_values = true)]
    near: Vec<f64>,
    /// Radius in km for --near
    #[arg(long)]
    radius: Option<u32>,
    /// Only airports
    #[arg(long)]
    airports_only: bool,
}

#[derive(Args)]
struct ActivityArgs {
    #[arg(
        long,
        allow_hyphen_values = true,
        requires = "longitude",
        required_unless_present_any = ["id", "square"]
    )]
    latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true, requires = "latitude")]
    longitude: Option<f64>,
    #[arg(long)]
    radius: Option<u32>,
    /// Bounding box NORTH,WEST,SOUTH,EAST
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
    square: Vec<f64>,
    /// Look up a single activity id
    #[arg(long)]
    id: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level)?;

    let mut config = GatewayConfig::from_env().context("loading gateway configuration")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    config.validate()?;

    let gateway = Arc::new(GatewayClient::from_config(&config)?);
    let _sweepers = gateway.spawn_sweepers();
    let api = TravelApi::new(gateway);

    let response: ApiResponse<Value> = match cli.command {
        Commands::Flights(args) => flights(&api, args).await,
        Commands::Hotels(args) => hotels(&api, args).await,
        Commands::Locations(args) => locations(&api, args).await,
        Commands::Activities(args) => activities(&api, args).await,
    };

    print_json(&response, cli.pretty)?;
    if !response.success {
        std::process::exit(2);
    }
    Ok(())
}

async fn flights(api: &TravelApi, args: FlightArgs) -> ApiResponse<Value> {
    let params = FlightSearchParams {
        return_date: args.return_date,
        children: args.children,
        travel_class: args.class.map(TravelClass::from),
        non_stop: args.non_stop.then_some(true),
        currency_code: args.currency,
        max: args.max,
        ..FlightSearchParams::new(&args.origin, &args.destination, args.date, args.adults)
    };
    api.flights.search_flights(&params).await.into()
}

async fn hotels(api: &TravelApi, args: HotelArgs) -> ApiResponse<Value> {
    if let Some(offer) = args.offer {
        return api.hotels.offer_details(&offer).await.into();
    }

    match args.city {
        Some(city) => {
            let params = HotelsByCityParams {
                radius: args.radius,
                ..HotelsByCityParams::new(&city)
            };
            api.hotels.hotels_by_city(&params).await.into()
        }
        None => {
            let params = HotelOfferParams {
                check_in_date: args.check_in,
                check_out_date: args.check_out,
                ..HotelOfferParams::new(args.hotel_ids, args.adults)
            };
            api.hotels.search_offers(&params).await.into()
        }
    }
}

async fn locations(api: &TravelApi, args: LocationArgs) -> ApiResponse<Value> {
    if let Some(id) = args.id {
        return api.locations.location(&id).await.into();
    }

    if let [latitude, longitude] = args.near[..] {
        let params = NearbyAirportsParams {
            radius: args.radius,
            ..NearbyAirportsParams::new(latitude, longitude)
        };
        return api.locations.nearest_airports(&params).await.into();
    }

    let mut params = LocationSearchParams::new(args.keyword.as_deref().unwrap_or_default());
    if args.airports_only {
        params.sub_types = vec![LocationSubType::Airport];
    }
    api.locations.search_locations(&params).await.into()
}

async fn activities(api: &TravelApi, args: ActivityArgs) -> ApiResponse<Value> {
    if let Some(id) = args.id {
        return api.activities.activity(&id).await.into();
    }

    if let [north, west, south, east] = args.square[..] {
        let params = ActivitySquareParams::new(north, west, south, east);
        return api.activities.activities_in_square(&params).await.into();
    }

    let params = ActivitySearchParams {
        radius: args.radius,
        ..ActivitySearchParams::new(
            args.latitude.unwrap_or_default(),
            args.longitude.unwrap_or_default(),
        )
    };
    api.activities.search_activities(&params).await.into()
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
