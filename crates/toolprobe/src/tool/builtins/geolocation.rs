use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::tool::{
    QualifiedName, ResultType, Tool, ToolArgs, ToolDescriptor, ToolOutput, ToolParam,
};

const LOCATION_PARAM: &str = "The city name, location name, or postal code";

/// First match of a geocoding search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<Place>>,
}

/// Thin client for the Open-Meteo geocoding search endpoint.
#[derive(Clone)]
pub struct GeocodingClient {
    client: reqwest::Client,
    search_url: String,
}

impl GeocodingClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            search_url: format!("{}/v1/search", base_url.trim_end_matches('/')),
        }
    }

    /// Best match for `location`, or `None` when the service knows nothing.
    pub async fn lookup(&self, location: &str) -> Result<Option<Place>, Error> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("name", location), ("count", "1")])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = response.json().await?;
        let place = body.results.and_then(|r| r.into_iter().next());
        debug!(location, found = place.is_some(), "geocoding lookup");
        Ok(place)
    }
}

#[derive(Debug, Clone, Copy)]
enum GeoOperation {
    Coordinates,
    Latitude,
    Longitude,
}

pub struct GeolocationTool {
    descriptor: ToolDescriptor,
    operation: GeoOperation,
    geocoder: GeocodingClient,
}

impl GeolocationTool {
    fn new(operation: GeoOperation, geocoder: GeocodingClient) -> Result<Self, Error> {
        let (op_name, description, result) = match operation {
            GeoOperation::Coordinates => (
                "GetCoordinates",
                "Gets the latitude and longitude coordinates for a location name or postal code",
                ResultType::String,
            ),
            GeoOperation::Latitude => (
                "GetLatitude",
                "Gets the latitude coordinate for a location name or postal code",
                ResultType::Number,
            ),
            GeoOperation::Longitude => (
                "GetLongitude",
                "Gets the longitude coordinate for a location name or postal code",
                ResultType::Number,
            ),
        };
        let descriptor =
            ToolDescriptor::new(QualifiedName::new("Geolocation", op_name)?, description)
                .param(ToolParam::string("location", LOCATION_PARAM))
                .returns(result);
        Ok(Self {
            descriptor,
            operation,
            geocoder,
        })
    }

    async fn run(&self, location: &str) -> ToolOutput {
        let lookup = self.geocoder.lookup(location).await;
        match self.operation {
            GeoOperation::Coordinates => match lookup {
                Ok(Some(place)) => ToolOutput::success(format!(
                    "Latitude: {}, Longitude: {}",
                    place.latitude, place.longitude
                )),
                Ok(None) => {
                    ToolOutput::error(format!("No coordinates found for location: {location}"))
                }
                Err(e) => {
                    warn!(location, error = %e, "geocoding failed");
                    ToolOutput::error(format!("Error getting coordinates for {location}: {e}"))
                }
            },
            // Single-number lookups report 0 rather than failing
            GeoOperation::Latitude | GeoOperation::Longitude => {
                let place = match lookup {
                    Ok(place) => place,
                    Err(e) => {
                        warn!(location, error = %e, "geocoding failed");
                        None
                    }
                };
                let value = place.map_or(0.0, |p| match self.operation {
                    GeoOperation::Longitude => p.longitude,
                    _ => p.latitude,
                });
                ToolOutput::number(value)
            }
        }
    }
}

impl Tool for GeolocationTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn invoke(&self, args: ToolArgs) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            match args.str("location") {
                Ok(location) => self.run(location).await,
                Err(e) => ToolOutput::error(e),
            }
        })
    }
}

pub(super) fn geolocation_tools(geocoder: GeocodingClient) -> Result<Vec<Arc<dyn Tool>>, Error> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(GeolocationTool::new(GeoOperation::Coordinates, geocoder.clone())?),
        Arc::new(GeolocationTool::new(GeoOperation::Latitude, geocoder.clone())?),
        Arc::new(GeolocationTool::new(GeoOperation::Longitude, geocoder)?),
    ];
    Ok(tools)
}
