mod geolocation;
mod math;
mod weather;

use std::sync::Arc;

use crate::error::Error;
use crate::tool::Tool;

pub use geolocation::{GeocodingClient, Place};
pub use weather::describe_weather_code;

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";

/// Configuration for creating built-in tools.
#[derive(Clone)]
pub struct BuiltinToolsConfig {
    /// HTTP client shared by every provider of one session.
    pub client: reqwest::Client,
    /// Base URL of the geocoding service (`/v1/search` is appended).
    pub geocoding_url: String,
    /// Base URL of the forecast service (`/v1/forecast` is appended).
    pub forecast_url: String,
}

impl Default for BuiltinToolsConfig {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            geocoding_url: DEFAULT_GEOCODING_URL.into(),
            forecast_url: DEFAULT_FORECAST_URL.into(),
        }
    }
}

/// Create the `Math`, `Geolocation` and `Weather` providers.
pub fn builtin_tools(config: &BuiltinToolsConfig) -> Result<Vec<Arc<dyn Tool>>, Error> {
    let geocoder = GeocodingClient::new(config.client.clone(), &config.geocoding_url);

    let mut tools = math::math_tools()?;
    tools.extend(geolocation::geolocation_tools(geocoder)?);
    tools.push(Arc::new(weather::WeatherTool::new(
        config.client.clone(),
        &config.forecast_url,
    )?));
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tools_registers_all_operations_in_order() {
        let tools = builtin_tools(&BuiltinToolsConfig::default()).unwrap();
        let names: Vec<String> = tools
            .iter()
            .map(|t| t.descriptor().name.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Math.Add",
                "Math.Subtract",
                "Geolocation.GetCoordinates",
                "Geolocation.GetLatitude",
                "Geolocation.GetLongitude",
                "Weather.GetWeatherByCoordinates",
            ]
        );
    }
}
