use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tracing::warn;

use crate::error::Error;
use crate::tool::{
    QualifiedName, ResultType, Tool, ToolArgs, ToolDescriptor, ToolOutput, ToolParam,
};

const CURRENT_FIELDS: &str = "temperature_2m,weather_code,relative_humidity_2m,wind_speed_10m";

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: Option<CurrentConditions>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    weather_code: i64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
}

/// Human-readable text for a WMO weather interpretation code.
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown condition",
    }
}

fn format_report(c: &CurrentConditions) -> String {
    format!(
        "Current weather: {}, Temperature: {}°F, Humidity: {}%, Wind Speed: {} mph",
        describe_weather_code(c.weather_code),
        c.temperature_2m,
        c.relative_humidity_2m,
        c.wind_speed_10m
    )
}

/// `Weather.GetWeatherByCoordinates`, backed by the Open-Meteo forecast API.
pub struct WeatherTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    forecast_url: String,
}

impl WeatherTool {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, Error> {
        let descriptor = ToolDescriptor::new(
            QualifiedName::new("Weather", "GetWeatherByCoordinates")?,
            "Gets the current weather for a location using latitude and longitude coordinates",
        )
        .param(ToolParam::number("latitude", "The latitude coordinate"))
        .param(ToolParam::number("longitude", "The longitude coordinate"))
        .returns(ResultType::String);
        Ok(Self {
            descriptor,
            client,
            forecast_url: format!("{}/v1/forecast", base_url.trim_end_matches('/')),
        })
    }

    async fn current(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<CurrentConditions>, Error> {
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: ForecastResponse = response.json().await?;
        Ok(body.current)
    }
}

impl Tool for WeatherTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn invoke(&self, args: ToolArgs) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            let (lat, lon) = match (args.number("latitude"), args.number("longitude")) {
                (Ok(lat), Ok(lon)) => (lat, lon),
                (Err(e), _) | (_, Err(e)) => return ToolOutput::error(e),
            };
            match self.current(lat, lon).await {
                Ok(Some(conditions)) => ToolOutput::success(format_report(&conditions)),
                Ok(None) => ToolOutput::error(format!(
                    "No weather data available for coordinates ({lat}, {lon})"
                )),
                Err(e) => {
                    warn!(lat, lon, error = %e, "forecast lookup failed");
                    ToolOutput::error(format!(
                        "Error getting weather for coordinates ({lat}, {lon}): {e}"
                    ))
                }
            }
        })
    }
}
