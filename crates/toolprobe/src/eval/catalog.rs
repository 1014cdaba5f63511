use crate::eval::TestCase;

const ADD: &str = "Math.Add";
const SUBTRACT: &str = "Math.Subtract";
const COORDINATES: &str = "Geolocation.GetCoordinates";
const WEATHER: &str = "Weather.GetWeatherByCoordinates";

/// The built-in routing catalog: arithmetic, general knowledge, geocoding
/// and the two-step coordinates-then-weather chain.
pub fn default_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("Simple Addition", "What is 5 + 3?")
            .require_tool(ADD)
            .forbid_tool(SUBTRACT)
            .require_keyword("8"),
        TestCase::new("Subtraction Test", "Calculate 20 minus 7")
            .require_tool(SUBTRACT)
            .forbid_tool(ADD)
            .require_keyword("13"),
        TestCase::new("No Math Needed", "What is the capital of France?")
            .forbid_tool(ADD)
            .forbid_tool(SUBTRACT)
            .require_keyword("Paris"),
        TestCase::new("Geolocation Query", "What are the coordinates for Paris?")
            .require_tool(COORDINATES)
            .forbid_tool(ADD)
            .forbid_tool(SUBTRACT)
            .require_keyword("Paris")
            .require_keyword("Latitude")
            .require_keyword("Longitude"),
        TestCase::new("Weather Query", "What's the weather like in Seattle?")
            .require_tool(COORDINATES)
            .require_tool(WEATHER)
            .forbid_tool(ADD)
            .forbid_tool(SUBTRACT)
            .require_keyword("Seattle")
            .require_keyword("weather"),
        TestCase::new("Temperature Query", "What's the temperature in Tokyo?")
            .require_tool(COORDINATES)
            .require_tool(WEATHER)
            .forbid_tool(ADD)
            .forbid_tool(SUBTRACT)
            .require_keyword("Tokyo")
            .require_keyword("temperature"),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::observer::CallObserver;
    use crate::tool::ToolRegistry;
    use crate::tool::builtins::{BuiltinToolsConfig, builtin_tools};

    #[test]
    fn catalog_has_six_valid_cases() {
        let cases = default_cases();
        assert_eq!(cases.len(), 6);
        for case in &cases {
            case.validate().unwrap();
        }
        let names: HashSet<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn catalog_only_names_registered_tools() {
        let observer = CallObserver::new();
        let mut registry = ToolRegistry::new(observer.attach());
        registry
            .register_all(builtin_tools(&BuiltinToolsConfig::default()).unwrap())
            .unwrap();
        for case in default_cases() {
            for tool in case.required_tools.iter().chain(&case.forbidden_tools) {
                assert!(registry.get(tool).is_some(), "{} names unknown tool {tool}", case.name);
            }
        }
    }

    #[test]
    fn weather_cases_require_the_two_step_chain() {
        let cases = default_cases();
        let weather = cases.iter().find(|c| c.name == "Weather Query").unwrap();
        assert_eq!(weather.required_tools, vec![COORDINATES, WEATHER]);
        assert_eq!(weather.required_keywords, vec!["Seattle", "weather"]);
    }
}
