use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Error;
use crate::llm::types::ToolDefinition;

static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)$")
        .expect("qualified name pattern is valid")
});

/// A `Provider.Operation` tool name.
///
/// Comparison is exact and case-sensitive on the full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn parse(s: &str) -> Result<Self, Error> {
        if !QUALIFIED_NAME.is_match(s) {
            return Err(Error::Config(format!(
                "invalid tool name '{s}': expected Provider.Operation"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn new(provider: &str, operation: &str) -> Result<Self, Error> {
        Self::parse(&format!("{provider}.{operation}"))
    }

    pub fn provider(&self) -> &str {
        self.split().0
    }

    pub fn operation(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        // Validated on construction: exactly one dot
        self.0.split_once('.').unwrap_or((self.0.as_str(), ""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QualifiedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.0
    }
}

impl Borrow<str> for QualifiedName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for QualifiedName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for QualifiedName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    String,
    Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
}

impl ToolParam {
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: ParamKind::String,
        }
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: ParamKind::Number,
        }
    }
}

/// Everything the model and the registry need to know about a tool.
///
/// Parameters keep their declaration order; every parameter is required.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: QualifiedName,
    pub description: String,
    pub params: Vec<ToolParam>,
    pub result: ResultType,
}

impl ToolDescriptor {
    pub fn new(name: QualifiedName, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            params: Vec::new(),
            result: ResultType::String,
        }
    }

    pub fn param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, result: ResultType) -> Self {
        self.result = result;
        self
    }

    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                json!({
                    "type": p.kind.json_type(),
                    "description": p.description,
                }),
            );
        }
        let required: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_qualified_name() {
        let name = QualifiedName::parse("Weather.GetWeatherByCoordinates").unwrap();
        assert_eq!(name.provider(), "Weather");
        assert_eq!(name.operation(), "GetWeatherByCoordinates");
        assert_eq!(name.to_string(), "Weather.GetWeatherByCoordinates");
        assert_eq!(name, "Weather.GetWeatherByCoordinates");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for bad in [
            "",
            "Math",
            "Math.",
            ".Add",
            "Math.Add.Extra",
            "Math-Add",
            "1Math.Add",
            "Math.Add ",
        ] {
            assert!(
                matches!(QualifiedName::parse(bad), Err(Error::Config(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn qualified_name_is_case_sensitive() {
        let a = QualifiedName::parse("Math.Add").unwrap();
        let b = QualifiedName::parse("math.add").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn qualified_name_new_and_from_str() {
        let a = QualifiedName::new("Math", "Add").unwrap();
        let b: QualifiedName = "Math.Add".parse().unwrap();
        assert_eq!(a, b);
        assert!(QualifiedName::new("Ma th", "Add").is_err());
    }

    #[test]
    fn qualified_name_serde_validates() {
        let name: QualifiedName = serde_json::from_str("\"Math.Subtract\"").unwrap();
        assert_eq!(name.operation(), "Subtract");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Math.Subtract\"");
        assert!(serde_json::from_str::<QualifiedName>("\"nodot\"").is_err());
    }

    #[test]
    fn input_schema_lists_params_in_order_all_required() {
        let desc = ToolDescriptor::new(
            QualifiedName::parse("Math.Add").unwrap(),
            "Adds two numbers together",
        )
        .param(ToolParam::number("a", "The first number"))
        .param(ToolParam::number("b", "The second number"))
        .returns(ResultType::Number);

        let schema = desc.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "number");
        assert_eq!(schema["properties"]["b"]["description"], "The second number");
        assert_eq!(schema["required"], json!(["a", "b"]));
        assert_eq!(desc.result, ResultType::Number);
    }

    #[test]
    fn definition_uses_qualified_name() {
        let desc = ToolDescriptor::new(
            QualifiedName::parse("Geolocation.GetCoordinates").unwrap(),
            "Gets coordinates",
        )
        .param(ToolParam::string("location", "The city name"));
        let def = desc.definition();
        assert_eq!(def.name, "Geolocation.GetCoordinates");
        assert_eq!(def.input_schema["properties"]["location"]["type"], "string");
        assert_eq!(desc.result, ResultType::String);
    }
}
