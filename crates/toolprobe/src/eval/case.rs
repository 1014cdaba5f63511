use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ModelConfig;
use crate::error::Error;
use crate::tool::QualifiedName;

/// One prompt plus the expectations its transcript must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub prompt: String,
    /// Endpoint and model override for this case only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    /// Qualified names that must each be called at least once.
    #[serde(default, deserialize_with = "unique_strings")]
    pub required_tools: Vec<String>,
    /// Qualified names that must never be called.
    #[serde(default, deserialize_with = "unique_strings")]
    pub forbidden_tools: Vec<String>,
    /// Substrings the reply must contain, compared case-insensitively.
    #[serde(default, deserialize_with = "unique_strings")]
    pub required_keywords: Vec<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            model: None,
            required_tools: Vec::new(),
            forbidden_tools: Vec::new(),
            required_keywords: Vec::new(),
        }
    }

    pub fn require_tool(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.required_tools, name.into());
        self
    }

    pub fn forbid_tool(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.forbidden_tools, name.into());
        self
    }

    pub fn require_keyword(mut self, keyword: impl Into<String>) -> Self {
        push_unique(&mut self.required_keywords, keyword.into());
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    /// Reject cases that could never pass or never run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("test case name must not be empty".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(Error::Config(format!(
                "test case '{}': prompt must not be empty",
                self.name
            )));
        }
        for tool in self.required_tools.iter().chain(&self.forbidden_tools) {
            QualifiedName::parse(tool).map_err(|e| self.annotate(e))?;
        }
        if let Some(tool) = self
            .required_tools
            .iter()
            .find(|t| self.forbidden_tools.contains(t))
        {
            return Err(Error::Config(format!(
                "test case '{}': tool '{tool}' is both required and forbidden",
                self.name
            )));
        }
        if let Some(model) = &self.model {
            model.validate().map_err(|e| self.annotate(e))?;
        }
        Ok(())
    }

    fn annotate(&self, err: Error) -> Error {
        match err {
            Error::Config(msg) => Error::Config(format!("test case '{}': {msg}", self.name)),
            other => other,
        }
    }
}

/// Expectation sets: repeated entries collapse to the first occurrence.
fn unique_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut items = Vec::with_capacity(raw.len());
    for item in raw {
        push_unique(&mut items, item);
    }
    Ok(items)
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}
