use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::driver::{ChatDriver, DEFAULT_MAX_ROUNDS, DEFAULT_MAX_TOKENS, TurnLimits};
use crate::eval::{TestCase, default_cases};
use crate::llm::openai::OpenAiCompatProvider;
use crate::observer::CallObserver;
use crate::tool::ToolRegistry;
use crate::tool::builtins::{
    BuiltinToolsConfig, DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL, builtin_tools,
};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "granite4:3b";
pub const DEFAULT_API_KEY_ENV: &str = "TOOLPROBE_API_KEY";

/// Top-level configuration loaded from `toolprobe.toml`.
///
/// Every section is optional; an empty file yields the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Replaces the built-in catalog when non-empty.
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// Chat endpoint and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding a bearer key. Unset or empty means the
    /// request goes out without an `Authorization` header.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ModelConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn provider(&self, client: reqwest::Client) -> OpenAiCompatProvider {
        let provider = OpenAiCompatProvider::new(&self.endpoint, &self.model).with_client(client);
        match self.api_key() {
            Some(key) => provider.with_api_key(key),
            None => provider,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::Config(format!(
                "model.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model.model must not be empty".into()));
        }
        Ok(())
    }
}

/// Per-turn bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Abandon a turn after this many seconds. Unset waits indefinitely.
    pub timeout_seconds: Option<u64>,
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_tokens: default_max_tokens(),
            timeout_seconds: None,
        }
    }
}

impl TurnConfig {
    pub fn limits(&self) -> TurnLimits {
        TurnLimits {
            max_rounds: self.max_rounds,
            max_tokens: self.max_tokens,
            deadline: self.timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// Base URLs of the services behind the built-in tools.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
}

fn default_geocoding_url() -> String {
    DEFAULT_GEOCODING_URL.into()
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
        }
    }
}

impl ToolsConfig {
    pub fn builtin_config(&self, client: reqwest::Client) -> BuiltinToolsConfig {
        BuiltinToolsConfig {
            client,
            geocoding_url: self.geocoding_url.clone(),
            forecast_url: self.forecast_url.clone(),
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML string into a `HarnessConfig`.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.model.validate()?;
        if self.turn.max_rounds == 0 {
            return Err(Error::Config("turn.max_rounds must be at least 1".into()));
        }
        if self.turn.max_tokens == 0 {
            return Err(Error::Config("turn.max_tokens must be at least 1".into()));
        }
        if self.turn.timeout_seconds == Some(0) {
            return Err(Error::Config("turn.timeout_seconds must be at least 1".into()));
        }
        for case in &self.cases {
            case.validate()?;
        }
        Ok(())
    }

    /// Configured cases, or the built-in catalog when none are configured.
    pub fn catalog(&self) -> Vec<TestCase> {
        if self.cases.is_empty() {
            default_cases()
        } else {
            self.cases.clone()
        }
    }

    /// The model a case runs against: its own override or the default.
    pub fn model_for<'a>(&'a self, case: &'a TestCase) -> &'a ModelConfig {
        case.model.as_ref().unwrap_or(&self.model)
    }

    /// Build a fresh session: HTTP client, call observer, registry with the
    /// built-in tools, and a driver bound to `model`.
    pub fn session(&self, model: &ModelConfig) -> Result<ChatDriver<OpenAiCompatProvider>, Error> {
        let client = reqwest::Client::new();
        let observer = CallObserver::new();
        let mut registry = ToolRegistry::new(observer.attach());
        registry.register_all(builtin_tools(&self.tools.builtin_config(client.clone()))?)?;

        let provider = Arc::new(model.provider(client));
        Ok(ChatDriver::new(provider, registry, observer).with_limits(self.turn.limits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();
        assert_eq!(config.model.endpoint, "http://localhost:11434/v1");
        assert_eq!(config.model.model, "granite4:3b");
        assert_eq!(config.model.api_key_env, "TOOLPROBE_API_KEY");
        assert_eq!(config.turn.max_rounds, 8);
        assert_eq!(config.turn.max_tokens, 1024);
        assert!(config.turn.timeout_seconds.is_none());
        assert_eq!(
            config.tools.geocoding_url,
            "https://geocoding-api.open-meteo.com"
        );
        assert!(config.cases.is_empty());
        assert_eq!(config.catalog().len(), 6);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[model]
endpoint = "http://127.0.0.1:8080/v1"
model = "qwen3:8b"
api_key_env = "MY_KEY"

[turn]
max_rounds = 4
max_tokens = 512
timeout_seconds = 90

[tools]
geocoding_url = "http://geo.local"
forecast_url = "http://wx.local"

[[cases]]
name = "Simple Addition"
prompt = "What is 5 + 3?"
required_tools = ["Math.Add"]
forbidden_tools = ["Math.Subtract"]
required_keywords = ["8"]

[[cases]]
name = "Big Model Capital"
prompt = "What is the capital of France?"
required_keywords = ["Paris"]

[cases.model]
endpoint = "https://api.example.com/v1"
model = "large"
"#;
        let config = HarnessConfig::from_toml(toml).unwrap();
        assert_eq!(config.model.model, "qwen3:8b");
        assert_eq!(config.turn.limits().deadline, Some(Duration::from_secs(90)));
        assert_eq!(config.turn.limits().max_rounds, 4);
        assert_eq!(config.tools.forecast_url, "http://wx.local");

        let cases = config.catalog();
        assert_eq!(cases.len(), 2);
        assert_eq!(config.model_for(&cases[0]).model, "qwen3:8b");
        let override_model = config.model_for(&cases[1]);
        assert_eq!(override_model.model, "large");
        assert_eq!(override_model.api_key_env, "TOOLPROBE_API_KEY");
    }

    #[test]
    fn invalid_toml_syntax() {
        let err = HarnessConfig::from_toml("this is not valid toml {{{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_file_nonexistent_path() {
        let err = HarnessConfig::from_file(std::path::Path::new("/nonexistent/toolprobe.toml"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("failed to read"), "error: {msg}");
    }

    #[test]
    fn rejects_zero_limits() {
        for toml in [
            "[turn]\nmax_rounds = 0",
            "[turn]\nmax_tokens = 0",
            "[turn]\ntimeout_seconds = 0",
        ] {
            let err = HarnessConfig::from_toml(toml).unwrap_err();
            assert!(err.to_string().contains("at least 1"), "{toml}: {err}");
        }
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = HarnessConfig::from_toml("[model]\nendpoint = \"localhost:11434\"").unwrap_err();
        assert!(err.to_string().contains("http(s) URL"));
    }

    #[test]
    fn overlapping_case_is_rejected_at_load() {
        let toml = r#"
[[cases]]
name = "Contradiction"
prompt = "What is 5 + 3?"
required_tools = ["Math.Add"]
forbidden_tools = ["Math.Add"]
"#;
        let err = HarnessConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("both required and forbidden"));
    }

    #[test]
    fn repeated_expectations_collapse_to_one_failure() {
        use crate::driver::Transcript;
        use crate::eval::Verifier;

        let toml = r#"
[[cases]]
name = "Simple Addition"
prompt = "What is 5 + 3?"
required_tools = ["Math.Add", "Math.Add"]
forbidden_tools = ["Math.Subtract", "Math.Subtract"]
required_keywords = ["8", "8"]
"#;
        let config = HarnessConfig::from_toml(toml).unwrap();
        let case = &config.cases[0];
        assert_eq!(case.required_tools, vec!["Math.Add"]);
        assert_eq!(case.forbidden_tools, vec!["Math.Subtract"]);
        assert_eq!(case.required_keywords, vec!["8"]);

        let verdict = Verifier::standard().verify(case, &Transcript::default());
        let failures: Vec<String> = verdict.failures.iter().map(ToString::to_string).collect();
        assert_eq!(
            failures,
            vec![
                "Expected tool 'Math.Add' was not called",
                "Response should contain '8' but does not",
            ]
        );
    }

    #[test]
    fn api_key_absent_when_variable_unset() {
        let model = ModelConfig {
            api_key_env: "TOOLPROBE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ModelConfig::default()
        };
        assert!(model.api_key().is_none());
    }

    #[test]
    fn session_registers_builtin_tools_with_limits() {
        let config = HarnessConfig::from_toml("[turn]\nmax_rounds = 3").unwrap();
        let driver = config.session(&config.model).unwrap();
        assert_eq!(driver.registry().len(), 6);
        assert_eq!(driver.limits().max_rounds, 3);
    }
}
