use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Which upstream wire quirks a provider entry follows. All four speak the
/// OpenAI chat-completion shape; they differ only in auth and base URL
/// conventions (spec component C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    NvidiaNim,
    OpenRouter,
    LmStudio,
    VertexAi,
}

/// One configured upstream provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Absent for providers that don't require one (e.g. a local LM Studio
    /// instance).
    #[serde(default)]
    pub api_key: Option<SecretString>,
    pub base_url: Url,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default)]
    pub defaults: ProviderDefaults,
    /// Hard ceiling applied to `max_tokens` before it is forwarded upstream,
    /// independent of whatever a caller requests.
    #[serde(default)]
    pub max_tokens_cap: Option<u32>,
    /// Opt in to recovering tool calls emitted as inline text (C6) for
    /// providers/models that don't reliably emit structured `tool_calls`.
    #[serde(default)]
    pub heuristic_tool_parsing: bool,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_write_timeout_secs() -> u64 {
    30
}

/// Provider-level sampling defaults (e.g. `temperature`, `top_k`), merged
/// into the translated OpenAI request body as a baseline that explicit
/// per-request sampling fields override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDefaults(pub serde_json::Map<String, serde_json::Value>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_provider() {
        let toml = r#"
            kind = "lm_studio"
            base_url = "http://localhost:1234/v1"
        "#;

        let provider: ProviderConfig = toml::from_str(toml).unwrap();
        assert_eq!(provider.kind, ProviderKind::LmStudio);
        assert!(provider.api_key.is_none());
        assert_eq!(provider.connect_timeout_secs, 5);
    }

    #[test]
    fn parses_defaults_table() {
        let toml = r#"
            kind = "nvidia_nim"
            api_key = "secret"
            base_url = "https://integrate.api.nvidia.com/v1"

            [defaults]
            temperature = 0.7
            top_k = -1
        "#;

        let provider: ProviderConfig = toml::from_str(toml).unwrap();
        assert_eq!(provider.defaults.0.get("temperature").unwrap(), &serde_json::json!(0.7));
    }
}
