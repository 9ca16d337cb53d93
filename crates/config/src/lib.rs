//! TOML configuration for the gateway: listen address, the global rate
//! limit quota, the set of upstream providers, and the model-alias table
//! that maps an Anthropic model name to `provider/model`.

mod error;
mod loader;
mod provider;
mod server;

use indexmap::IndexMap;
use serde::Deserialize;

pub use error::Error;
pub use loader::load;
pub use provider::{ProviderConfig, ProviderDefaults, ProviderKind};
pub use server::ServerConfig;

/// Root configuration document, as loaded from `gateway.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub providers: IndexMap<String, ProviderConfig>,
    pub model_aliases: IndexMap<String, String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Resolve an Anthropic-shaped `model` field to `(provider_name,
    /// upstream_model)`, following `model_aliases` first and otherwise
    /// treating the value as `provider/model` directly.
    pub fn resolve_model<'a>(&'a self, requested: &'a str) -> Option<(&'a str, &'a str)> {
        let target = self.model_aliases.get(requested).map(String::as_str).unwrap_or(requested);
        let (provider, model) = target.split_once('/')?;

        self.providers.contains_key(provider).then_some((provider, model))
    }
}

/// Global proactive/reactive rate coordinator quota (spec component C1).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 30, window_secs: 60 }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn resolves_alias_to_provider_and_model() {
        let toml = indoc! {r#"
            [providers.nvidia_nim]
            kind = "nvidia_nim"
            api_key = "test-key"
            base_url = "https://integrate.api.nvidia.com/v1"

            [model_aliases]
            "claude-3-5-sonnet-20241022" = "nvidia_nim/meta/llama-3.1-70b-instruct"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        let (provider, model) = config.resolve_model("claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(provider, "nvidia_nim");
        assert_eq!(model, "meta/llama-3.1-70b-instruct");
    }

    #[test]
    fn resolves_bare_provider_slash_model_without_alias() {
        let toml = indoc! {r#"
            [providers.open_router]
            kind = "open_router"
            api_key = "test-key"
            base_url = "https://openrouter.ai/api/v1"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        let (provider, model) = config.resolve_model("open_router/anthropic/claude-3.5-sonnet").unwrap();
        assert_eq!(provider, "open_router");
        assert_eq!(model, "anthropic/claude-3.5-sonnet");
    }

    #[test]
    fn unknown_provider_resolves_to_none() {
        let config = Config::default();
        assert!(config.resolve_model("unknown/model").is_none());
    }

    #[test]
    fn resolved_model_shape_snapshot() {
        let toml = indoc! {r#"
            [providers.nvidia_nim]
            kind = "nvidia_nim"
            base_url = "https://integrate.api.nvidia.com/v1"

            [model_aliases]
            "claude-3-5-sonnet-20241022" = "nvidia_nim/meta/llama-3.1-70b-instruct"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        let resolved = config.resolve_model("claude-3-5-sonnet-20241022");

        insta::assert_debug_snapshot!(resolved, @r#"
        Some(
            (
                "nvidia_nim",
                "meta/llama-3.1-70b-instruct",
            ),
        )
        "#);
    }
}
