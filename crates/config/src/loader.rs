use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

/// Load and validate a gateway configuration file.
///
/// Every string value in the document is first passed through
/// [`DynamicString`] so `{{ env.VAR }}` placeholders (typically API keys)
/// are expanded before the document is deserialized into [`Config`].
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate(&config)?;

    log::debug!("loaded gateway configuration from {} ({} provider(s))", path.display(), config.providers.len());

    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    if config.providers.is_empty() {
        bail!(
            "No providers configured. The gateway requires at least one upstream provider under [providers.<name>]."
        );
    }

    for (alias, target) in &config.model_aliases {
        let (provider, _) = target
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("model_aliases.\"{alias}\" = \"{target}\" must be in provider/model form"))?;

        if !config.providers.contains_key(provider) {
            bail!("model_aliases.\"{alias}\" references unknown provider '{provider}'");
        }
    }

    Ok(())
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn rejects_empty_provider_set() {
        let config = Config::default();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("No providers configured"));
    }

    #[test]
    fn rejects_alias_to_unknown_provider() {
        let toml = indoc! {r#"
            [providers.lm_studio]
            kind = "lm_studio"
            base_url = "http://localhost:1234/v1"

            [model_aliases]
            "claude-3-5-sonnet-20241022" = "missing_provider/some-model"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("unknown provider 'missing_provider'"));
    }

    #[test]
    fn accepts_well_formed_config() {
        let toml = indoc! {r#"
            [providers.lm_studio]
            kind = "lm_studio"
            base_url = "http://localhost:1234/v1"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn expands_env_placeholder() {
        // SAFETY: test runs single-threaded within this process for this var.
        unsafe {
            std::env::set_var("GATEWAY_TEST_API_KEY", "expanded-secret");
        }

        let mut value: Value = toml::from_str(r#"api_key = "{{ env.GATEWAY_TEST_API_KEY }}""#).unwrap();
        expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap();

        assert_eq!(value.get("api_key").unwrap().as_str(), Some("expanded-secret"));

        unsafe {
            std::env::remove_var("GATEWAY_TEST_API_KEY");
        }
    }
}
