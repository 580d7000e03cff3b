use crate::config::Config;
use crate::providers::{OllamaProvider, OpenAIProvider};
use crate::traits::Provider;
use anyhow::{Result, anyhow};

pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    let provider_name = config.provider.as_deref().unwrap_or("openai");

    match provider_name.to_lowercase().as_str() {
        "ollama" => {
            let mut provider = OllamaProvider::new();
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(Box::new(provider))
        }
        "openai" => {
            let api_key = resolve_api_key_with_fallback(
                &["OPENAI_API_KEY", "STEPWISE_OPENAI_API_KEY"],
                &config.api_key,
            )?;
            let mut provider = OpenAIProvider::new(api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(Box::new(provider))
        }
        "openrouter" => {
            let api_key = resolve_api_key_with_fallback(
                &["OPENROUTER_API_KEY", "STEPWISE_OPENROUTER_API_KEY"],
                &config.api_key,
            )?;
            let mut provider = OpenAIProvider::openrouter(api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(Box::new(provider))
        }
        _ => Err(anyhow!(
            "Unknown provider: {}. Available: openai, openrouter, ollama",
            provider_name
        )),
    }
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = std::env::var(var_name)
            && !key.is_empty()
        {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!(
            "No API key found. Set {} or run 'stepwise onboard'.",
            env_vars.join(" / ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_an_error() {
        let config = Config {
            provider: Some("carrier-pigeon".into()),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = Config {
            provider: Some("Ollama".into()),
            ..Default::default()
        };
        assert_eq!(create_provider(&config).unwrap().name(), "ollama");
    }

    #[test]
    fn config_key_used_when_env_is_empty() {
        let key = resolve_api_key_with_fallback(&["STEPWISE_TEST_NEVER_SET_KEY"], "sk-test").unwrap();
        assert_eq!(key, "sk-test");
        assert!(resolve_api_key_with_fallback(&["STEPWISE_TEST_NEVER_SET_KEY"], "").is_err());
    }
}
