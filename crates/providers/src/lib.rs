//! Completion service implementations for ToolRelay.
//!
//! All services implement the `toolrelay_core::CompletionService` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatService;

use toolrelay_config::AppConfig;
use toolrelay_core::error::CompletionError;

/// Build the completion service described by the configuration.
pub fn build_from_config(config: &AppConfig) -> Result<OpenAiCompatService, CompletionError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        CompletionError::NotConfigured(
            "no API key: set OPENAI_API_KEY or api_key in config.toml".into(),
        )
    })?;
    Ok(OpenAiCompatService::new("openai", &config.base_url, api_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrelay_core::CompletionService;

    #[test]
    fn build_requires_api_key() {
        let err = build_from_config(&AppConfig::default()).unwrap_err();
        assert!(matches!(err, CompletionError::NotConfigured(_)));
    }

    #[test]
    fn build_uses_configured_base_url() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            base_url: "https://api.moonshot.cn/v1/".into(),
            ..AppConfig::default()
        };
        let service = build_from_config(&config).unwrap();
        assert_eq!(service.name(), "openai");
        assert_eq!(service.base_url(), "https://api.moonshot.cn/v1");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret-123".into()),
            ..AppConfig::default()
        };
        let service = build_from_config(&config).unwrap();
        let debug = format!("{service:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret-123"));
    }
}
