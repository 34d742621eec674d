//! Layered configuration: defaults, optional TOML file, environment.
//!
//! Environment always wins, so a deployment can override a checked-in
//! config file without editing it. The API key is only ever read from the
//! environment or the file, never hardcoded.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::orchestrator::OrchestratorConfig;
use crate::router::RouterConfig;
use crate::synthesis::SynthesisConfig;
use crate::upstream::EndpointConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub endpoint: EndpointConfig,
    pub router: RouterConfig,
    pub orchestrator: OrchestratorConfig,
    pub synthesis: SynthesisConfig,
}

impl ConclaveConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(key) = env_var("DEEPSEEK_API_KEY") {
            self.endpoint.api_key = key;
        }
        if let Some(url) = env_var("CONCLAVE_API_URL") {
            self.endpoint.url = url;
        }
        if let Some(model) = env_var("CONCLAVE_MODEL") {
            self.endpoint.model = model;
        }
        if let Some(timeout) = env_var("CONCLAVE_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.endpoint.request_timeout_secs = secs,
                Err(_) => debug!(value = %timeout, "ignoring unparseable CONCLAVE_TIMEOUT_SECS"),
            }
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = ConclaveConfig::default();
        assert_eq!(config.router.activation_threshold, 0.15);
        assert_eq!(config.router.max_specialists, 3);
        assert_eq!(config.orchestrator.chain_max_tokens, 1500);
        assert_eq!(config.synthesis.max_tokens, 2500);
        assert_eq!(config.endpoint.model, "deepseek-chat");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[router]\nmax_specialists = 2\n\n[endpoint]\nmodel = \"deepseek-reasoner\"\n"
        )
        .unwrap();

        let config = ConclaveConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.router.max_specialists, 2);
        assert_eq!(config.endpoint.model, "deepseek-reasoner");
        // Untouched sections keep their defaults.
        assert_eq!(config.router.activation_threshold, 0.15);
        assert_eq!(config.orchestrator.stagger_ms, 150);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[router\nbroken").unwrap();
        assert!(ConclaveConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/conclave.toml");
        assert!(ConclaveConfig::load(Some(missing)).is_err());
    }
}
