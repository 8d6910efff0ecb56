use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::gemini::DEFAULT_MODEL;

/// Default request timeout when INTERVOZ_TIMEOUT_SECS is not set.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Falta la API Key de Google. Configúrala en .env (GOOGLE_API_KEY) o en el entorno.")]
    MissingApiKey,
}

/// Runtime settings resolved from .env / process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Settings {
    /// Load settings from `.env` and the process environment.
    ///
    /// A missing API key is fatal: the caller must halt before any
    /// interview flow starts.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary lookup function.
    ///
    /// GOOGLE_API_KEY is the primary credential variable; GEMINI_API_KEY
    /// is accepted as a fallback for setups that already export it.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_API_KEY")
            .or_else(|| lookup("GEMINI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let model = lookup("INTERVOZ_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = match lookup("INTERVOZ_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    warn!("Invalid INTERVOZ_TIMEOUT_SECS value '{}', using default", raw);
                    DEFAULT_TIMEOUT_SECS
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        info!("Settings loaded: model={} timeout={}s", model, timeout_secs);

        Ok(Settings {
            api_key,
            model,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
