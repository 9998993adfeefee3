use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where generated illustrations are written.
#[derive(Debug)]
pub enum StorageBackend {
    Local,
    Gcs {
        bucket: String,
        access_token: SecretString,
    },
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: SecretString,
    pub gemini_api_base: String,
    pub flash_model: String,
    pub live_model: String,
    pub live_url: String,
    pub imagen_model: String,
    pub live_voice: String,
    pub media_concurrency: usize,
    pub storage: StorageBackend,
    pub media_dir: PathBuf,
    pub public_base_url: String,
    pub prompts_dir: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables, reading a `.env` file first if present.
    ///
    /// *   `GEMINI_API_KEY`: required.
    /// *   `BIND_ADDRESS`: defaults to `0.0.0.0:$PORT`, or `0.0.0.0:8080`.
    /// *   `STORAGE_BACKEND`: `local` (default) or `gcs`, which needs `GCS_BUCKET` and
    ///     `GCS_ACCESS_TOKEN`.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| {
            format!("0.0.0.0:{}", var("PORT").unwrap_or_else(|| "8080".to_string()))
        });
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = SecretString::from(required("GEMINI_API_KEY")?);

        let media_concurrency_str = or_default("MEDIA_CONCURRENCY", "4");
        let media_concurrency = media_concurrency_str
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MEDIA_CONCURRENCY".to_string(),
                    format!("'{}' is not a positive integer", media_concurrency_str),
                )
            })?;

        let storage = match or_default("STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "local" => StorageBackend::Local,
            "gcs" => StorageBackend::Gcs {
                bucket: required("GCS_BUCKET")?,
                access_token: SecretString::from(required("GCS_ACCESS_TOKEN")?),
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is not one of local, gcs", other),
                ));
            }
        };

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_api_base: or_default("GEMINI_API_BASE", textbook_core::gemini_rest::DEFAULT_API_BASE),
            flash_model: or_default("GEMINI_FLASH_MODEL", "gemini-2.0-flash-001"),
            live_model: or_default("GEMINI_LIVE_MODEL", "gemini-2.0-flash-live-001"),
            live_url: or_default("GEMINI_LIVE_URL", gemini_live::DEFAULT_LIVE_URL),
            imagen_model: or_default("IMAGEN_MODEL", "imagen-3.0-generate-002"),
            live_voice: or_default("LIVE_VOICE", "Aoede"),
            media_concurrency,
            storage,
            media_dir: PathBuf::from(or_default("MEDIA_DIR", "media")),
            public_base_url: or_default("PUBLIC_BASE_URL", "http://localhost:8080"),
            prompts_dir: var("PROMPTS_DIR").map(PathBuf::from),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = load(&[("GEMINI_API_KEY", "secret")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.gemini_api_key.expose_secret(), "secret");
        assert_eq!(config.media_concurrency, 4);
        assert_eq!(config.live_voice, "Aoede");
        assert!(matches!(config.storage, StorageBackend::Local));
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.prompts_dir.is_none());
    }

    #[test]
    fn port_is_honoured_without_bind_address() {
        let config = load(&[("GEMINI_API_KEY", "k"), ("PORT", "9000")]).unwrap();
        assert_eq!(config.bind_address.port(), 9000);
    }

    #[test]
    fn missing_key_is_reported() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingVar(var)) if var == "GEMINI_API_KEY"
        ));
    }

    #[test]
    fn gcs_backend_requires_bucket_and_token() {
        let err = load(&[("GEMINI_API_KEY", "k"), ("STORAGE_BACKEND", "gcs")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "GCS_BUCKET"));

        let config = load(&[
            ("GEMINI_API_KEY", "k"),
            ("STORAGE_BACKEND", "GCS"),
            ("GCS_BUCKET", "textbook-media"),
            ("GCS_ACCESS_TOKEN", "token"),
        ])
        .unwrap();
        assert!(matches!(config.storage, StorageBackend::Gcs { bucket, .. } if bucket == "textbook-media"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("GEMINI_API_KEY", "k"), ("MEDIA_CONCURRENCY", "0")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(matches!(
            load(&[("GEMINI_API_KEY", "k"), ("RUST_LOG", "chatty")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(matches!(
            load(&[("GEMINI_API_KEY", "k"), ("BIND_ADDRESS", "nowhere")]),
            Err(ConfigError::InvalidValue(..))
        ));
    }
}
