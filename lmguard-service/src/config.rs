use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::errors::ConfigError;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_POLICY_FILE: &str = "config/policy.json";
pub const DEFAULT_AUDIT_LOG: &str = "data/lmguard_audit.jsonl";
pub const DEFAULT_ARBITER_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_CACHE_MAX_ITEMS: usize = 1000;
pub const DEFAULT_CACHE_SIMILARITY: f32 = 0.88;
pub const DEFAULT_EMBEDDING_DIM: usize = 256;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_ARBITER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_HASH_SALT: &str = "lmguard";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Local { dimension: usize },
    OpenAi { model: String },
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub policy_file: PathBuf,
    pub arbiter_timeout: Duration,
    pub cache_max_items: usize,
    pub cache_similarity: f32,
    pub embedding: EmbeddingBackend,
    pub arbiter_model: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub audit_log: PathBuf,
    pub hash_salt: String,
}

impl ServiceConfig {
    /// Reads `LMGUARD_*` variables (and `OPENAI_API_KEY`) from the process
    /// environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let embedding = match get("LMGUARD_EMBEDDING_PROVIDER")
            .unwrap_or_else(|| "local".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => EmbeddingBackend::Local {
                dimension: parse_or(&get, "LMGUARD_EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM)?,
            },
            "openai" => EmbeddingBackend::OpenAi {
                model: get("LMGUARD_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            },
            other => {
                return Err(ConfigError::invalid(
                    "LMGUARD_EMBEDDING_PROVIDER",
                    format!("unknown provider `{other}`, expected local or openai"),
                ))
            }
        };

        let hash_salt = get("LMGUARD_HASH_SALT").unwrap_or_else(|| {
            warn!("LMGUARD_HASH_SALT not set, using the built-in salt");
            DEFAULT_HASH_SALT.into()
        });

        let config = Self {
            addr: parse_or(&get, "LMGUARD_SERVICE_ADDR", parse_default(DEFAULT_ADDR)?)?,
            policy_file: get("LMGUARD_POLICY_FILE")
                .unwrap_or_else(|| DEFAULT_POLICY_FILE.into())
                .into(),
            arbiter_timeout: Duration::from_millis(parse_or(
                &get,
                "LMGUARD_ARBITER_TIMEOUT_MS",
                DEFAULT_ARBITER_TIMEOUT_MS,
            )?),
            cache_max_items: parse_or(&get, "LMGUARD_CACHE_MAX_ITEMS", DEFAULT_CACHE_MAX_ITEMS)?,
            cache_similarity: parse_or(&get, "LMGUARD_CACHE_SIMILARITY", DEFAULT_CACHE_SIMILARITY)?,
            embedding,
            arbiter_model: get("LMGUARD_ARBITER_MODEL")
                .unwrap_or_else(|| DEFAULT_ARBITER_MODEL.into()),
            openai_base_url: get("LMGUARD_OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            openai_api_key: get("OPENAI_API_KEY"),
            audit_log: get("LMGUARD_AUDIT_LOG")
                .unwrap_or_else(|| DEFAULT_AUDIT_LOG.into())
                .into(),
            hash_salt,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arbiter_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "LMGUARD_ARBITER_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }
        if self.cache_max_items == 0 {
            return Err(ConfigError::invalid(
                "LMGUARD_CACHE_MAX_ITEMS",
                "must be at least 1",
            ));
        }
        if !(self.cache_similarity > 0.0 && self.cache_similarity <= 1.0) {
            return Err(ConfigError::invalid(
                "LMGUARD_CACHE_SIMILARITY",
                format!("{} is outside (0, 1]", self.cache_similarity),
            ));
        }
        match &self.embedding {
            EmbeddingBackend::Local { dimension } if *dimension == 0 => Err(
                ConfigError::invalid("LMGUARD_EMBEDDING_DIM", "must be at least 1"),
            ),
            EmbeddingBackend::OpenAi { .. } if self.openai_api_key.is_none() => Err(
                ConfigError::invalid("OPENAI_API_KEY", "required by the openai embedding provider"),
            ),
            _ => Ok(()),
        }
    }
}

fn parse_default<T: FromStr>(raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err: T::Err| ConfigError::invalid("default", err.to_string()))
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(var, format!("`{raw}`: {err}"))),
        None => Ok(default),
    }
}
