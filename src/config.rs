use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "EHR AI Services";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const API_V1_STR: &str = "/api/v1";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_VECTOR_DIMENSION: usize = 1536;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_AI_SYSTEM_PROMPT: &str = "You are an AI medical expert. You will be given a question about a medical document.
Respond with the necessary information from the document, and if possible, provide a summary.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Backoff policy for re-indexing documents whose first index attempt failed.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRetryPolicy {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for IndexRetryPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_attempts: 5,
            base_delay_secs: 30,
        }
    }
}

/// Runtime settings, read from the process environment (and `.env` when present).
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub environment: String,
    pub debug: bool,
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
    #[serde(skip_serializing)]
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub vector_dimension: usize,
    pub llm_timeout_secs: u64,
    pub ai_system_prompt: String,
    pub similarity_top_k: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub allowed_origins: Vec<String>,
    pub index_retry: IndexRetryPolicy,
}

impl Settings {
    /// Load `.env` (if any) and read settings from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Missing keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(app_data_dir);
        let dir_or = |key: &str, default: &str| {
            get(key).map(PathBuf::from).unwrap_or_else(|| data_dir.join(default))
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("text") | Some("pretty") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'text' or 'json'".into(),
                })
            }
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            debug: parse_bool("DEBUG", get("DEBUG"), false)?,
            bind_addr: parse_value(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            )?,
            database_path: dir_or("DATABASE_PATH", "ehr_ai.db"),
            upload_dir: dir_or("UPLOAD_DIR", "uploads"),
            processed_dir: dir_or("PROCESSED_DIR", "processed"),
            temp_dir: dir_or("TEMP_DIR", "temp"),
            max_file_size: parse_value("MAX_FILE_SIZE", get("MAX_FILE_SIZE"), DEFAULT_MAX_FILE_SIZE)?,
            llm_api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            llm_base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            vector_dimension: parse_value(
                "VECTOR_DIMENSION",
                get("VECTOR_DIMENSION"),
                DEFAULT_VECTOR_DIMENSION,
            )?,
            llm_timeout_secs: parse_value("LLM_TIMEOUT_SECS", get("LLM_TIMEOUT_SECS"), 120)?,
            ai_system_prompt: get("AI_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_AI_SYSTEM_PROMPT.into()),
            similarity_top_k: parse_value("SIMILARITY_TOP_K", get("SIMILARITY_TOP_K"), 5)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "INFO".into()),
            log_format,
            allowed_origins,
            index_retry: IndexRetryPolicy {
                interval_secs: parse_value(
                    "INDEX_RETRY_INTERVAL_SECS",
                    get("INDEX_RETRY_INTERVAL_SECS"),
                    IndexRetryPolicy::default().interval_secs,
                )?,
                max_attempts: parse_value(
                    "INDEX_RETRY_MAX_ATTEMPTS",
                    get("INDEX_RETRY_MAX_ATTEMPTS"),
                    IndexRetryPolicy::default().max_attempts,
                )?,
                base_delay_secs: parse_value(
                    "INDEX_RETRY_BASE_DELAY_SECS",
                    get("INDEX_RETRY_BASE_DELAY_SECS"),
                    IndexRetryPolicy::default().base_delay_secs,
                )?,
            },
            data_dir,
        })
    }

    /// Defaults rooted at `data_dir`, ignoring the environment.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.into().to_string_lossy().into_owned();
        Self::from_lookup(|key| (key == "DATA_DIR").then(|| data_dir.clone()))
    }
}

fn parse_value<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            })
        }
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            key,
            value: v,
            reason: "expected a boolean".into(),
        }),
    }
}

/// Platform data dir (e.g. ~/.local/share/ehr-ai-services), `./data` when unknown.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("ehr-ai-services"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        "critical" | "error" => "error",
        "warning" | "warn" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    format!("ehr_ai={level},ehr_ai_services={level},tower_http=warn,{level}")
}
