use std::path::PathBuf;

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, Map,
};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct PanoramaConfig {
    pub server: Server,
    pub store: StoreConfig,
    pub availability: AvailabilityConfig,
    pub admin: Admin,
    pub rate_limit: RateLimit,
    pub logger: Logger,
}

impl PanoramaConfig {
    /// `panorama.toml`、`PANORAMA_SECTION__KEY` 形式の環境変数、`PORT` の順に上書きする
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::vars().collect())
    }

    fn load_from(vars: Map<String, String>) -> Result<Self, ConfigError> {
        let port = vars.get("PORT").cloned();
        let mut builder = Self::builder()?
            .add_source(File::with_name("panorama.toml").required(false))
            .add_source(
                Environment::with_prefix("PANORAMA")
                    .prefix_separator("_")
                    .separator("__")
                    .source(Some(vars)),
            );
        if let Some(port) = port {
            builder = builder.set_override("server.port", port)?;
        }
        builder.build()?.try_deserialize::<PanoramaConfig>()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.static_dir", "public")?
            .set_default("store.backend", "json")?
            .set_default("store.data_dir", "data")?
            .set_default("store.sqlite_path", "data/panorama.db")?
            .set_default("availability.horizon_days", 90)?
            .set_default("admin.username", "admin")?
            .set_default("admin.session_ttl_minutes", 480)?
            .set_default("rate_limit.max_requests", 100)?
            .set_default("rate_limit.window_secs", 900)?
            .set_default("logger.level", "INFO")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub tls: Option<Tls>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub sqlite_path: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Json,
    Sqlite,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AvailabilityConfig {
    pub horizon_days: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Admin {
    pub username: String,
    /// 未設定の間は管理者ログインを受け付けない
    pub password: Option<String>,
    pub session_ttl_minutes: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
