// --- File: crates/yoyaku_config/src/lib.rs ---

pub mod models;

pub use models::{
    AppConfig, BookingConfig, CacheConfig, RefreshConfig, ServerConfig, UpstreamConfig,
};

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;

static DOTENV_LOADED: OnceCell<()> = OnceCell::new();

/// Loads `.env` exactly once per process. Safe to call from every entry
/// point (binary, tests, tools).
pub fn ensure_dotenv_loaded() {
    DOTENV_LOADED.get_or_init(|| {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("Loaded environment from .env");
        }
    });
}

/// Loads the application configuration.
///
/// Sources, later ones overriding earlier ones:
/// 1. `config.yml` in the working directory (optional)
/// 2. environment variables prefixed with `YOYAKU_`, `__` as the section
///    separator (e.g. `YOYAKU_UPSTREAM__ACCESS_TOKEN`)
pub fn load_config() -> Result<AppConfig, ConfigError> {
    ensure_dotenv_loaded();
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::with_prefix("YOYAKU").separator("__"))
        .build()?;
    config.try_deserialize()
}
