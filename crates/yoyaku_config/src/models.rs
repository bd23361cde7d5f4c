// --- File: crates/yoyaku_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

// --- Upstream (system of record) Config ---
// Holds the admin-API credentials for the scheduling SaaS. The access token
// is loaded via YOYAKU_UPSTREAM__ACCESS_TOKEN; refresh credentials are
// optional and only needed when the token can expire mid-process.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpstreamConfig {
    pub brand_code: String,
    /// Overrides the derived `https://{brand_code}.admin...` base URL.
    pub base_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: Option<String>,
}

impl UpstreamConfig {
    pub fn api_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            format!("https://{}.admin.egw.example.app/api/v2", self.brand_code)
        })
    }

    pub fn oauth_token_url(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!("https://{}-admin.example.jp/api/oauth/token", self.brand_code)
        })
    }
}

// --- Booking Rules ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BookingConfig {
    /// IANA timezone the studios operate in.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Earliest a guest may book, relative to now.
    #[serde(default = "default_min_lead_minutes")]
    pub min_lead_minutes: i64,
    /// Latest a guest may book, relative to now.
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: i64,
    /// Staff buffer applied before a free-slot appointment.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_before_minutes: i64,
    /// Staff buffer applied after a free-slot appointment.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_after_minutes: i64,
    /// System-wide fallback entitlement when neither the program restriction
    /// list nor the program default names one.
    pub default_entitlement_id: Option<i64>,
    /// Salt for guest verification tokens. Mandatory; tokens authorize
    /// detail lookup and cancellation.
    pub token_salt: String,
}

fn default_time_zone() -> String {
    "Asia/Tokyo".to_string()
}
fn default_min_lead_minutes() -> i64 {
    30
}
fn default_max_horizon_days() -> i64 {
    14
}
fn default_buffer_minutes() -> i64 {
    10
}

// --- Cache TTLs ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_studios_ttl")]
    pub studios_ttl_secs: u64,
    /// Programs and rooms, per studio.
    #[serde(default = "default_catalog_ttl")]
    pub catalog_ttl_secs: u64,
    /// Staff-to-studio associations. Short because it is correctness
    /// sensitive and consulted on every free-slot booking.
    #[serde(default = "default_staff_map_ttl")]
    pub staff_map_ttl_secs: u64,
    /// Per-(room, date) schedule snapshots.
    #[serde(default = "default_schedule_ttl")]
    pub schedule_ttl_secs: u64,
    /// Per-(room, date-range, program) range snapshots.
    #[serde(default = "default_schedule_ttl")]
    pub range_ttl_secs: u64,
    /// Numbered-seat layouts per room.
    #[serde(default = "default_studios_ttl")]
    pub seat_spaces_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            studios_ttl_secs: default_studios_ttl(),
            catalog_ttl_secs: default_catalog_ttl(),
            staff_map_ttl_secs: default_staff_map_ttl(),
            schedule_ttl_secs: default_schedule_ttl(),
            range_ttl_secs: default_schedule_ttl(),
            seat_spaces_ttl_secs: default_studios_ttl(),
        }
    }
}

fn default_studios_ttl() -> u64 {
    600
}
fn default_catalog_ttl() -> u64 {
    300
}
fn default_staff_map_ttl() -> u64 {
    60
}
fn default_schedule_ttl() -> u64 {
    900
}

// --- Background Refresh ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefreshConfig {
    /// Upper bound on concurrent upstream calls during a refresh batch.
    #[serde(default = "default_refresh_concurrency")]
    pub concurrency: usize,
    /// Width of each refresh window; two consecutive windows are refreshed.
    #[serde(default = "default_refresh_window_days")]
    pub window_days: i64,
    /// Restrict refresh batches to these studios. Empty = all studios.
    #[serde(default)]
    pub studio_filter: Vec<i64>,
    /// Interval for the periodic background refresh. 0 disables it.
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            concurrency: default_refresh_concurrency(),
            window_days: default_refresh_window_days(),
            studio_filter: Vec::new(),
            interval_secs: default_refresh_interval(),
        }
    }
}

fn default_refresh_concurrency() -> usize {
    5
}
fn default_refresh_window_days() -> i64 {
    7
}
fn default_refresh_interval() -> u64 {
    900
}

// --- Top-level App Config ---
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub booking: BookingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}
