//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use chrono::{DateTime, Utc, Weekday};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    /// Credential seeds keyed by integration name
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialConfig>,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Summary store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tally").join("tally.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tally_data/tally.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed browser origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Weekly trigger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Day of week the weekly run fires ("mon", "tuesday", ...)
    #[serde(default = "default_weekday")]
    pub weekday: String,

    #[serde(default = "default_hour")]
    pub hour: u32,

    #[serde(default)]
    pub minute: u32,

    /// Local offset used for week boundaries and the trigger time
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Upper bound for one source's fetch + transform + store
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// How often the trigger loop wakes up to check the clock
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_weekday() -> String {
    "mon".to_string()
}

fn default_hour() -> u32 {
    8
}

fn default_utc_offset() -> i32 {
    -6
}

fn default_source_timeout() -> u64 {
    300
}

fn default_check_interval() -> u64 {
    60
}

impl ScheduleConfig {
    /// Parsed trigger weekday, Monday when unrecognized
    pub fn weekday(&self) -> Weekday {
        self.weekday.parse().unwrap_or(Weekday::Mon)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            weekday: default_weekday(),
            hour: default_hour(),
            minute: 0,
            utc_offset_hours: default_utc_offset(),
            source_timeout_secs: default_source_timeout(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Retry policy for transient source failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Per-source configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub attendance: SheetsSourceConfig,

    #[serde(default)]
    pub mailchimp: MailchimpSourceConfig,

    #[serde(default)]
    pub checkins: CheckinsSourceConfig,

    #[serde(default)]
    pub groups: GroupsSourceConfig,

    #[serde(default)]
    pub youtube: YouTubeSourceConfig,

    #[serde(default)]
    pub livestreams: LivestreamsSourceConfig,

    #[serde(default)]
    pub clickup: ClickUpSourceConfig,
}

/// Adult attendance spreadsheet
#[derive(Debug, Clone, Deserialize)]
pub struct SheetsSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_sheets_url")]
    pub base_url: String,

    #[serde(default)]
    pub spreadsheet_id: String,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    #[serde(default = "default_sheet_range")]
    pub range: String,
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_sheet_name() -> String {
    "Adult Attendance".to_string()
}

fn default_sheet_range() -> String {
    "A2:E".to_string()
}

impl Default for SheetsSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_sheets_url(),
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            range: default_sheet_range(),
        }
    }
}

/// Mailchimp campaign reports
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailchimpSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Data center prefix from the API key suffix ("us21")
    #[serde(default)]
    pub server_prefix: String,

    /// Overrides the URL derived from `server_prefix`
    pub base_url: Option<String>,

    /// Audience display name -> list id
    #[serde(default)]
    pub audiences: BTreeMap<String, String>,
}

impl MailchimpSourceConfig {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.api.mailchimp.com/3.0", self.server_prefix),
        }
    }
}

/// Planning Center check-in headcounts
#[derive(Debug, Clone, Deserialize)]
pub struct CheckinsSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_pco_url")]
    pub base_url: String,

    /// Event name -> ministry name. Unmapped events use their own name.
    #[serde(default)]
    pub ministry_aliases: BTreeMap<String, String>,

    /// Evening student ministries: counted in the 4:30 slot and reporting
    /// `new_students` instead of `new_kids_*`
    #[serde(default = "default_student_ministries")]
    pub student_ministries: Vec<String>,
}

fn default_student_ministries() -> Vec<String> {
    vec!["InsideOut".to_string()]
}

fn default_pco_url() -> String {
    "https://api.planningcenteronline.com".to_string()
}

impl Default for CheckinsSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_pco_url(),
            ministry_aliases: BTreeMap::new(),
            student_ministries: default_student_ministries(),
        }
    }
}

/// Planning Center small groups
#[derive(Debug, Clone, Deserialize)]
pub struct GroupsSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_pco_url")]
    pub base_url: String,

    /// Group type counted as small groups
    #[serde(default = "default_group_type")]
    pub group_type: String,

    /// Group whose members count as coaches
    #[serde(default = "default_coaching_group")]
    pub coaching_group: String,

    /// Group type the coaching group belongs to
    #[serde(default = "default_coaching_group_type")]
    pub coaching_group_type: String,
}

fn default_group_type() -> String {
    "Groups".to_string()
}

fn default_coaching_group() -> String {
    "Coaching Team".to_string()
}

fn default_coaching_group_type() -> String {
    "Teams".to_string()
}

impl Default for GroupsSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_pco_url(),
            group_type: default_group_type(),
            coaching_group: default_coaching_group(),
            coaching_group_type: default_coaching_group_type(),
        }
    }
}

/// YouTube Analytics channel report
#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_youtube_url")]
    pub base_url: String,
}

fn default_youtube_url() -> String {
    "https://youtubeanalytics.googleapis.com".to_string()
}

impl Default for YouTubeSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_youtube_url(),
        }
    }
}

/// Livestreams published on a YouTube channel
#[derive(Debug, Clone, Deserialize)]
pub struct LivestreamsSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_youtube_data_url")]
    pub base_url: String,

    #[serde(default)]
    pub channel_id: String,

    /// Finished videos shorter than this are not counted as livestreams
    #[serde(default = "default_min_livestream_secs")]
    pub min_duration_secs: u64,
}

fn default_youtube_data_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_min_livestream_secs() -> u64 {
    1800
}

impl Default for LivestreamsSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_youtube_data_url(),
            channel_id: String::new(),
            min_duration_secs: default_min_livestream_secs(),
        }
    }
}

/// ClickUp closed tasks
#[derive(Debug, Clone, Deserialize)]
pub struct ClickUpSourceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_clickup_url")]
    pub base_url: String,

    #[serde(default)]
    pub team_id: String,
}

fn default_clickup_url() -> String {
    "https://api.clickup.com".to_string()
}

impl Default for ClickUpSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_clickup_url(),
            team_id: String::new(),
        }
    }
}

/// Seed values for one integration's credential
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialConfig {
    /// API key or OAuth access token
    #[serde(default)]
    pub secret: String,

    pub refresh_token: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,

    /// OAuth token endpoint used for refresh
    pub token_url: Option<String>,

    pub client_id: Option<String>,

    pub client_secret: Option<String>,
}

/// Weekly report publishing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Link appended to every published report
    pub dashboard_url: Option<String>,

    #[serde(default)]
    pub clickup: ClickUpChatConfig,
}

/// ClickUp chat target
#[derive(Debug, Clone, Deserialize)]
pub struct ClickUpChatConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_clickup_url")]
    pub base_url: String,

    #[serde(default)]
    pub workspace_id: String,

    #[serde(default)]
    pub channel_id: String,

    /// Task that receives a comment when the chat post fails
    pub fallback_task_id: Option<String>,
}

impl Default for ClickUpChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_clickup_url(),
            workspace_id: String::new(),
            channel_id: String::new(),
            fallback_task_id: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Integrations whose secret can be supplied via `TALLY_SECRET_<NAME>`
pub const KNOWN_INTEGRATIONS: &[&str] = &[
    "google_sheets",
    "mailchimp",
    "planning_center",
    "youtube",
    "clickup",
];

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tally").join("config.toml")),
            Some(PathBuf::from("/etc/tally/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(path) = var("TALLY_DB_PATH") {
            self.storage.path = path;
        }

        // API overrides
        if let Some(host) = var("TALLY_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("TALLY_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Schedule overrides
        if let Some(offset) = var("TALLY_UTC_OFFSET").and_then(|o| o.parse().ok()) {
            self.schedule.utc_offset_hours = offset;
        }

        // Publishing overrides
        if let Some(url) = var("TALLY_DASHBOARD_URL") {
            self.publish.dashboard_url = Some(url);
        }

        // Secrets
        for name in KNOWN_INTEGRATIONS {
            let key = format!("TALLY_SECRET_{}", name.to_uppercase());
            if let Some(secret) = var(&key) {
                self.credentials
                    .entry(name.to_string())
                    .or_default()
                    .secret = secret;
            }
        }

        // Logging overrides
        if let Some(level) = var("TALLY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("TALLY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tally Configuration
#
# Environment variables override these settings:
# - TALLY_DB_PATH
# - TALLY_API_HOST
# - TALLY_API_PORT
# - TALLY_UTC_OFFSET
# - TALLY_DASHBOARD_URL
# - TALLY_SECRET_<INTEGRATION>  (e.g. TALLY_SECRET_MAILCHIMP)
# - TALLY_LOG_LEVEL
# - TALLY_LOG_FORMAT

[storage]
# SQLite file holding summaries, the run log and credentials
path = "./tally_data/tally.db"

[api]
host = "0.0.0.0"
port = 8082

# Allowed CORS origins (empty = permissive)
cors_origins = []

[schedule]
enabled = true

# Weekly trigger, in local time
weekday = "mon"
hour = 8
minute = 0

# Hours east of UTC used for week boundaries (-6 = US Central standard time)
utc_offset_hours = -6

# A source that runs longer than this is abandoned for the week
source_timeout_secs = 300

[retry]
# Attempts per source for rate-limited / unavailable upstreams
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 30000

[sources.attendance]
enabled = false
spreadsheet_id = ""
sheet_name = "Adult Attendance"
# Columns: A (unused), B date, C chair count, D 9:30 count, E 11:00 count
range = "A2:E"

[sources.mailchimp]
enabled = false
server_prefix = "us1"

[sources.mailchimp.audiences]
# "Weekly Newsletter" = "abc123"

[sources.checkins]
enabled = false
# Counted in the 4:30 slot; newcomers reported as new_students
student_ministries = ["InsideOut"]

[sources.checkins.ministry_aliases]
# "Kids Sunday Check-in" = "Kids"

[sources.groups]
enabled = false
group_type = "Groups"
coaching_group = "Coaching Team"
coaching_group_type = "Teams"

[sources.youtube]
enabled = false

[sources.livestreams]
enabled = false
channel_id = ""
min_duration_secs = 1800

[sources.clickup]
enabled = false
team_id = ""

# Credentials are seeded into the database on first start. Refreshed
# OAuth tokens are kept in the database afterwards.
#
# [credentials.mailchimp]
# secret = "<api key>"
#
# [credentials.planning_center]
# secret = "<access token>"
# refresh_token = "<refresh token>"
# token_url = "https://api.planningcenteronline.com/oauth/token"
# client_id = ""
# client_secret = ""

[publish]
# Post the snapshot automatically after each weekly run
enabled = false
# dashboard_url = "https://dashboard.example.org"

[publish.clickup]
enabled = false
workspace_id = ""
channel_id = ""
# fallback_task_id = ""

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
