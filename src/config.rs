use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub notes_dir: PathBuf,
    pub bcrypt_cost: u32,
    /// Record the client IP on notes it creates or updates.
    pub store_ip: bool,
    pub enable_pwa: bool,
    pub enable_offline_mode: bool,
    /// Honour CF-Connecting-IP / X-Forwarded-For / X-Real-IP.
    pub trust_forwarded_headers: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            notes_dir: PathBuf::from("notes"),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            store_ip: false,
            enable_pwa: true,
            enable_offline_mode: true,
            trust_forwarded_headers: true,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PasswordMode {
    /// Each user owns a bcrypt-hashed password.
    #[default]
    Individual,
    /// Every user shares the password rendered from `global_pattern`.
    Global,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub mode: PasswordMode,
    pub global_pattern: String,
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            mode: PasswordMode::Individual,
            global_pattern: "#notes_{YYYY}{MM}".into(),
            min_length: 6,
            require_uppercase: false,
            require_lowercase: false,
            require_number: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    pub require_global_code: bool,
    pub global_code_pattern: String,
    /// Empty means any username is accepted.
    pub allowed_usernames: Vec<String>,
    pub blocked_usernames: Vec<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            require_global_code: false,
            global_code_pattern: "{YYYY}{MM}".into(),
            allowed_usernames: Vec::new(),
            blocked_usernames: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FirewallMode {
    #[default]
    Disabled,
    Blacklist,
    Whitelist,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FirewallSettings {
    pub mode: FirewallMode,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
}

/// Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BruteForceSettings {
    pub enabled: bool,
    pub window: i64,
    pub max_attempts: usize,
    pub delay: u64,
    pub max_delay: u64,
    /// Zero disables lockouts.
    pub lockout_attempts: usize,
    pub lockout_duration: i64,
}

impl Default for BruteForceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 900,
            max_attempts: 5,
            delay: 2,
            max_delay: 30,
            lockout_attempts: 20,
            lockout_duration: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiKey {
    pub key: String,
    pub enabled: bool,
    /// Allowed origin hosts, `*.example.com` style wildcards allowed.
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeySettings {
    pub require: bool,
    pub keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub password: PasswordSettings,
    pub access: AccessSettings,
    pub firewall: FirewallSettings,
    pub brute_force: BruteForceSettings,
    pub api_keys: ApiKeySettings,
}

impl Settings {
    /// Defaults, then the optional TOML file at `path`, then
    /// `QUICKNOTES_<SECTION>__<KEY>` variables, then `PORT`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let environment = Environment::with_prefix("QUICKNOTES")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("access.allowed_usernames")
            .with_list_parse_key("access.blocked_usernames")
            .with_list_parse_key("firewall.blacklist")
            .with_list_parse_key("firewall.whitelist");

        Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(environment)
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Location of the config file, taken from `QUICKNOTES_CONFIG`.
    pub fn config_path() -> String {
        env::var("QUICKNOTES_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
    }
}
