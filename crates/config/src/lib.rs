use std::path::PathBuf;
use serde::Deserialize;

/// All configuration for the park ticketing application.
///
/// Precedence (lowest to highest): defaults → config file → env var → CLI arg.
/// CLI arg merging is done by the caller after `Config::load()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Database
    pub db_url: String,

    // Server
    pub port: u16,

    // Logging
    pub log_level: String,
    pub utc: bool,

    // Demo customer every web purchase is booked to
    pub customer_email: String,
    pub customer_name: String,

    // Simulated card processing latency
    pub payment_delay_ms: u64,
}

/// Config file layout (~/.ecopark/config.toml). All fields optional; they
/// layer on top of compiled-in defaults.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    db_url: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
    utc: Option<bool>,
    customer_email: Option<String>,
    customer_name: Option<String>,
    payment_delay_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: "sqlite:ecopark.db".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            utc: false,
            customer_email: "visitante@ecoharmonypark.com".to_string(),
            customer_name: "Visitante".to_string(),
            payment_delay_ms: 500,
        }
    }
}

impl Config {
    /// Config directory: ~/.ecopark/
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ecopark")
    }

    /// Config file path: ~/.ecopark/config.toml
    pub fn file_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load config: defaults → config file → env vars.
    /// CLI args should be merged by the caller afterward.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Layer 2: config file
        if let Ok(contents) = std::fs::read_to_string(Self::file_path()) {
            if let Ok(file) = toml::from_str::<FileConfig>(&contents) {
                config.apply_file(file);
            }
        }

        // Layer 3: environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    // --- Private helpers ---

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_url { self.db_url = v; }
        if let Some(v) = file.port { self.port = v; }
        if let Some(v) = file.log_level { self.log_level = v; }
        if let Some(v) = file.utc { self.utc = v; }
        if let Some(v) = file.customer_email { self.customer_email = v; }
        if let Some(v) = file.customer_name { self.customer_name = v; }
        if let Some(v) = file.payment_delay_ms { self.payment_delay_ms = v; }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ECOPARK_DB_URL") { self.db_url = v; }
        if let Some(v) = var("ECOPARK_PORT") {
            if let Ok(p) = v.parse() { self.port = p; }
        }
        if let Some(v) = var("ECOPARK_LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = var("ECOPARK_UTC") {
            self.utc = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("ECOPARK_CUSTOMER_EMAIL") { self.customer_email = v; }
        if let Some(v) = var("ECOPARK_CUSTOMER_NAME") { self.customer_name = v; }
        if let Some(v) = var("ECOPARK_PAYMENT_DELAY_MS") {
            if let Ok(ms) = v.parse() { self.payment_delay_ms = ms; }
        }
    }
}
