//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `GATEWAY_SECRET_KEY` (required): bearer secret for the payment gateway;
///   also the HMAC key for inbound webhook signatures
/// - `GATEWAY_BASE_URL` (optional): gateway API root, defaults to
///   `https://api.paystack.co`
/// - `PENDING_PAYMENT_TTL_MINUTES` (optional): how long a pending payment is
///   reusable before it is treated as expired, defaults to 30
/// - `FRAUD_IP_WINDOW_MINUTES` (optional): trailing window for the IP
///   velocity check, defaults to 60
/// - `FRAUD_IP_THRESHOLD` (optional): payments per IP inside the window
///   before a request is flagged, defaults to 5
/// - `EXPIRY_SWEEP_INTERVAL_MINUTES` (optional): cadence of the background
///   sweep stamping stale pending payments, defaults to 10
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub gateway_secret_key: String,

    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    #[serde(default = "default_pending_ttl")]
    pub pending_payment_ttl_minutes: i64,

    #[serde(default = "default_fraud_window")]
    pub fraud_ip_window_minutes: i64,

    #[serde(default = "default_fraud_threshold")]
    pub fraud_ip_threshold: i64,

    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_minutes: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_gateway_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_pending_ttl() -> i64 {
    30
}

fn default_fraud_window() -> i64 {
    60
}

fn default_fraud_threshold() -> i64 {
    5
}

fn default_sweep_interval() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
