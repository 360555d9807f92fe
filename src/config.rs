//! Configuration for the Triangulator
//!
//! Detector tunables plus the feed connection settings. Loaded from the
//! environment (and `.env`) or from a TOML file.

use chrono::Duration;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::brain::DEFAULT_TOLERANCE;
use crate::cartographer::Currency;

// ============================================
// DETECTOR SETTINGS
// ============================================

/// Tunables of the detector core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Edges at least this old (seconds) are evicted before each run
    pub stale_after_secs: f64,

    /// Bellman-Ford relaxation passes; `None` = |V|-1
    pub relaxation_passes: Option<usize>,

    /// Minimum improvement of the witness edge to report a cycle
    pub tolerance: f64,

    /// Start vertex for every run
    pub anchor: Currency,

    /// Amount of the anchor currency walked around a detected cycle
    pub starting_notional: f64,
}

impl DetectorSettings {
    /// Staleness threshold as a duration (microsecond resolution)
    pub fn stale_after(&self) -> Duration {
        Duration::microseconds((self.stale_after_secs * 1_000_000.0).round() as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.stale_after_secs.is_finite() || self.stale_after_secs <= 0.0 {
            return Err(eyre::eyre!(
                "STALE_QUOTE_SECS must be > 0 (currently {})",
                self.stale_after_secs
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(eyre::eyre!(
                "CYCLE_TOLERANCE must be >= 0 (currently {})",
                self.tolerance
            ));
        }
        if !self.starting_notional.is_finite() || self.starting_notional <= 0.0 {
            return Err(eyre::eyre!(
                "STARTING_NOTIONAL must be > 0 (currently {})",
                self.starting_notional
            ));
        }
        if self.relaxation_passes == Some(0) {
            return Err(eyre::eyre!("RELAXATION_PASSES must be at least 1"));
        }
        Ok(())
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: 1.5,
            relaxation_passes: None,
            tolerance: DEFAULT_TOLERANCE,
            anchor: Currency::USD,
            starting_notional: 100.0,
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Feed Settings ==========
    /// Address of the quote publisher
    pub publisher_addr: SocketAddr,

    /// Local UDP address to receive quotes on (port 0 = any)
    pub listen_addr: SocketAddr,

    /// Seconds before the subscription is renewed (and the graph cleared)
    pub subscription_secs: u64,

    /// Receive buffer per datagram
    pub recv_buffer_bytes: usize,

    // ========== Output ==========
    /// Enable/disable the opportunity log
    pub opportunity_log: bool,

    /// Path of the JSON-lines opportunity log
    pub opportunity_log_path: String,

    // ========== Detector ==========
    pub detector: DetectorSettings,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            // Feed
            publisher_addr: env::var("PUBLISHER_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:50411".to_string())
                .parse()?,
            listen_addr: env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:0".to_string())
                .parse()?,
            subscription_secs: env::var("SUBSCRIPTION_SECS")
                .unwrap_or_else(|_| "600".to_string()) // ten minutes
                .parse()
                .unwrap_or(defaults.subscription_secs),
            recv_buffer_bytes: env::var("RECV_BUFFER_BYTES")
                .unwrap_or_else(|_| "4096".to_string())
                .parse()
                .unwrap_or(defaults.recv_buffer_bytes),

            // Output
            opportunity_log: env::var("OPPORTUNITY_LOG")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            opportunity_log_path: env::var("OPPORTUNITY_LOG_PATH")
                .unwrap_or(defaults.opportunity_log_path),

            // Detector
            detector: DetectorSettings {
                stale_after_secs: env::var("STALE_QUOTE_SECS")
                    .unwrap_or_else(|_| "1.5".to_string())
                    .parse()
                    .unwrap_or(defaults.detector.stale_after_secs),
                relaxation_passes: env::var("RELAXATION_PASSES")
                    .ok()
                    .and_then(|s| s.parse().ok()),
                tolerance: env::var("CYCLE_TOLERANCE")
                    .unwrap_or_else(|_| "1e-12".to_string())
                    .parse()
                    .unwrap_or(defaults.detector.tolerance),
                anchor: env::var("ANCHOR_CURRENCY")
                    .unwrap_or_else(|_| "USD".to_string())
                    .parse()?,
                starting_notional: env::var("STARTING_NOTIONAL")
                    .unwrap_or_else(|_| "100.0".to_string())
                    .parse()
                    .unwrap_or(defaults.detector.starting_notional),
            },
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn subscription_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.subscription_secs)
    }

    /// Validate configuration before starting a feed session
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;

        if self.subscription_secs == 0 {
            return Err(eyre::eyre!("SUBSCRIPTION_SECS must be at least 1"));
        }
        if self.recv_buffer_bytes < crate::feed::RECORD_SIZE {
            return Err(eyre::eyre!(
                "RECV_BUFFER_BYTES must hold at least one {}-byte record (currently {})",
                crate::feed::RECORD_SIZE,
                self.recv_buffer_bytes
            ));
        }
        if !self.listen_addr.is_ipv4() {
            return Err(eyre::eyre!(
                "LISTEN_ADDR must be IPv4, the subscription message carries a 4-byte address"
            ));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              TRIANGULATOR - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FEED                                                       ║");
        println!("║ • Publisher:       {:^40} ║", self.publisher_addr.to_string());
        println!("║ • Listen:          {:^40} ║", self.listen_addr.to_string());
        println!("║ • Subscription:    {:>38}s ║", self.subscription_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DETECTOR                                                   ║");
        println!("║ • Anchor:          {:^40} ║", self.detector.anchor.as_str());
        println!("║ • Stale After:     {:>38.3}s ║", self.detector.stale_after_secs);
        println!("║ • Tolerance:       {:>39e} ║", self.detector.tolerance);
        println!("║ • Passes:          {:^40} ║",
            self.detector
                .relaxation_passes
                .map(|p| p.to_string())
                .unwrap_or_else(|| "|V|-1".to_string())
        );
        println!("║ • Notional:        {:>39.2} ║", self.detector.starting_notional);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ OUTPUT                                                     ║");
        println!("║ • Opportunity Log: {:^40} ║",
            if self.opportunity_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publisher_addr: SocketAddr::from(([127, 0, 0, 1], 50411)),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            subscription_secs: 600,
            recv_buffer_bytes: 4096,
            opportunity_log: true,
            opportunity_log_path: "./logs/opportunities.jsonl".to_string(),
            detector: DetectorSettings::default(),
        }
    }
}

// ============================================
// TESTS
// ============================================
