use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::accumulator::{AccumulatorConfig, Contribution};
use crate::executor::ExecutionSettings;
use crate::runtime::PollerSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub binance: BinanceConfig,
    pub accumulator: AccumulatorSection,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    pub rest_base_url: String,
    pub symbol: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    /// Account leverage to set on every traded symbol before starting.
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(skip)]
    pub api_key: String,
    #[serde(skip)]
    pub api_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    #[default]
    Identity,
    Leveraged,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccumulatorSection {
    pub threshold: f64,
    #[serde(default)]
    pub min_delta: f64,
    #[serde(default)]
    pub contribution: ContributionKind,
    #[serde(default)]
    pub position_size: Option<f64>,
    #[serde(default)]
    pub leverage: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    pub interval: String,
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Defaults to the accumulator threshold.
    #[serde(default)]
    pub notional_usdt: Option<f64>,
    #[serde(default = "default_qty_precision")]
    pub qty_precision: u32,
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default)]
    pub initial_capital: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_csv_dir")]
    pub csv_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

fn default_recv_window() -> u64 {
    5000
}

fn default_poll_interval() -> String {
    "500ms".to_string()
}

fn default_true() -> bool {
    true
}

fn default_qty_precision() -> u32 {
    3
}

fn default_close_delay_ms() -> u64 {
    500
}

fn default_fee_rate() -> f64 {
    0.001
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/releases.sqlite")
}

fn default_csv_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("accrual-bot.log")
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            max_consecutive_failures: 0,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            notional_usdt: None,
            qty_precision: default_qty_precision(),
            close_delay_ms: default_close_delay_ms(),
            fee_rate: default_fee_rate(),
            initial_capital: 0.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            csv_dir: default_csv_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Parse a duration string (e.g. "250ms", "1s", "5m", "1h") into milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        bail!(
            "invalid interval '{}': expected a number followed by one of ms/s/m/h",
            s
        );
    };

    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

impl BinanceConfig {
    pub fn tradable_symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.symbol.trim().is_empty() {
            out.push(self.symbol.trim().to_ascii_uppercase());
        }
        for sym in &self.symbols {
            let s = sym.trim().to_ascii_uppercase();
            if !s.is_empty() && !out.iter().any(|v| v == &s) {
                out.push(s);
            }
        }
        out
    }
}

impl AccumulatorSection {
    pub fn to_config(&self) -> Result<AccumulatorConfig> {
        let contribution = match self.contribution {
            ContributionKind::Identity => Contribution::Identity,
            ContributionKind::Leveraged => Contribution::leveraged(
                self.position_size
                    .context("accumulator.position_size is required for the leveraged contribution")?,
                self.leverage
                    .context("accumulator.leverage is required for the leveraged contribution")?,
            ),
        };
        let config = AccumulatorConfig::new(self.threshold)
            .with_min_delta(self.min_delta)
            .with_contribution(contribution);
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let mut config = Self::from_toml_str(&config_str)
            .with_context(|| format!("invalid config in {}", path.display()))?;

        config.binance.api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
        config.binance.api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();

        Ok(config)
    }

    /// Live order placement needs signed requests.
    pub fn require_credentials(&self) -> Result<()> {
        if !self.execution.dry_run
            && (self.binance.api_key.is_empty() || self.binance.api_secret.is_empty())
        {
            bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set in .env or environment when execution.dry_run = false");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.binance.tradable_symbols().is_empty() {
            bail!("binance.symbol or binance.symbols must name at least one symbol");
        }
        self.accumulator
            .to_config()
            .context("accumulator section is invalid")?;
        parse_interval_ms(&self.poller.interval).context("poller.interval is invalid")?;
        if let Some(notional) = self.execution.notional_usdt {
            if !(notional.is_finite() && notional > 0.0) {
                bail!("execution.notional_usdt must be positive, got {}", notional);
            }
        }
        if !(self.execution.fee_rate.is_finite() && (0.0..1.0).contains(&self.execution.fee_rate)) {
            bail!("execution.fee_rate must be in [0, 1), got {}", self.execution.fee_rate);
        }
        Ok(())
    }

    pub fn poller_settings(&self) -> Result<PollerSettings> {
        let interval_ms = parse_interval_ms(&self.poller.interval)?;
        Ok(PollerSettings {
            interval: Duration::from_millis(interval_ms),
            max_consecutive_failures: self.poller.max_consecutive_failures,
        })
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            dry_run: self.execution.dry_run,
            notional_usdt: self
                .execution
                .notional_usdt
                .unwrap_or(self.accumulator.threshold),
            qty_precision: self.execution.qty_precision,
            close_delay_ms: self.execution.close_delay_ms,
            fee_rate: self.execution.fee_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[binance]
rest_base_url = "https://testnet.binancefuture.com"
symbol = "BTCUSDT"
symbols = ["ETHUSDT", "btcusdt"]
recv_window = 5000
leverage = 20

[accumulator]
threshold = 100.0
min_delta = 0.01
contribution = "leveraged"
position_size = 0.001
leverage = 20.0

[poller]
interval = "500ms"
max_consecutive_failures = 10

[execution]
dry_run = false
qty_precision = 3
close_delay_ms = 500
fee_rate = 0.001
initial_capital = 0.01

[logging]
level = "debug"
"#;

    #[test]
    fn parse_sample_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.binance.symbol, "BTCUSDT");
        assert_eq!(config.binance.leverage, Some(20));
        assert_eq!(config.accumulator.contribution, ContributionKind::Leveraged);
        assert!((config.accumulator.threshold - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.poller.max_consecutive_failures, 10);
        assert!(!config.execution.dry_run);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.db_path, PathBuf::from("data/releases.sqlite"));
    }

    #[test]
    fn notional_defaults_to_threshold() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let settings = config.execution_settings();
        assert!((settings.notional_usdt - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn poller_interval_is_parsed() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let settings = config.poller_settings().unwrap();
        assert_eq!(settings.interval, Duration::from_millis(500));
    }

    #[test]
    fn parse_interval_valid() {
        assert_eq!(parse_interval_ms("250ms").unwrap(), 250);
        assert_eq!(parse_interval_ms("1s").unwrap(), 1_000);
        assert_eq!(parse_interval_ms("2m").unwrap(), 120_000);
        assert_eq!(parse_interval_ms("1h").unwrap(), 3_600_000);
    }

    #[test]
    fn parse_interval_rejects_invalid_inputs() {
        assert!(parse_interval_ms("").is_err());
        assert!(parse_interval_ms("ms").is_err());
        assert!(parse_interval_ms("0s").is_err());
        assert!(parse_interval_ms("1x").is_err());
        assert!(parse_interval_ms("-5s").is_err());
    }
}
