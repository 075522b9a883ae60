use std::time::Duration;

use accrual_bot::accumulator::Contribution;
use accrual_bot::config::{Config, ContributionKind};

const MINIMAL: &str = r#"
[binance]
rest_base_url = "https://testnet.binancefuture.com"
symbol = "btcusdt"
symbols = [" ethusdt ", "BTCUSDT", ""]

[accumulator]
threshold = 25.0
"#;

#[test]
fn minimal_config_fills_defaults() {
    let config = Config::from_toml_str(MINIMAL).unwrap();
    assert_eq!(config.binance.tradable_symbols(), vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(config.binance.recv_window, 5000);
    assert_eq!(config.binance.leverage, None);
    assert_eq!(config.accumulator.contribution, ContributionKind::Identity);
    assert!(config.execution.dry_run);
    assert_eq!(config.poller_settings().unwrap().interval, Duration::from_millis(500));

    let settings = config.execution_settings();
    assert!((settings.notional_usdt - 25.0).abs() < f64::EPSILON);
    assert_eq!(settings.qty_precision, 3);
    assert_eq!(settings.close_delay_ms, 500);

    let acc = config.accumulator.to_config().unwrap();
    assert!(matches!(acc.contribution, Contribution::Identity));
    assert_eq!(acc.min_delta, 0.0);
}

#[test]
fn leveraged_contribution_requires_position_and_leverage() {
    let toml = MINIMAL.replace("threshold = 25.0", "threshold = 25.0\ncontribution = \"leveraged\"");
    assert!(Config::from_toml_str(&toml).is_err());

    let toml = MINIMAL.replace(
        "threshold = 25.0",
        "threshold = 25.0\ncontribution = \"leveraged\"\nposition_size = 0.001\nleverage = 20.0",
    );
    let config = Config::from_toml_str(&toml).unwrap();
    let acc = config.accumulator.to_config().unwrap();
    assert!((acc.contribution.apply(50.0) - 1.0).abs() < 1e-12);
}

#[test]
fn invalid_values_are_rejected() {
    for (from, to) in [
        ("threshold = 25.0", "threshold = 0.0"),
        ("threshold = 25.0", "threshold = 25.0\nmin_delta = -1.0"),
        ("symbol = \"btcusdt\"", "symbol = \"\""),
    ] {
        let toml = MINIMAL.replace(from, to);
        let toml = if from.starts_with("symbol") {
            toml.replace("symbols = [\" ethusdt \", \"BTCUSDT\", \"\"]", "symbols = []")
        } else {
            toml
        };
        assert!(Config::from_toml_str(&toml).is_err(), "accepted: {}", toml);
    }

    let bad_interval = format!("{}\n[poller]\ninterval = \"fast\"\n", MINIMAL);
    assert!(Config::from_toml_str(&bad_interval).is_err());

    let bad_fee = format!("{}\n[execution]\nfee_rate = 1.5\n", MINIMAL);
    assert!(Config::from_toml_str(&bad_fee).is_err());
}

#[test]
fn live_mode_requires_credentials() {
    let dry = Config::from_toml_str(MINIMAL).unwrap();
    assert!(dry.require_credentials().is_ok());

    let live_toml = format!("{}\n[execution]\ndry_run = false\n", MINIMAL);
    let mut live = Config::from_toml_str(&live_toml).unwrap();
    assert!(live.require_credentials().is_err());

    live.binance.api_key = "key".to_string();
    live.binance.api_secret = "secret".to_string();
    assert!(live.require_credentials().is_ok());
}

#[test]
fn load_reads_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bot.toml");
    std::fs::write(&path, MINIMAL).unwrap();
    let config = Config::load(&path).unwrap();
    assert_eq!(config.binance.symbol, "btcusdt");

    assert!(Config::load(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn shipped_default_config_is_valid() {
    let config = Config::load(std::path::Path::new("config/default.toml")).unwrap();
    assert!(config.execution.dry_run);
    assert!(matches!(
        config.accumulator.to_config().unwrap().contribution,
        Contribution::Leveraged { .. }
    ));
}
