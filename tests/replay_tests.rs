use std::io::Cursor;

use accrual_bot::accumulator::AccumulatorConfig;
use accrual_bot::model::release::{Direction, ReleaseEvent};
use accrual_bot::runtime::{replay_file, replay_reader};

const TICKS: &str = "\
symbol,timestamp_ms,price
BTCUSDT,1000,100.0
ETHUSDT,1000,50.0
BTCUSDT,2000,103.0
ETHUSDT,2000,58.0
BTCUSDT,3000,95.0
ETHUSDT,3000,0
btcusdt , 4000 , 96.5
";

#[test]
fn replay_interleaved_symbols_keeps_them_apart() {
    let mut sink: Vec<ReleaseEvent> = Vec::new();
    let report = replay_reader(Cursor::new(TICKS), AccumulatorConfig::new(10.0), &mut sink).unwrap();

    assert_eq!(report.observations, 6);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.releases, sink);
    assert_eq!(
        sink,
        vec![ReleaseEvent {
            symbol: "BTCUSDT".to_string(),
            amount: 11.0,
            trade_count: 2,
            price: 95.0,
            direction: Direction::Down,
            timestamp_ms: 3000,
        }]
    );

    // ETH moved 8, below threshold; the rejected zero price left it alone.
    let eth = report.book.get("ETHUSDT").unwrap().state();
    assert!((eth.accumulated() - 8.0).abs() < f64::EPSILON);
    assert_eq!(eth.previous_price(), Some(58.0));

    let btc = report.book.get("BTCUSDT").unwrap().state();
    assert!((btc.accumulated() - 1.5).abs() < f64::EPSILON);
}

#[test]
fn malformed_row_aborts_replay() {
    let data = "symbol,timestamp_ms,price\nBTCUSDT,1,abc\n";
    let mut sink: Vec<ReleaseEvent> = Vec::new();
    let err = replay_reader(Cursor::new(data), AccumulatorConfig::new(1.0), &mut sink).unwrap_err();
    assert!(format!("{:#}", err).contains("row 2"));
}

#[test]
fn replay_rejects_invalid_config() {
    let mut sink: Vec<ReleaseEvent> = Vec::new();
    assert!(replay_reader(Cursor::new(TICKS), AccumulatorConfig::new(-1.0), &mut sink).is_err());
}

#[test]
fn replay_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticks.csv");
    std::fs::write(&path, TICKS).unwrap();

    let mut sink: Vec<ReleaseEvent> = Vec::new();
    let report = replay_file(&path, AccumulatorConfig::new(5.0), &mut sink).unwrap();
    // ETH 50 -> 58 now clears the lower threshold too.
    assert_eq!(report.releases.len(), 2);
    assert_eq!(report.book.symbols(), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);

    assert!(replay_file(&dir.path().join("missing.csv"), AccumulatorConfig::new(5.0), &mut sink).is_err());
}
