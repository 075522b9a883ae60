pub mod accumulator;
pub mod binance;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod price_source;
pub mod release_stats;
pub mod release_store;
pub mod runtime;
pub mod sink;
