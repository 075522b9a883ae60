use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::executor::OrderGateway;
use crate::model::order::{OrderAck, OrderSide, OrderStatus};
use crate::price_source::{PriceSource, PriceSourceError};

use super::types::{
    BinanceApiErrorResponse, BinanceFuturesOrderResponse, BinanceLeverageResponse,
    BinanceTickerPrice, ServerTimeResponse,
};

/// Binance error code for "No need to change position side."
const NO_NEED_TO_CHANGE_POSITION_SIDE: i64 = -4059;
/// Offsets beyond this usually mean the host clock needs resyncing.
const LARGE_TIME_OFFSET_MS: i64 = 5_000;

pub struct BinanceFuturesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    recv_window: u64,
    time_offset_ms: AtomicI64,
    // Simple rate limiter: request count in current minute window
    request_count: AtomicU64,
    window_start: std::sync::Mutex<Instant>,
}

impl BinanceFuturesClient {
    pub fn new(base_url: &str, api_key: &str, secret_key: &str, recv_window: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            recv_window,
            time_offset_ms: AtomicI64::new(0),
            request_count: AtomicU64::new(0),
            window_start: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    fn sign(&self, query: &str) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp_millis() + self.time_offset_ms();
        self.sign_at(query, timestamp)
    }

    fn sign_at(&self, query: &str, timestamp: i64) -> Result<String> {
        let full_query = if query.is_empty() {
            format!("recvWindow={}&timestamp={}", self.recv_window, timestamp)
        } else {
            format!(
                "{}&recvWindow={}&timestamp={}",
                query, self.recv_window, timestamp
            )
        };
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| AppError::Config(format!("HMAC key error: {}", e)))?;
        mac.update(full_query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}&signature={}", full_query, signature))
    }

    fn check_rate_limit(&self) {
        let Ok(mut start) = self.window_start.lock() else {
            return;
        };
        if start.elapsed().as_secs() >= 60 {
            *start = Instant::now();
            self.request_count.store(0, Ordering::Relaxed);
        }
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count > 1_920 {
            tracing::warn!(count, "Approaching rate limit (80% of 2400/min)");
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
                return Err(AppError::BinanceApi {
                    status: status.as_u16(),
                    code: err.code,
                    msg: err.msg,
                }
                .into());
            }
            return Err(anyhow::anyhow!("{} failed ({}): {}", what, status, body));
        }
        let body = resp
            .text()
            .await
            .map_err(AppError::from)
            .with_context(|| format!("{} body read failed", what))?;
        serde_json::from_str(&body)
            .map_err(AppError::from)
            .with_context(|| format!("{} returned unexpected payload", what))
    }

    async fn signed<T: DeserializeOwned>(&self, method: Method, path: &str, query: &str) -> Result<T> {
        self.check_rate_limit();
        let signed = self.sign(query)?;
        let url = format!("{}{}?{}", self.base_url, path, signed);
        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(AppError::from)
            .with_context(|| format!("{} HTTP failed", path))?;
        Self::decode(resp, path).await
    }

    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/fapi/v1/ping", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(AppError::from)
            .context("ping failed")?
            .error_for_status()
            .map_err(AppError::from)
            .context("ping returned error status")?;
        Ok(())
    }

    pub async fn server_time(&self) -> Result<u64> {
        let url = format!("{}/fapi/v1/time", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(AppError::from)
            .context("server_time failed")?;
        let time: ServerTimeResponse = Self::decode(resp, "server_time").await?;
        Ok(time.server_time)
    }

    /// Measure the exchange clock against ours and sign future requests with
    /// the difference.
    pub async fn sync_time(&self) -> Result<i64> {
        let server_time = self.server_time().await? as i64;
        let local_time = chrono::Utc::now().timestamp_millis();
        let offset = server_time - local_time;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        if offset.abs() > LARGE_TIME_OFFSET_MS {
            tracing::warn!(offset_ms = offset, "Large clock offset against Binance, resync the host clock");
        } else {
            tracing::info!(offset_ms = offset, "Server time synchronized");
        }
        Ok(offset)
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        self.check_rate_limit();
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(AppError::from)
            .context("ticker_price HTTP failed")?;
        let ticker: BinanceTickerPrice = Self::decode(resp, "ticker_price").await?;
        Ok(ticker.price)
    }

    pub async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<u32> {
        let query = format!("symbol={}&leverage={}", symbol, leverage);
        let resp: BinanceLeverageResponse = self
            .signed(Method::POST, "/fapi/v1/leverage", &query)
            .await?;
        tracing::info!(symbol = %resp.symbol, leverage = resp.leverage, "Leverage set");
        Ok(resp.leverage)
    }

    /// Switch the account to one-way position mode. Already being in one-way
    /// mode counts as success.
    pub async fn set_one_way_mode(&self) -> Result<()> {
        match self
            .signed::<serde_json::Value>(
                Method::POST,
                "/fapi/v1/positionSide/dual",
                "dualSidePosition=false",
            )
            .await
        {
            Ok(_) => {
                tracing::info!("Position mode set to one-way");
                Ok(())
            }
            Err(e) if is_no_change_position_side(&e) => {
                tracing::info!("Position mode already one-way");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
        client_order_id: &str,
    ) -> Result<BinanceFuturesOrderResponse> {
        let mut query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=RESULT",
            symbol,
            side.as_binance_str(),
            format_quantity(quantity),
            client_order_id,
        );
        if reduce_only {
            query.push_str("&reduceOnly=true");
        }

        tracing::info!(
            symbol,
            side = %side,
            quantity,
            reduce_only,
            client_order_id,
            "Placing futures market order"
        );

        let order: BinanceFuturesOrderResponse = self
            .signed(Method::POST, "/fapi/v1/order", &query)
            .await
            .context("place_market_order failed")?;
        tracing::info!(
            order_id = order.order_id,
            status = %order.status,
            client_order_id = %order.client_order_id,
            "Order response received"
        );
        Ok(order)
    }
}

/// Disconnected (-1001), too many requests (-1003) and timeout (-1007).
fn is_transient_api_code(code: i64) -> bool {
    matches!(code, -1001 | -1003 | -1007)
}

fn is_no_change_position_side(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<AppError>(),
        Some(AppError::BinanceApi { code, .. }) if *code == NO_NEED_TO_CHANGE_POSITION_SIDE
    )
}

/// Only a 4xx answer carrying a non-transient Binance code is a rejection.
/// Server errors, transport failures and bad payloads may clear up on the
/// next poll.
fn price_error(e: &anyhow::Error) -> PriceSourceError {
    match e.downcast_ref::<AppError>() {
        Some(AppError::BinanceApi { status, code, msg })
            if *status < 500 && !is_transient_api_code(*code) =>
        {
            PriceSourceError::Rejected {
                code: *code,
                msg: msg.clone(),
            }
        }
        _ => PriceSourceError::Unavailable(format!("{:#}", e)),
    }
}

/// Render a quantity without float noise such as `0.30000000000000004`.
pub fn format_quantity(quantity: f64) -> String {
    let s = format!("{:.8}", quantity);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[async_trait]
impl PriceSource for BinanceFuturesClient {
    async fn current_price(&self, symbol: &str) -> Result<f64, PriceSourceError> {
        self.ticker_price(symbol).await.map_err(|e| price_error(&e))
    }
}

#[async_trait]
impl OrderGateway for BinanceFuturesClient {
    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
        client_order_id: &str,
    ) -> Result<OrderAck> {
        let resp = self
            .place_market_order(symbol, side, quantity, reduce_only, client_order_id)
            .await?;
        Ok(OrderAck {
            order_id: resp.order_id,
            client_order_id: resp.client_order_id,
            side,
            status: OrderStatus::from_binance_str(&resp.status),
            executed_qty: resp.executed_qty,
            avg_price: resp.avg_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signing_produces_hex_signature() {
        let client = BinanceFuturesClient::new(
            "https://testnet.binancefuture.com",
            "test_key",
            "test_secret",
            5000,
        );
        let signed = client.sign("symbol=BTCUSDT&side=BUY").unwrap();
        assert!(signed.contains("symbol=BTCUSDT&side=BUY"));
        assert!(signed.contains("recvWindow=5000"));
        assert!(signed.contains("timestamp="));
        assert!(signed.contains("&signature="));

        // Signature should be 64-char hex (SHA256)
        let sig = signed.split("&signature=").nth(1).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signing_empty_query_has_no_leading_ampersand() {
        let client = BinanceFuturesClient::new("https://x", "k", "s", 5000);
        let signed = client.sign("").unwrap();
        assert!(signed.starts_with("recvWindow=5000&timestamp="));
    }

    #[test]
    fn signature_matches_binance_reference_request() {
        // Key, parameters and signature from the Binance API signing example.
        let client = BinanceFuturesClient::new(
            "https://x",
            "k",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            5000,
        );
        let signed = client
            .sign_at(
                "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1",
                1_499_827_319_559,
            )
            .unwrap();
        assert_eq!(
            signed,
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
             &recvWindow=5000&timestamp=1499827319559\
             &signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    fn api_error(status: u16, code: i64) -> anyhow::Error {
        anyhow::Error::new(AppError::BinanceApi {
            status,
            code,
            msg: "from exchange".to_string(),
        })
        .context("ticker_price failed")
    }

    #[test]
    fn one_way_mode_already_set_is_recognised() {
        assert!(is_no_change_position_side(&api_error(400, -4059)));
        assert!(!is_no_change_position_side(&api_error(400, -2015)));
        assert!(!is_no_change_position_side(&anyhow::anyhow!("connection reset")));
    }

    #[test]
    fn transient_codes_and_server_errors_are_unavailable() {
        for code in [-1001, -1003, -1007] {
            assert!(price_error(&api_error(400, code)).is_transient());
        }
        assert!(price_error(&api_error(503, -1000)).is_transient());
        assert!(price_error(&anyhow::anyhow!("connection reset")).is_transient());
    }

    #[test]
    fn client_errors_with_binance_code_are_rejected() {
        assert_eq!(
            price_error(&api_error(400, -1121)),
            PriceSourceError::Rejected {
                code: -1121,
                msg: "from exchange".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn connection_failure_is_http_error_and_unavailable() {
        // Nothing listens on port 1.
        let client = BinanceFuturesClient::new("http://127.0.0.1:1", "k", "s", 5000);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Http(_))));
        assert!(matches!(
            client.current_price("BTCUSDT").await,
            Err(PriceSourceError::Unavailable(_))
        ));
    }

    #[test]
    fn quantity_formatting_strips_float_noise() {
        assert_eq!(format_quantity(0.1 + 0.2), "0.3");
        assert_eq!(format_quantity(0.002), "0.002");
        assert_eq!(format_quantity(3.0), "3");
        assert_eq!(format_quantity(0.0), "0");
    }
}
