use serde::Deserialize;

/// Deserialize Binance string-encoded numbers to f64.
pub fn string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

pub fn string_or_number_to_f64_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(0.0),
        serde_json::Value::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("invalid number")),
        _ => Err(serde::de::Error::custom("invalid numeric value")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTimeResponse {
    pub server_time: u64,
}

/// GET /fapi/v1/ticker/price
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTickerPrice {
    pub symbol: String,
    #[serde(deserialize_with = "string_to_f64")]
    pub price: f64,
    #[serde(default)]
    pub time: u64,
}

/// POST /fapi/v1/leverage
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceLeverageResponse {
    pub symbol: String,
    pub leverage: u32,
    #[serde(default, deserialize_with = "string_or_number_to_f64_default")]
    pub max_notional_value: f64,
}

/// Binance futures order response (POST /fapi/v1/order, RESULT-like fields).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFuturesOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    #[serde(default, deserialize_with = "string_or_number_to_f64_default")]
    pub orig_qty: f64,
    #[serde(default, deserialize_with = "string_or_number_to_f64_default")]
    pub executed_qty: f64,
    #[serde(default, deserialize_with = "string_or_number_to_f64_default")]
    pub avg_price: f64,
    pub status: String,
    pub r#type: String,
    pub side: String,
    #[serde(default)]
    pub reduce_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct BinanceApiErrorResponse {
    pub code: i64,
    pub msg: String,
}
