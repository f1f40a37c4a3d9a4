use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSpecification {
    pub symbol: String,
    pub tick_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_step: Option<f64>,
}

/// Latest quote of a symbol. `profit_tick_value`/`loss_tick_value` convert one tick of
/// movement into account currency for winning and losing positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolPrice {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub profit_tick_value: f64,
    pub loss_tick_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}
