use crate::models::TradeActionType;
use serde::{Deserialize, Serialize};

/// Result codes that mean the trade went through.
pub const TRADE_SUCCESS_CODES: [&str; 5] = [
    "ERR_NO_ERROR",
    "TRADE_RETCODE_PLACED",
    "TRADE_RETCODE_DONE",
    "TRADE_RETCODE_DONE_PARTIAL",
    "TRADE_RETCODE_NO_CHANGES",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub action_type: TradeActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl TradeRequest {
    pub fn new(action_type: TradeActionType) -> Self {
        Self {
            action_type,
            symbol: None,
            volume: None,
            open_price: None,
            stop_loss: None,
            take_profit: None,
            order_id: None,
            position_id: None,
            comment: None,
            client_id: None,
        }
    }

    pub fn market_buy(symbol: &str, volume: f64) -> Self {
        Self::new(TradeActionType::OrderTypeBuy).with_symbol_volume(symbol, volume)
    }

    pub fn market_sell(symbol: &str, volume: f64) -> Self {
        Self::new(TradeActionType::OrderTypeSell).with_symbol_volume(symbol, volume)
    }

    pub fn limit_buy(symbol: &str, volume: f64, open_price: f64) -> Self {
        let mut req =
            Self::new(TradeActionType::OrderTypeBuyLimit).with_symbol_volume(symbol, volume);
        req.open_price = Some(open_price);
        req
    }

    pub fn limit_sell(symbol: &str, volume: f64, open_price: f64) -> Self {
        let mut req =
            Self::new(TradeActionType::OrderTypeSellLimit).with_symbol_volume(symbol, volume);
        req.open_price = Some(open_price);
        req
    }

    pub fn stop_buy(symbol: &str, volume: f64, open_price: f64) -> Self {
        let mut req =
            Self::new(TradeActionType::OrderTypeBuyStop).with_symbol_volume(symbol, volume);
        req.open_price = Some(open_price);
        req
    }

    pub fn stop_sell(symbol: &str, volume: f64, open_price: f64) -> Self {
        let mut req =
            Self::new(TradeActionType::OrderTypeSellStop).with_symbol_volume(symbol, volume);
        req.open_price = Some(open_price);
        req
    }

    pub fn modify_position(position_id: &str, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        let mut req = Self::new(TradeActionType::PositionModify);
        req.position_id = Some(position_id.to_string());
        req.stop_loss = stop_loss;
        req.take_profit = take_profit;
        req
    }

    pub fn close_position_partially(position_id: &str, volume: f64) -> Self {
        let mut req = Self::new(TradeActionType::PositionPartial);
        req.position_id = Some(position_id.to_string());
        req.volume = Some(volume);
        req
    }

    pub fn close_position(position_id: &str) -> Self {
        let mut req = Self::new(TradeActionType::PositionCloseId);
        req.position_id = Some(position_id.to_string());
        req
    }

    pub fn close_positions_by_symbol(symbol: &str) -> Self {
        let mut req = Self::new(TradeActionType::PositionsCloseSymbol);
        req.symbol = Some(symbol.to_string());
        req
    }

    pub fn modify_order(order_id: &str, open_price: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        let mut req = Self::new(TradeActionType::OrderModify);
        req.order_id = Some(order_id.to_string());
        req.open_price = Some(open_price);
        req.stop_loss = stop_loss;
        req.take_profit = take_profit;
        req
    }

    pub fn cancel_order(order_id: &str) -> Self {
        let mut req = Self::new(TradeActionType::OrderCancel);
        req.order_id = Some(order_id.to_string());
        req
    }

    pub fn with_stops(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    fn with_symbol_volume(mut self, symbol: &str, volume: f64) -> Self {
        self.symbol = Some(symbol.to_string());
        self.volume = Some(volume);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub numeric_code: i64,
    pub string_code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
}

impl TradeResponse {
    pub fn is_success(&self) -> bool {
        TRADE_SUCCESS_CODES.contains(&self.string_code.as_str())
    }
}
