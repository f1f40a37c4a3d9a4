use crate::models::{
    AccountInformation, Deal, Order, Position, SymbolPrice, SymbolSpecification,
};
use serde_json::{Value, json};

pub(crate) fn account_information(balance: f64, equity: f64) -> AccountInformation {
    serde_json::from_value(json!({
        "platform": "mt5",
        "broker": "True ECN Trading Ltd",
        "currency": "USD",
        "server": "ICMarketsSC-Demo",
        "balance": balance,
        "equity": equity,
        "margin": 0.0,
        "freeMargin": equity,
        "leverage": 100.0,
    }))
    .unwrap()
}

pub(crate) fn position(id: &str, symbol: &str, position_type: &str) -> Position {
    serde_json::from_value(json!({
        "id": id,
        "type": position_type,
        "symbol": symbol,
        "magic": 1000,
        "time": "2020-04-15T02:45:06.521Z",
        "updateTime": "2020-04-15T02:45:06.521Z",
        "openPrice": 8.0,
        "currentPrice": 9.0,
        "currentTickValue": 0.5,
        "volume": 2.0,
        "swap": 0.0,
        "profit": 100.0,
        "commission": 0.0,
    }))
    .unwrap()
}

pub(crate) fn order(id: &str, symbol: &str, order_type: &str) -> Order {
    serde_json::from_value(json!({
        "id": id,
        "type": order_type,
        "state": "ORDER_STATE_PLACED",
        "symbol": symbol,
        "magic": 123456,
        "time": "2020-04-20T08:38:58.270Z",
        "openPrice": 1.03,
        "currentPrice": 1.05206,
        "volume": 0.01,
        "currentVolume": 0.01,
    }))
    .unwrap()
}

pub(crate) fn history_order(id: &str, done_time: Option<&str>, order_type: &str) -> Order {
    let mut value = json!({
        "id": id,
        "type": order_type,
        "state": "ORDER_STATE_FILLED",
        "symbol": "AUDNZD",
        "time": "2020-04-15T02:45:06.260Z",
        "openPrice": 1.0,
        "volume": 0.07,
        "currentVolume": 0.0,
        "positionId": "46214692",
    });
    if let Some(done_time) = done_time {
        value["doneTime"] = Value::String(done_time.to_string());
    }
    serde_json::from_value(value).unwrap()
}

pub(crate) fn deal(id: &str, time: Option<&str>, entry_type: &str) -> Deal {
    let mut value = json!({
        "id": id,
        "type": "DEAL_TYPE_SELL",
        "entryType": entry_type,
        "symbol": "AUDNZD",
        "magic": 1000,
        "volume": 0.07,
        "price": 1.0,
        "commission": -0.25,
        "swap": 0.0,
        "profit": 0.0,
        "positionId": "46214692",
        "orderId": "46214692",
    });
    if let Some(time) = time {
        value["time"] = Value::String(time.to_string());
    }
    serde_json::from_value(value).unwrap()
}

pub(crate) fn specification(symbol: &str, tick_size: f64) -> SymbolSpecification {
    SymbolSpecification {
        symbol: symbol.to_string(),
        tick_size,
        min_volume: Some(0.01),
        max_volume: Some(200.0),
        volume_step: Some(0.01),
    }
}

pub(crate) fn price(symbol: &str, bid: f64, ask: f64) -> SymbolPrice {
    SymbolPrice {
        symbol: symbol.to_string(),
        bid,
        ask,
        profit_tick_value: 0.5,
        loss_tick_value: 0.5,
        time: None,
    }
}
