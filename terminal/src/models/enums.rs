use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionType {
    #[serde(rename = "POSITION_TYPE_BUY")]
    Buy,
    #[serde(rename = "POSITION_TYPE_SELL")]
    Sell,
}

impl PositionType {
    /// +1 for long positions, -1 for short ones.
    pub fn direction(&self) -> f64 {
        match self {
            PositionType::Buy => 1.0,
            PositionType::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "ORDER_TYPE_BUY")]
    Buy,
    #[serde(rename = "ORDER_TYPE_SELL")]
    Sell,
    #[serde(rename = "ORDER_TYPE_BUY_LIMIT")]
    BuyLimit,
    #[serde(rename = "ORDER_TYPE_SELL_LIMIT")]
    SellLimit,
    #[serde(rename = "ORDER_TYPE_BUY_STOP")]
    BuyStop,
    #[serde(rename = "ORDER_TYPE_SELL_STOP")]
    SellStop,
    #[serde(rename = "ORDER_TYPE_BUY_STOP_LIMIT")]
    BuyStopLimit,
    #[serde(rename = "ORDER_TYPE_SELL_STOP_LIMIT")]
    SellStopLimit,
    #[serde(rename = "ORDER_TYPE_CLOSE_BY")]
    CloseBy,
}

impl OrderType {
    pub fn is_buy(&self) -> bool {
        matches!(
            self,
            OrderType::Buy | OrderType::BuyLimit | OrderType::BuyStop | OrderType::BuyStopLimit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    #[serde(rename = "ORDER_STATE_STARTED")]
    Started,
    #[serde(rename = "ORDER_STATE_PLACED")]
    Placed,
    #[serde(rename = "ORDER_STATE_CANCELED")]
    Canceled,
    #[serde(rename = "ORDER_STATE_PARTIAL")]
    Partial,
    #[serde(rename = "ORDER_STATE_FILLED")]
    Filled,
    #[serde(rename = "ORDER_STATE_REJECTED")]
    Rejected,
    #[serde(rename = "ORDER_STATE_EXPIRED")]
    Expired,
    #[serde(rename = "ORDER_STATE_REQUEST_ADD")]
    RequestAdd,
    #[serde(rename = "ORDER_STATE_REQUEST_MODIFY")]
    RequestModify,
    #[serde(rename = "ORDER_STATE_REQUEST_CANCEL")]
    RequestCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealType {
    #[serde(rename = "DEAL_TYPE_BUY")]
    Buy,
    #[serde(rename = "DEAL_TYPE_SELL")]
    Sell,
    #[serde(rename = "DEAL_TYPE_BALANCE")]
    Balance,
    #[serde(rename = "DEAL_TYPE_CREDIT")]
    Credit,
    #[serde(rename = "DEAL_TYPE_CHARGE")]
    Charge,
    #[serde(rename = "DEAL_TYPE_CORRECTION")]
    Correction,
    #[serde(rename = "DEAL_TYPE_BONUS")]
    Bonus,
    #[serde(rename = "DEAL_TYPE_COMMISSION")]
    Commission,
    // dividends, taxes, agent fees and the rest of the broker-side operations
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealEntryType {
    #[serde(rename = "DEAL_ENTRY_IN")]
    In,
    #[serde(rename = "DEAL_ENTRY_OUT")]
    Out,
    #[serde(rename = "DEAL_ENTRY_INOUT")]
    InOut,
    #[serde(rename = "DEAL_ENTRY_OUT_BY")]
    OutBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeActionType {
    #[serde(rename = "ORDER_TYPE_BUY")]
    OrderTypeBuy,
    #[serde(rename = "ORDER_TYPE_SELL")]
    OrderTypeSell,
    #[serde(rename = "ORDER_TYPE_BUY_LIMIT")]
    OrderTypeBuyLimit,
    #[serde(rename = "ORDER_TYPE_SELL_LIMIT")]
    OrderTypeSellLimit,
    #[serde(rename = "ORDER_TYPE_BUY_STOP")]
    OrderTypeBuyStop,
    #[serde(rename = "ORDER_TYPE_SELL_STOP")]
    OrderTypeSellStop,
    #[serde(rename = "POSITION_MODIFY")]
    PositionModify,
    #[serde(rename = "POSITION_PARTIAL")]
    PositionPartial,
    #[serde(rename = "POSITION_CLOSE_ID")]
    PositionCloseId,
    #[serde(rename = "POSITIONS_CLOSE_SYMBOL")]
    PositionsCloseSymbol,
    #[serde(rename = "ORDER_MODIFY")]
    OrderModify,
    #[serde(rename = "ORDER_CANCEL")]
    OrderCancel,
}
