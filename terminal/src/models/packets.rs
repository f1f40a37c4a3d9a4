use crate::{
    errors::{Result, TerminalError},
    models::{AccountInformation, Deal, Order, Position, SymbolPrice, SymbolSpecification},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of an "update" envelope. Sub-changes are applied in field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_information: Option<AccountInformation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_positions: Vec<Position>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_position_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_orders: Vec<Order>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_order_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history_orders: Vec<Order>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SynchronizationPacket {
    Authenticated,
    Disconnected,
    Status {
        #[serde(default)]
        connected: bool,
    },
    AccountInformation {
        account_information: Option<AccountInformation>,
    },
    Positions {
        #[serde(default)]
        positions: Vec<Position>,
    },
    Orders {
        #[serde(default)]
        orders: Vec<Order>,
    },
    HistoryOrders {
        #[serde(default)]
        history_orders: Vec<Order>,
    },
    Deals {
        #[serde(default)]
        deals: Vec<Deal>,
    },
    Specifications {
        #[serde(default)]
        specifications: Vec<SymbolSpecification>,
    },
    Prices {
        #[serde(default)]
        prices: Vec<SymbolPrice>,
    },
    OrderSynchronizationFinished,
    DealSynchronizationFinished,
    Update(UpdatePacket),
}

impl SynchronizationPacket {
    pub fn kind(&self) -> &'static str {
        match self {
            SynchronizationPacket::Authenticated => "authenticated",
            SynchronizationPacket::Disconnected => "disconnected",
            SynchronizationPacket::Status { .. } => "status",
            SynchronizationPacket::AccountInformation { .. } => "accountInformation",
            SynchronizationPacket::Positions { .. } => "positions",
            SynchronizationPacket::Orders { .. } => "orders",
            SynchronizationPacket::HistoryOrders { .. } => "historyOrders",
            SynchronizationPacket::Deals { .. } => "deals",
            SynchronizationPacket::Specifications { .. } => "specifications",
            SynchronizationPacket::Prices { .. } => "prices",
            SynchronizationPacket::OrderSynchronizationFinished => "orderSynchronizationFinished",
            SynchronizationPacket::DealSynchronizationFinished => "dealSynchronizationFinished",
            SynchronizationPacket::Update(_) => "update",
        }
    }
}

/// A state-change notification addressed to one account.
#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizationEnvelope {
    pub account_id: String,
    pub packet: SynchronizationPacket,
}

impl SynchronizationEnvelope {
    pub fn new<S: Into<String>>(account_id: S, packet: SynchronizationPacket) -> Self {
        Self {
            account_id: account_id.into(),
            packet,
        }
    }

    pub fn decode(value: Value) -> Result<Self> {
        let account_id = value
            .get("accountId")
            .and_then(Value::as_str)
            .ok_or_else(|| TerminalError::decode("synchronization envelope without accountId"))?
            .to_string();
        let packet = serde_json::from_value::<SynchronizationPacket>(value)?;
        Ok(Self { account_id, packet })
    }

    /// Wire form, `{type, accountId, ...payload}`.
    pub fn encode(&self) -> Result<Value> {
        let mut value = serde_json::to_value(&self.packet)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("accountId".to_string(), Value::String(self.account_id.clone()));
        }
        Ok(value)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeHeader {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

/// Inbound frame sorted by role.
#[derive(Debug)]
pub enum InboundMessage {
    Response {
        request_id: String,
        body: Value,
    },
    Error {
        request_id: Option<String>,
        error: TerminalError,
    },
    Synchronization(Value),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(TerminalError::decode(format!("unexpected frame: {}", text)));
        }
        let header = EnvelopeHeader::deserialize(&value)?;
        if let Some(code) = header.error {
            return Ok(InboundMessage::Error {
                request_id: header.request_id,
                error: TerminalError::from_wire(
                    &code,
                    header.message.unwrap_or_default(),
                    header.details,
                ),
            });
        }
        if header.kind.as_deref() == Some("response") {
            let request_id = header
                .request_id
                .ok_or_else(|| TerminalError::decode("response without requestId"))?;
            return Ok(InboundMessage::Response {
                request_id,
                body: value,
            });
        }
        Ok(InboundMessage::Synchronization(value))
    }
}
