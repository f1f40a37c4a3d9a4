use crate::{
    errors::Result,
    models::{
        AccountInformation, Deal, Order, Position, SymbolPrice, SymbolSpecification,
        SynchronizationEnvelope, SynchronizationPacket, UpdatePacket,
    },
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use log::{debug, error};
use std::{panic::AssertUnwindSafe, sync::Arc};

/// Receiver of terminal state changes for one account. Every method defaults to a
/// no-op, so implementors override only what they care about.
#[async_trait]
pub trait SynchronizationListener: Send + Sync {
    /// The server authenticated the account's terminal; a fresh synchronization follows.
    async fn on_connected(&self) -> Result<()> {
        Ok(())
    }

    async fn on_disconnected(&self) -> Result<()> {
        Ok(())
    }

    async fn on_broker_connection_status_changed(&self, _connected: bool) -> Result<()> {
        Ok(())
    }

    async fn on_account_information_updated(
        &self,
        _account_information: &AccountInformation,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_position_updated(&self, _position: &Position) -> Result<()> {
        Ok(())
    }

    async fn on_position_removed(&self, _position_id: &str) -> Result<()> {
        Ok(())
    }

    async fn on_order_updated(&self, _order: &Order) -> Result<()> {
        Ok(())
    }

    async fn on_order_completed(&self, _order_id: &str) -> Result<()> {
        Ok(())
    }

    async fn on_history_order_added(&self, _history_order: &Order) -> Result<()> {
        Ok(())
    }

    async fn on_deal_added(&self, _deal: &Deal) -> Result<()> {
        Ok(())
    }

    async fn on_order_synchronization_finished(&self) -> Result<()> {
        Ok(())
    }

    async fn on_deal_synchronization_finished(&self) -> Result<()> {
        Ok(())
    }

    async fn on_symbol_specification_updated(
        &self,
        _specification: &SymbolSpecification,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_symbol_price_updated(&self, _price: &SymbolPrice) -> Result<()> {
        Ok(())
    }
}

/// Notified after the transport re-established a dropped session.
#[async_trait]
pub trait ReconnectListener: Send + Sync {
    async fn on_reconnected(&self) -> Result<()>;
}

pub(crate) fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Runs one listener callback, logging its error or panic instead of propagating it.
pub(crate) async fn guarded<F>(account_id: &str, event: &str, fut: F)
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            "{}: failed to notify listener about {} event: {}",
            account_id, event, e
        ),
        Err(_) => error!(
            "{}: listener panicked while handling {} event",
            account_id, event
        ),
    }
}

/// Ordered listener lists keyed by account id.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, Vec<Arc<dyn SynchronizationListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, account_id: &str, listener: Arc<dyn SynchronizationListener>) {
        self.listeners
            .entry(account_id.to_string())
            .or_default()
            .push(listener);
    }

    /// Removes the listener by identity. Returns whether it was registered.
    pub fn unregister(&self, account_id: &str, listener: &Arc<dyn SynchronizationListener>) -> bool {
        let mut removed = false;
        if let Some(mut listeners) = self.listeners.get_mut(account_id) {
            let before = listeners.len();
            listeners.retain(|l| !same_listener(l, listener));
            removed = listeners.len() != before;
        }
        self.listeners.remove_if(account_id, |_, listeners| listeners.is_empty());
        removed
    }

    pub fn listeners(&self, account_id: &str) -> Vec<Arc<dyn SynchronizationListener>> {
        self.listeners
            .get(account_id)
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers one envelope to the account's listeners in registration order.
    /// Collection payloads are delivered element by element; every element reaches all
    /// listeners before the next one is delivered.
    pub async fn dispatch(&self, envelope: SynchronizationEnvelope) {
        let listeners = self.listeners(&envelope.account_id);
        if listeners.is_empty() {
            debug!(
                "{}: no listeners for {} packet",
                envelope.account_id,
                envelope.packet.kind()
            );
            return;
        }
        let id = envelope.account_id.as_str();
        match &envelope.packet {
            SynchronizationPacket::Authenticated => {
                for l in &listeners {
                    guarded(id, "connected", l.on_connected()).await;
                }
            }
            SynchronizationPacket::Disconnected => {
                for l in &listeners {
                    guarded(id, "disconnected", l.on_disconnected()).await;
                }
            }
            SynchronizationPacket::Status { connected } => {
                for l in &listeners {
                    guarded(
                        id,
                        "brokerConnectionStatusChanged",
                        l.on_broker_connection_status_changed(*connected),
                    )
                    .await;
                }
            }
            SynchronizationPacket::AccountInformation {
                account_information,
            } => {
                if let Some(account_information) = account_information {
                    notify_account_information(id, &listeners, account_information).await;
                }
            }
            SynchronizationPacket::Positions { positions } => {
                notify_positions(id, &listeners, positions).await;
            }
            SynchronizationPacket::Orders { orders } => {
                notify_orders(id, &listeners, orders).await;
            }
            SynchronizationPacket::HistoryOrders { history_orders } => {
                notify_history_orders(id, &listeners, history_orders).await;
            }
            SynchronizationPacket::Deals { deals } => {
                notify_deals(id, &listeners, deals).await;
            }
            SynchronizationPacket::Specifications { specifications } => {
                for specification in specifications {
                    for l in &listeners {
                        guarded(
                            id,
                            "symbolSpecificationUpdated",
                            l.on_symbol_specification_updated(specification),
                        )
                        .await;
                    }
                }
            }
            SynchronizationPacket::Prices { prices } => {
                for price in prices {
                    for l in &listeners {
                        guarded(id, "symbolPriceUpdated", l.on_symbol_price_updated(price)).await;
                    }
                }
            }
            SynchronizationPacket::OrderSynchronizationFinished => {
                for l in &listeners {
                    guarded(
                        id,
                        "orderSynchronizationFinished",
                        l.on_order_synchronization_finished(),
                    )
                    .await;
                }
            }
            SynchronizationPacket::DealSynchronizationFinished => {
                for l in &listeners {
                    guarded(
                        id,
                        "dealSynchronizationFinished",
                        l.on_deal_synchronization_finished(),
                    )
                    .await;
                }
            }
            SynchronizationPacket::Update(update) => {
                dispatch_update(id, &listeners, update).await;
            }
        }
    }
}

// Same order as the wire layout; later sub-changes may rely on earlier ones.
async fn dispatch_update(
    id: &str,
    listeners: &[Arc<dyn SynchronizationListener>],
    update: &UpdatePacket,
) {
    if let Some(account_information) = update.account_information.as_ref() {
        notify_account_information(id, listeners, account_information).await;
    }
    notify_positions(id, listeners, &update.updated_positions).await;
    for position_id in &update.removed_position_ids {
        for l in listeners {
            guarded(id, "positionRemoved", l.on_position_removed(position_id)).await;
        }
    }
    notify_orders(id, listeners, &update.updated_orders).await;
    for order_id in &update.completed_order_ids {
        for l in listeners {
            guarded(id, "orderCompleted", l.on_order_completed(order_id)).await;
        }
    }
    notify_history_orders(id, listeners, &update.history_orders).await;
    notify_deals(id, listeners, &update.deals).await;
}

async fn notify_account_information(
    id: &str,
    listeners: &[Arc<dyn SynchronizationListener>],
    account_information: &AccountInformation,
) {
    for l in listeners {
        guarded(
            id,
            "accountInformationUpdated",
            l.on_account_information_updated(account_information),
        )
        .await;
    }
}

async fn notify_positions(
    id: &str,
    listeners: &[Arc<dyn SynchronizationListener>],
    positions: &[Position],
) {
    for position in positions {
        for l in listeners {
            guarded(id, "positionUpdated", l.on_position_updated(position)).await;
        }
    }
}

async fn notify_orders(id: &str, listeners: &[Arc<dyn SynchronizationListener>], orders: &[Order]) {
    for order in orders {
        for l in listeners {
            guarded(id, "orderUpdated", l.on_order_updated(order)).await;
        }
    }
}

async fn notify_history_orders(
    id: &str,
    listeners: &[Arc<dyn SynchronizationListener>],
    history_orders: &[Order],
) {
    for history_order in history_orders {
        for l in listeners {
            guarded(id, "historyOrderAdded", l.on_history_order_added(history_order)).await;
        }
    }
}

async fn notify_deals(id: &str, listeners: &[Arc<dyn SynchronizationListener>], deals: &[Deal]) {
    for deal in deals {
        for l in listeners {
            guarded(id, "dealAdded", l.on_deal_added(deal)).await;
        }
    }
}
