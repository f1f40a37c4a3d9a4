use crate::{
    errors::Result,
    history::{HistoryStorage, merge_insert},
    listener::SynchronizationListener,
    models::{Deal, Order},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;

/// In-memory history storage. Records are kept ascending by (time, id).
#[derive(Default)]
pub struct MemoryHistoryStorage {
    history_orders: RwLock<Vec<Order>>,
    deals: RwLock<Vec<Deal>>,
    order_synchronization_finished: AtomicBool,
    deal_synchronization_finished: AtomicBool,
}

impl MemoryHistoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_orders(&self) -> Vec<Order> {
        self.history_orders.read().await.clone()
    }

    pub async fn deals(&self) -> Vec<Deal> {
        self.deals.read().await.clone()
    }

    /// Drops all stored history. The next synchronization starts from the epoch.
    pub async fn reset(&self) {
        self.history_orders.write().await.clear();
        self.deals.write().await.clear();
        self.order_synchronization_finished
            .store(false, Ordering::SeqCst);
        self.deal_synchronization_finished
            .store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SynchronizationListener for MemoryHistoryStorage {
    async fn on_connected(&self) -> Result<()> {
        self.order_synchronization_finished
            .store(false, Ordering::SeqCst);
        self.deal_synchronization_finished
            .store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn on_history_order_added(&self, history_order: &Order) -> Result<()> {
        let mut history_orders = self.history_orders.write().await;
        merge_insert(&mut history_orders, history_order.clone());
        Ok(())
    }

    async fn on_deal_added(&self, deal: &Deal) -> Result<()> {
        let mut deals = self.deals.write().await;
        merge_insert(&mut deals, deal.clone());
        Ok(())
    }

    async fn on_order_synchronization_finished(&self) -> Result<()> {
        self.order_synchronization_finished
            .store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn on_deal_synchronization_finished(&self) -> Result<()> {
        self.deal_synchronization_finished
            .store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl HistoryStorage for MemoryHistoryStorage {
    async fn last_history_order_time(&self) -> DateTime<Utc> {
        self.history_orders
            .read()
            .await
            .last()
            .and_then(|o| o.done_time)
            .unwrap_or_else(time::epoch)
    }

    async fn last_deal_time(&self) -> DateTime<Utc> {
        self.deals
            .read()
            .await
            .last()
            .and_then(|d| d.time)
            .unwrap_or_else(time::epoch)
    }

    fn order_synchronization_finished(&self) -> bool {
        self.order_synchronization_finished.load(Ordering::SeqCst)
    }

    fn deal_synchronization_finished(&self) -> bool {
        self.deal_synchronization_finished.load(Ordering::SeqCst)
    }

    fn as_listener(self: Arc<Self>) -> Arc<dyn SynchronizationListener> {
        self
    }
}
