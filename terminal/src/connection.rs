use crate::{
    client::TerminalClient,
    config::TerminalStateConfig,
    errors::Result,
    history::{HistoryStorage, MemoryHistoryStorage},
    listener::{ReconnectListener, SynchronizationListener},
    models::{
        AccountInformation, DealsResponse, HistoryOrdersResponse, Order, Position, SymbolPrice,
        SymbolSpecification, TradeRequest, TradeResponse,
    },
    terminal_state::TerminalState,
    utils::wait_until,
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use time::LatencyGuard;

/// Whether the account's terminal state is replicated locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronizationMode {
    /// State is kept on the server only; no local replica is built.
    Automatic,
    /// State and history are replicated into a local `TerminalState` and `HistoryStorage`.
    #[default]
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronizationState {
    Unsynchronized,
    Synchronizing,
    Synchronized,
}

#[derive(Default)]
pub struct ConnectionOptions {
    pub mode: SynchronizationMode,
    /// Store to replicate history into. A `MemoryHistoryStorage` is created when absent.
    pub history_storage: Option<Arc<dyn HistoryStorage>>,
    pub state_config: TerminalStateConfig,
}

/// Binds one account to a shared `TerminalClient`.
///
/// In `User` mode the connection owns a `TerminalState` and a `HistoryStorage` and
/// registers itself, the state and the storage as the account's listeners, in that
/// order. Each time the server reports the terminal authenticated, a synchronization
/// is requested starting from the storage's watermarks; the account counts as
/// synchronized once deal synchronization finishes.
pub struct TerminalConnection {
    client: Arc<TerminalClient>,
    account_id: String,
    mode: SynchronizationMode,
    terminal_state: Option<Arc<TerminalState>>,
    history_storage: Option<Arc<dyn HistoryStorage>>,
    state: ArcSwap<SynchronizationState>,
    closed: AtomicBool,
}

impl TerminalConnection {
    pub fn new(
        client: Arc<TerminalClient>,
        account_id: &str,
        options: ConnectionOptions,
    ) -> Arc<Self> {
        let (terminal_state, history_storage) = match options.mode {
            SynchronizationMode::User => {
                let history_storage = options
                    .history_storage
                    .unwrap_or_else(|| Arc::new(MemoryHistoryStorage::new()));
                (
                    Some(Arc::new(TerminalState::new(options.state_config))),
                    Some(history_storage),
                )
            }
            SynchronizationMode::Automatic => (None, None),
        };

        let connection = Arc::new(Self {
            client: client.clone(),
            account_id: account_id.to_string(),
            mode: options.mode,
            terminal_state,
            history_storage,
            state: ArcSwap::from_pointee(SynchronizationState::Unsynchronized),
            closed: AtomicBool::new(false),
        });

        for listener in connection.replication_listeners() {
            client.add_synchronization_listener(account_id, listener);
        }
        client.add_reconnect_listener(connection.clone());
        connection
    }

    // self, state and storage, in registration order
    fn replication_listeners(self: &Arc<Self>) -> Vec<Arc<dyn SynchronizationListener>> {
        let mut listeners: Vec<Arc<dyn SynchronizationListener>> = Vec::new();
        if let (Some(terminal_state), Some(history_storage)) =
            (self.terminal_state.as_ref(), self.history_storage.as_ref())
        {
            listeners.push(self.clone());
            listeners.push(terminal_state.clone());
            listeners.push(history_storage.clone().as_listener());
        }
        listeners
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn mode(&self) -> SynchronizationMode {
        self.mode
    }

    pub fn terminal_state(&self) -> Option<&Arc<TerminalState>> {
        self.terminal_state.as_ref()
    }

    pub fn history_storage(&self) -> Option<&Arc<dyn HistoryStorage>> {
        self.history_storage.as_ref()
    }

    pub fn synchronization_state(&self) -> SynchronizationState {
        **self.state.load()
    }

    fn set_state(&self, state: SynchronizationState) {
        self.state.store(Arc::new(state));
    }

    /// Accounts without a local replica are always synchronized.
    pub fn is_synchronized(&self) -> bool {
        match self.mode {
            SynchronizationMode::Automatic => true,
            SynchronizationMode::User => {
                self.synchronization_state() == SynchronizationState::Synchronized
            }
        }
    }

    /// Asks the server to stream this account. Connects the client when needed.
    pub async fn subscribe(&self) -> Result<()> {
        self.client.subscribe(&self.account_id).await
    }

    /// Polls every `poll_interval` until the account is synchronized. Fails with
    /// `TerminalError::Timeout` after `timeout`; synchronization itself goes on.
    pub async fn wait_synchronized(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let what = format!("synchronization of account {}", self.account_id);
        wait_until(timeout, poll_interval, &what, move || async move {
            self.is_synchronized()
        })
        .await
    }

    /// Unregisters the connection's listeners. Safe to call more than once.
    pub fn close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for listener in self.replication_listeners() {
            self.client
                .remove_synchronization_listener(&self.account_id, &listener);
        }
        let reconnect_listener: Arc<dyn ReconnectListener> = self.clone();
        self.client.remove_reconnect_listener(&reconnect_listener);
        self.set_state(SynchronizationState::Unsynchronized);
        info!("{}: connection closed", self.account_id);
    }

    pub async fn get_account_information(&self) -> Result<AccountInformation> {
        self.client.get_account_information(&self.account_id).await
    }

    pub async fn get_positions(&self) -> Result<Vec<Position>> {
        self.client.get_positions(&self.account_id).await
    }

    pub async fn get_position(&self, position_id: &str) -> Result<Position> {
        self.client.get_position(&self.account_id, position_id).await
    }

    pub async fn get_orders(&self) -> Result<Vec<Order>> {
        self.client.get_orders(&self.account_id).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.client.get_order(&self.account_id, order_id).await
    }

    pub async fn get_history_orders_by_ticket(&self, ticket: &str) -> Result<HistoryOrdersResponse> {
        self.client
            .get_history_orders_by_ticket(&self.account_id, ticket)
            .await
    }

    pub async fn get_history_orders_by_position(
        &self,
        position_id: &str,
    ) -> Result<HistoryOrdersResponse> {
        self.client
            .get_history_orders_by_position(&self.account_id, position_id)
            .await
    }

    pub async fn get_history_orders_by_time_range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<HistoryOrdersResponse> {
        self.client
            .get_history_orders_by_time_range(&self.account_id, start_time, end_time, offset, limit)
            .await
    }

    pub async fn get_deals_by_ticket(&self, ticket: &str) -> Result<DealsResponse> {
        self.client.get_deals_by_ticket(&self.account_id, ticket).await
    }

    pub async fn get_deals_by_position(&self, position_id: &str) -> Result<DealsResponse> {
        self.client
            .get_deals_by_position(&self.account_id, position_id)
            .await
    }

    pub async fn get_deals_by_time_range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<DealsResponse> {
        self.client
            .get_deals_by_time_range(&self.account_id, start_time, end_time, offset, limit)
            .await
    }

    pub async fn remove_history(&self) -> Result<()> {
        self.client.remove_history(&self.account_id).await
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.client.reconnect(&self.account_id).await
    }

    pub async fn subscribe_to_market_data(&self, symbol: &str) -> Result<()> {
        self.client
            .subscribe_to_market_data(&self.account_id, symbol)
            .await
    }

    pub async fn get_symbol_specification(&self, symbol: &str) -> Result<SymbolSpecification> {
        self.client
            .get_symbol_specification(&self.account_id, symbol)
            .await
    }

    pub async fn get_symbol_price(&self, symbol: &str) -> Result<SymbolPrice> {
        self.client.get_symbol_price(&self.account_id, symbol).await
    }

    pub async fn trade(&self, trade: &TradeRequest) -> Result<TradeResponse> {
        self.client.trade(&self.account_id, trade).await
    }

    pub async fn create_market_buy_order(
        &self,
        symbol: &str,
        volume: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(&TradeRequest::market_buy(symbol, volume).with_stops(stop_loss, take_profit))
            .await
    }

    pub async fn create_market_sell_order(
        &self,
        symbol: &str,
        volume: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(&TradeRequest::market_sell(symbol, volume).with_stops(stop_loss, take_profit))
            .await
    }

    pub async fn create_limit_buy_order(
        &self,
        symbol: &str,
        volume: f64,
        open_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(
            &TradeRequest::limit_buy(symbol, volume, open_price).with_stops(stop_loss, take_profit),
        )
        .await
    }

    pub async fn create_limit_sell_order(
        &self,
        symbol: &str,
        volume: f64,
        open_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(
            &TradeRequest::limit_sell(symbol, volume, open_price).with_stops(stop_loss, take_profit),
        )
        .await
    }

    pub async fn create_stop_buy_order(
        &self,
        symbol: &str,
        volume: f64,
        open_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(
            &TradeRequest::stop_buy(symbol, volume, open_price).with_stops(stop_loss, take_profit),
        )
        .await
    }

    pub async fn create_stop_sell_order(
        &self,
        symbol: &str,
        volume: f64,
        open_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(
            &TradeRequest::stop_sell(symbol, volume, open_price).with_stops(stop_loss, take_profit),
        )
        .await
    }

    pub async fn modify_position(
        &self,
        position_id: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(&TradeRequest::modify_position(position_id, stop_loss, take_profit))
            .await
    }

    pub async fn close_position_partially(
        &self,
        position_id: &str,
        volume: f64,
    ) -> Result<TradeResponse> {
        self.trade(&TradeRequest::close_position_partially(position_id, volume))
            .await
    }

    pub async fn close_position(&self, position_id: &str) -> Result<TradeResponse> {
        self.trade(&TradeRequest::close_position(position_id)).await
    }

    pub async fn close_positions_by_symbol(&self, symbol: &str) -> Result<TradeResponse> {
        self.trade(&TradeRequest::close_positions_by_symbol(symbol))
            .await
    }

    pub async fn modify_order(
        &self,
        order_id: &str,
        open_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<TradeResponse> {
        self.trade(&TradeRequest::modify_order(
            order_id, open_price, stop_loss, take_profit,
        ))
        .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<TradeResponse> {
        self.trade(&TradeRequest::cancel_order(order_id)).await
    }
}

#[async_trait]
impl SynchronizationListener for TerminalConnection {
    async fn on_connected(&self) -> Result<()> {
        let Some(history_storage) = self.history_storage.as_ref() else {
            return Ok(());
        };
        self.set_state(SynchronizationState::Synchronizing);
        let starting_history_order_time = history_storage.last_history_order_time().await;
        let starting_deal_time = history_storage.last_deal_time().await;
        info!(
            "{}: synchronizing from history orders {} and deals {}",
            self.account_id, starting_history_order_time, starting_deal_time
        );

        let _latency_guard = LatencyGuard::new(format!("{} synchronize", self.account_id));
        if let Err(e) = self
            .client
            .synchronize(&self.account_id, starting_history_order_time, starting_deal_time)
            .await
        {
            error!("{}: failed to request synchronization: {}", self.account_id, e);
            self.set_state(SynchronizationState::Unsynchronized);
            return Err(e);
        }
        Ok(())
    }

    async fn on_disconnected(&self) -> Result<()> {
        self.set_state(SynchronizationState::Unsynchronized);
        Ok(())
    }

    async fn on_deal_synchronization_finished(&self) -> Result<()> {
        self.set_state(SynchronizationState::Synchronized);
        info!("{}: synchronized", self.account_id);
        Ok(())
    }
}

#[async_trait]
impl ReconnectListener for TerminalConnection {
    async fn on_reconnected(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.subscribe().await
    }
}
