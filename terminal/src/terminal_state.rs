use crate::{
    config::TerminalStateConfig,
    errors::Result,
    listener::SynchronizationListener,
    models::{
        AccountInformation, Order, Position, PositionType, SymbolPrice, SymbolSpecification,
    },
};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct StateData {
    connected: bool,
    connected_to_broker: bool,
    account_information: Option<AccountInformation>,
    positions: Vec<Position>,
    orders: Vec<Order>,
    specifications: Vec<SymbolSpecification>,
    prices: HashMap<String, SymbolPrice>,
    // incremental equity updates since the last full recompute
    equity_update_count: u32,
}

/// Local replica of one account's terminal: account information, open positions,
/// pending orders, symbol specifications and latest prices.
///
/// Position profits and account equity follow every price tick. Equity is patched by
/// the profit delta of the affected positions and rebuilt from balance plus the sum of
/// position profits once every `equity_recompute_interval` patches, which bounds the
/// floating point drift of the incremental updates.
pub struct TerminalState {
    config: TerminalStateConfig,
    data: RwLock<StateData>,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self::new(TerminalStateConfig::default())
    }
}

impl TerminalState {
    pub fn new(config: TerminalStateConfig) -> Self {
        Self {
            config,
            data: RwLock::new(StateData::default()),
        }
    }

    /// Whether the server has authenticated the terminal.
    pub async fn connected(&self) -> bool {
        self.data.read().await.connected
    }

    /// Whether the terminal is connected to its broker.
    pub async fn connected_to_broker(&self) -> bool {
        self.data.read().await.connected_to_broker
    }

    pub async fn account_information(&self) -> Option<AccountInformation> {
        self.data.read().await.account_information.clone()
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.data.read().await.positions.clone()
    }

    pub async fn position(&self, position_id: &str) -> Option<Position> {
        self.data
            .read()
            .await
            .positions
            .iter()
            .find(|p| p.id == position_id)
            .cloned()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.data.read().await.orders.clone()
    }

    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.data
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    pub async fn specifications(&self) -> Vec<SymbolSpecification> {
        self.data.read().await.specifications.clone()
    }

    pub async fn specification(&self, symbol: &str) -> Option<SymbolSpecification> {
        self.data
            .read()
            .await
            .specifications
            .iter()
            .find(|s| s.symbol == symbol)
            .cloned()
    }

    pub async fn price(&self, symbol: &str) -> Option<SymbolPrice> {
        self.data.read().await.prices.get(symbol).cloned()
    }

    fn apply_equity_delta(&self, data: &mut StateData, delta: f64) {
        let total_profit: f64 = data.positions.iter().map(|p| p.profit).sum();
        let recompute = data.equity_update_count >= self.config.equity_recompute_interval;
        let Some(account_information) = data.account_information.as_mut() else {
            return;
        };
        if recompute {
            account_information.equity = account_information.balance + total_profit;
            data.equity_update_count = 0;
        } else {
            account_information.equity += delta;
            data.equity_update_count += 1;
        }
    }
}

/// Re-marks a position at `price` and returns the change of its unrealized profit.
fn update_position_profits(position: &mut Position, price: &SymbolPrice, tick_size: f64) -> f64 {
    let direction = position.position_type.direction();
    let (unrealized_profit, realized_profit) =
        match (position.unrealized_profit, position.realized_profit) {
            (Some(unrealized), Some(realized)) => (unrealized, realized),
            _ => {
                let unrealized = direction
                    * (position.current_price - position.open_price)
                    * position.current_tick_value
                    * position.volume
                    / tick_size;
                (unrealized, position.profit - unrealized)
            }
        };

    // a position is closed at the opposite side of the quote
    let new_price = match position.position_type {
        PositionType::Buy => price.bid,
        PositionType::Sell => price.ask,
    };
    let price_move = direction * (new_price - position.open_price);
    let tick_value = if price_move > 0.0 {
        price.profit_tick_value
    } else {
        price.loss_tick_value
    };
    let new_unrealized_profit = price_move * tick_value * position.volume / tick_size;

    position.unrealized_profit = Some(new_unrealized_profit);
    position.realized_profit = Some(realized_profit);
    position.profit = new_unrealized_profit + realized_profit;
    position.current_price = new_price;
    position.current_tick_value = tick_value;

    new_unrealized_profit - unrealized_profit
}

#[async_trait]
impl SynchronizationListener for TerminalState {
    async fn on_connected(&self) -> Result<()> {
        let mut data = self.data.write().await;
        *data = StateData {
            connected: true,
            ..StateData::default()
        };
        Ok(())
    }

    async fn on_disconnected(&self) -> Result<()> {
        let mut data = self.data.write().await;
        data.connected = false;
        data.connected_to_broker = false;
        Ok(())
    }

    async fn on_broker_connection_status_changed(&self, connected: bool) -> Result<()> {
        self.data.write().await.connected_to_broker = connected;
        Ok(())
    }

    async fn on_account_information_updated(
        &self,
        account_information: &AccountInformation,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        data.account_information = Some(account_information.clone());
        data.equity_update_count = 0;
        Ok(())
    }

    async fn on_position_updated(&self, position: &Position) -> Result<()> {
        let mut data = self.data.write().await;
        match data.positions.iter_mut().find(|p| p.id == position.id) {
            Some(existing) => *existing = position.clone(),
            None => data.positions.push(position.clone()),
        }
        Ok(())
    }

    async fn on_position_removed(&self, position_id: &str) -> Result<()> {
        self.data
            .write()
            .await
            .positions
            .retain(|p| p.id != position_id);
        Ok(())
    }

    async fn on_order_updated(&self, order: &Order) -> Result<()> {
        let mut data = self.data.write().await;
        match data.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order.clone(),
            None => data.orders.push(order.clone()),
        }
        Ok(())
    }

    async fn on_order_completed(&self, order_id: &str) -> Result<()> {
        self.data.write().await.orders.retain(|o| o.id != order_id);
        Ok(())
    }

    async fn on_symbol_specification_updated(
        &self,
        specification: &SymbolSpecification,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        match data
            .specifications
            .iter_mut()
            .find(|s| s.symbol == specification.symbol)
        {
            Some(existing) => *existing = specification.clone(),
            None => data.specifications.push(specification.clone()),
        }
        Ok(())
    }

    async fn on_symbol_price_updated(&self, price: &SymbolPrice) -> Result<()> {
        let mut data = self.data.write().await;
        data.prices.insert(price.symbol.clone(), price.clone());

        for order in data.orders.iter_mut().filter(|o| o.symbol == price.symbol) {
            order.current_price = Some(if order.order_type.is_buy() {
                price.ask
            } else {
                price.bid
            });
        }

        let tick_size = match data.specifications.iter().find(|s| s.symbol == price.symbol) {
            Some(specification) => specification.tick_size,
            None => {
                debug!("no specification for {}, skipping profit update", price.symbol);
                return Ok(());
            }
        };
        if tick_size <= 0.0 {
            warn!("invalid tick size {} for {}", tick_size, price.symbol);
            return Ok(());
        }

        let mut delta = 0.0;
        let mut updated = false;
        for position in data.positions.iter_mut().filter(|p| p.symbol == price.symbol) {
            delta += update_position_profits(position, price, tick_size);
            updated = true;
        }
        if updated {
            self.apply_equity_delta(&mut data, delta);
        }
        Ok(())
    }
}
