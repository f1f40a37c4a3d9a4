use crate::config::TerminalStateConfig;
use crate::fixtures::{account_information, order, position, price, specification};
use crate::listener::SynchronizationListener;
use crate::terminal_state::TerminalState;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

async fn synchronized_state() -> TerminalState {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();
    state
        .on_account_information_updated(&account_information(1000.0, 1100.0))
        .await
        .unwrap();
    state
        .on_position_updated(&position("1", "EURUSD", "POSITION_TYPE_BUY"))
        .await
        .unwrap();
    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.01))
        .await
        .unwrap();
    state
}

#[tokio::test]
async fn test_price_update_recomputes_long_position_profit() {
    let state = synchronized_state().await;

    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();

    let position = state.position("1").await.unwrap();
    assert!(approx_eq(position.profit, 200.0), "profit {}", position.profit);
    assert_eq!(position.current_price, 10.0);
    assert_eq!(position.current_tick_value, 0.5);
    assert!(approx_eq(position.unrealized_profit.unwrap(), 200.0));
    assert!(approx_eq(position.realized_profit.unwrap(), 0.0));

    let account_information = state.account_information().await.unwrap();
    assert!(approx_eq(account_information.equity, 1200.0));
    assert_eq!(state.price("EURUSD").await.unwrap().ask, 11.0);
}

#[tokio::test]
async fn test_price_update_marks_short_position_at_ask() {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();
    state
        .on_account_information_updated(&account_information(1000.0, 1000.0))
        .await
        .unwrap();
    let mut short = position("2", "EURUSD", "POSITION_TYPE_SELL");
    // opened at 8, now at 9: losing 100 with a realized part of 50
    short.profit = -50.0;
    state.on_position_updated(&short).await.unwrap();
    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.01))
        .await
        .unwrap();

    let mut quote = price("EURUSD", 6.0, 7.0);
    quote.profit_tick_value = 0.25;
    state.on_symbol_price_updated(&quote).await.unwrap();

    let position = state.position("2").await.unwrap();
    assert_eq!(position.current_price, 7.0);
    assert_eq!(position.current_tick_value, 0.25);
    // -1 * (7 - 8) * 0.25 * 2 / 0.01
    assert!(approx_eq(position.unrealized_profit.unwrap(), 50.0));
    assert!(approx_eq(position.realized_profit.unwrap(), 50.0));
    assert!(approx_eq(position.profit, 100.0));
    let account_information = state.account_information().await.unwrap();
    assert!(approx_eq(account_information.equity, 1150.0));
}

#[tokio::test]
async fn test_price_without_specification_changes_nothing() {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();
    let info = account_information(1000.0, 1100.0);
    let original = position("1", "EURUSD", "POSITION_TYPE_BUY");
    state.on_account_information_updated(&info).await.unwrap();
    state.on_position_updated(&original).await.unwrap();

    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();

    assert_eq!(state.position("1").await.unwrap(), original);
    assert_eq!(state.account_information().await.unwrap(), info);
    assert!(state.price("EURUSD").await.is_some());
}

#[tokio::test]
async fn test_price_for_other_symbol_leaves_position() {
    let state = synchronized_state().await;
    state
        .on_symbol_specification_updated(&specification("GBPUSD", 0.01))
        .await
        .unwrap();
    let before = state.position("1").await.unwrap();

    state
        .on_symbol_price_updated(&price("GBPUSD", 1.3, 1.31))
        .await
        .unwrap();

    assert_eq!(state.position("1").await.unwrap(), before);
    assert_eq!(state.account_information().await.unwrap().equity, 1100.0);
}

#[tokio::test]
async fn test_equity_recomputed_after_interval() {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();
    // equity deliberately off from balance + profit
    state
        .on_account_information_updated(&account_information(1000.0, 1500.0))
        .await
        .unwrap();
    state
        .on_position_updated(&position("1", "EURUSD", "POSITION_TYPE_BUY"))
        .await
        .unwrap();
    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.01))
        .await
        .unwrap();

    for i in 0..100 {
        let bid = if i % 2 == 0 { 10.0 } else { 9.5 };
        state
            .on_symbol_price_updated(&price("EURUSD", bid, bid + 1.0))
            .await
            .unwrap();
    }
    // 100 incremental updates keep the offset
    let profit = state.position("1").await.unwrap().profit;
    let equity = state.account_information().await.unwrap().equity;
    assert!(approx_eq(equity, 1500.0 + profit - 100.0), "equity {}", equity);

    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();
    let profit = state.position("1").await.unwrap().profit;
    let equity = state.account_information().await.unwrap().equity;
    assert_eq!(equity, 1000.0 + profit);

    // the counter restarts: the next tick is incremental again
    state
        .on_symbol_price_updated(&price("EURUSD", 9.5, 10.5))
        .await
        .unwrap();
    let new_profit = state.position("1").await.unwrap().profit;
    let new_equity = state.account_information().await.unwrap().equity;
    assert!(approx_eq(new_equity, equity + new_profit - profit));
}

#[tokio::test]
async fn test_equity_recompute_interval_is_configurable() {
    let state = TerminalState::new(TerminalStateConfig {
        equity_recompute_interval: 1,
    });
    state.on_connected().await.unwrap();
    state
        .on_account_information_updated(&account_information(1000.0, 1500.0))
        .await
        .unwrap();
    state
        .on_position_updated(&position("1", "EURUSD", "POSITION_TYPE_BUY"))
        .await
        .unwrap();
    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.01))
        .await
        .unwrap();

    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();
    assert!(approx_eq(state.account_information().await.unwrap().equity, 1600.0));

    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();
    assert!(approx_eq(state.account_information().await.unwrap().equity, 1200.0));
}

#[tokio::test]
async fn test_orders_follow_quote_side() {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();
    state
        .on_order_updated(&order("1", "EURUSD", "ORDER_TYPE_BUY_LIMIT"))
        .await
        .unwrap();
    state
        .on_order_updated(&order("2", "EURUSD", "ORDER_TYPE_SELL_STOP"))
        .await
        .unwrap();

    state
        .on_symbol_price_updated(&price("EURUSD", 1.1, 1.2))
        .await
        .unwrap();

    assert_eq!(state.order("1").await.unwrap().current_price, Some(1.2));
    assert_eq!(state.order("2").await.unwrap().current_price, Some(1.1));
}

#[tokio::test]
async fn test_on_connected_resets_state() {
    let state = synchronized_state().await;
    state
        .on_order_updated(&order("1", "EURUSD", "ORDER_TYPE_BUY_LIMIT"))
        .await
        .unwrap();
    state
        .on_symbol_price_updated(&price("EURUSD", 10.0, 11.0))
        .await
        .unwrap();
    state.on_broker_connection_status_changed(true).await.unwrap();

    state.on_connected().await.unwrap();

    assert!(state.connected().await);
    assert!(!state.connected_to_broker().await);
    assert!(state.account_information().await.is_none());
    assert!(state.positions().await.is_empty());
    assert!(state.orders().await.is_empty());
    assert!(state.specifications().await.is_empty());
    assert!(state.price("EURUSD").await.is_none());
}

#[tokio::test]
async fn test_on_disconnected_keeps_data() {
    let state = synchronized_state().await;
    state.on_broker_connection_status_changed(true).await.unwrap();

    state.on_disconnected().await.unwrap();

    assert!(!state.connected().await);
    assert!(!state.connected_to_broker().await);
    assert_eq!(state.positions().await.len(), 1);
    assert!(state.account_information().await.is_some());
}

#[tokio::test]
async fn test_upserts_and_removals_by_id() {
    let state = TerminalState::default();
    state.on_connected().await.unwrap();

    let mut first = position("1", "EURUSD", "POSITION_TYPE_BUY");
    state.on_position_updated(&first).await.unwrap();
    state
        .on_position_updated(&position("2", "GBPUSD", "POSITION_TYPE_SELL"))
        .await
        .unwrap();
    first.volume = 5.0;
    state.on_position_updated(&first).await.unwrap();

    let positions = state.positions().await;
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].volume, 5.0);

    state.on_position_removed("1").await.unwrap();
    state.on_position_removed("missing").await.unwrap();
    let positions = state.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].id, "2");

    state
        .on_order_updated(&order("1", "EURUSD", "ORDER_TYPE_BUY_LIMIT"))
        .await
        .unwrap();
    state
        .on_order_updated(&order("1", "EURUSD", "ORDER_TYPE_BUY_STOP"))
        .await
        .unwrap();
    assert_eq!(state.orders().await.len(), 1);
    state.on_order_completed("1").await.unwrap();
    assert!(state.orders().await.is_empty());

    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.01))
        .await
        .unwrap();
    state
        .on_symbol_specification_updated(&specification("EURUSD", 0.001))
        .await
        .unwrap();
    assert_eq!(state.specifications().await.len(), 1);
    assert_eq!(state.specification("EURUSD").await.unwrap().tick_size, 0.001);
}
