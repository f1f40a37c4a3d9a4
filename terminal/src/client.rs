use crate::{
    config::ClientConfig,
    errors::{Result, TerminalError},
    listener::{ListenerRegistry, ReconnectListener, SynchronizationListener, guarded, same_listener},
    models::{
        AccountInformation, DealsResponse, HistoryOrdersResponse, InboundMessage, Order, Position,
        SymbolPrice, SymbolSpecification, SynchronizationEnvelope, TradeRequest, TradeResponse,
    },
    utils::rand_id,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use ws::{RecvMsg, SendMsg};

const REQUEST_ID_LEN: usize = 32;

type PendingMap = HashMap<String, oneshot::Sender<Result<Value>>>;

struct Shared {
    config: ClientConfig,
    session: ArcSwapOption<ws::Client>,
    // serializes connect() callers
    connect_lock: Mutex<()>,
    connected: watch::Sender<bool>,
    supervising: AtomicBool,
    // cancelled by close(), replaced by the next connect()
    lifecycle: ArcSwap<CancellationToken>,
    pending: Mutex<PendingMap>,
    listeners: Arc<ListenerRegistry>,
    reconnect_listeners: RwLock<Vec<Arc<dyn ReconnectListener>>>,
    packet_tx: mpsc::UnboundedSender<Value>,
    packet_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

/// Streaming RPC client of the terminal server.
///
/// One websocket session is shared by every account; requests and notifications are
/// told apart by `accountId`. Responses are matched to requests by a random
/// `requestId`. Synchronization envelopes are handed to a single dispatch task which
/// delivers them to the listeners registered for their account, in arrival order.
///
/// After a successful `connect` a supervisor keeps the session alive: when it drops,
/// the session is re-established every `reconnect_interval` until it succeeds or the
/// client is closed, and reconnect listeners are notified.
pub struct TerminalClient {
    shared: Arc<Shared>,
}

impl TerminalClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (connected, _) = watch::channel(false);
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                session: ArcSwapOption::empty(),
                connect_lock: Mutex::new(()),
                connected,
                supervising: AtomicBool::new(false),
                lifecycle: ArcSwap::from_pointee(CancellationToken::new()),
                pending: Mutex::new(HashMap::new()),
                listeners: Arc::new(ListenerRegistry::new()),
                reconnect_listeners: RwLock::new(Vec::new()),
                packet_tx,
                packet_rx: std::sync::Mutex::new(Some(packet_rx)),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Opens the session, retrying every `reconnect_interval` until it succeeds or
    /// `close` is called. Returns immediately when already connected.
    pub async fn connect(&self) -> Result<()> {
        self.shared.connect().await
    }

    /// Rejects every pending request with `ConnectionClosed`, drops all listener
    /// registrations and tears down the session. Responses arriving later are ignored.
    pub async fn close(&self) {
        self.shared.close().await
    }

    pub fn add_synchronization_listener(
        &self,
        account_id: &str,
        listener: Arc<dyn SynchronizationListener>,
    ) {
        self.shared.listeners.register(account_id, listener);
    }

    pub fn remove_synchronization_listener(
        &self,
        account_id: &str,
        listener: &Arc<dyn SynchronizationListener>,
    ) -> bool {
        self.shared.listeners.unregister(account_id, listener)
    }

    pub fn add_reconnect_listener(&self, listener: Arc<dyn ReconnectListener>) {
        if let Ok(mut listeners) = self.shared.reconnect_listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn remove_reconnect_listener(&self, listener: &Arc<dyn ReconnectListener>) -> bool {
        match self.shared.reconnect_listeners.write() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|l| !same_listener(l, listener));
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    /// Sends `request` tagged with `accountId` and a fresh `requestId` and waits for the
    /// matching response. Connects first when needed.
    pub async fn rpc_request(&self, account_id: &str, mut request: Value) -> Result<Value> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let request_id = rand_id(REQUEST_ID_LEN);
        let Some(object) = request.as_object_mut() else {
            return Err(TerminalError::Validation {
                message: format!("request must be a JSON object: {}", request),
                details: None,
            });
        };
        object.insert("accountId".to_string(), Value::String(account_id.to_string()));
        object.insert("requestId".to_string(), Value::String(request_id.clone()));

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .await
            .insert(request_id.clone(), tx);

        if let Err(e) = self.shared.send(request.to_string()).await {
            self.shared.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        let timeout = self.shared.config.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TerminalError::connection_closed()),
            Err(_) => {
                self.shared.pending.lock().await.remove(&request_id);
                Err(TerminalError::request_timeout(&request_id, timeout))
            }
        }
    }

    /// Asks the server to start streaming the account's terminal.
    pub async fn subscribe(&self, account_id: &str) -> Result<()> {
        self.rpc_request(account_id, json!({"type": "subscribe"}))
            .await
            .map(|_| ())
    }

    /// Requests a full state synchronization. History newer than the given watermarks
    /// is replayed.
    pub async fn synchronize(
        &self,
        account_id: &str,
        starting_history_order_time: DateTime<Utc>,
        starting_deal_time: DateTime<Utc>,
    ) -> Result<()> {
        self.rpc_request(
            account_id,
            json!({
                "type": "synchronize",
                "startingHistoryOrderTime": format_time(&starting_history_order_time),
                "startingDealTime": format_time(&starting_deal_time),
            }),
        )
        .await
        .map(|_| ())
    }

    /// Asks the server to reconnect the terminal to its broker.
    pub async fn reconnect(&self, account_id: &str) -> Result<()> {
        self.rpc_request(account_id, json!({"type": "reconnect"}))
            .await
            .map(|_| ())
    }

    pub async fn get_account_information(&self, account_id: &str) -> Result<AccountInformation> {
        let response = self
            .rpc_request(account_id, json!({"type": "getAccountInformation"}))
            .await?;
        take_field(response, "accountInformation")
    }

    pub async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>> {
        let response = self
            .rpc_request(account_id, json!({"type": "getPositions"}))
            .await?;
        take_field(response, "positions")
    }

    pub async fn get_position(&self, account_id: &str, position_id: &str) -> Result<Position> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getPosition", "positionId": position_id}),
            )
            .await?;
        take_field(response, "position")
    }

    pub async fn get_orders(&self, account_id: &str) -> Result<Vec<Order>> {
        let response = self
            .rpc_request(account_id, json!({"type": "getOrders"}))
            .await?;
        take_field(response, "orders")
    }

    pub async fn get_order(&self, account_id: &str, order_id: &str) -> Result<Order> {
        let response = self
            .rpc_request(account_id, json!({"type": "getOrder", "orderId": order_id}))
            .await?;
        take_field(response, "order")
    }

    pub async fn get_history_orders_by_ticket(
        &self,
        account_id: &str,
        ticket: &str,
    ) -> Result<HistoryOrdersResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getHistoryOrdersByTicket", "ticket": ticket}),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_history_orders_by_position(
        &self,
        account_id: &str,
        position_id: &str,
    ) -> Result<HistoryOrdersResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getHistoryOrdersByPosition", "positionId": position_id}),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_history_orders_by_time_range(
        &self,
        account_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<HistoryOrdersResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({
                    "type": "getHistoryOrdersByTimeRange",
                    "startTime": format_time(&start_time),
                    "endTime": format_time(&end_time),
                    "offset": offset,
                    "limit": limit,
                }),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_deals_by_ticket(&self, account_id: &str, ticket: &str) -> Result<DealsResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getDealsByTicket", "ticket": ticket}),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_deals_by_position(
        &self,
        account_id: &str,
        position_id: &str,
    ) -> Result<DealsResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getDealsByPosition", "positionId": position_id}),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_deals_by_time_range(
        &self,
        account_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<DealsResponse> {
        let response = self
            .rpc_request(
                account_id,
                json!({
                    "type": "getDealsByTimeRange",
                    "startTime": format_time(&start_time),
                    "endTime": format_time(&end_time),
                    "offset": offset,
                    "limit": limit,
                }),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Clears the history kept on the server side for the account.
    pub async fn remove_history(&self, account_id: &str) -> Result<()> {
        self.rpc_request(account_id, json!({"type": "removeHistory"}))
            .await
            .map(|_| ())
    }

    /// Executes a trade. A result code outside the success set becomes
    /// `TerminalError::Trade`.
    pub async fn trade(&self, account_id: &str, trade: &TradeRequest) -> Result<TradeResponse> {
        let response = self
            .rpc_request(account_id, json!({"type": "trade", "trade": trade}))
            .await?;
        let trade_response: TradeResponse = take_field(response, "response")?;
        if !trade_response.is_success() {
            return Err(TerminalError::Trade {
                numeric_code: trade_response.numeric_code,
                string_code: trade_response.string_code,
                message: trade_response.message,
            });
        }
        Ok(trade_response)
    }

    /// Subscribes the terminal to price updates of a symbol.
    pub async fn subscribe_to_market_data(&self, account_id: &str, symbol: &str) -> Result<()> {
        self.rpc_request(
            account_id,
            json!({"type": "subscribeToMarketData", "symbol": symbol}),
        )
        .await
        .map(|_| ())
    }

    pub async fn get_symbol_specification(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> Result<SymbolSpecification> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getSymbolSpecification", "symbol": symbol}),
            )
            .await?;
        take_field(response, "specification")
    }

    pub async fn get_symbol_price(&self, account_id: &str, symbol: &str) -> Result<SymbolPrice> {
        let response = self
            .rpc_request(
                account_id,
                json!({"type": "getSymbolPrice", "symbol": symbol}),
            )
            .await?;
        take_field(response, "price")
    }
}

impl Drop for TerminalClient {
    fn drop(&mut self) {
        self.shared.lifecycle.load().cancel();
        if let Some(session) = self.shared.session.load_full() {
            session.get_shutdown_token().cancel();
        }
    }
}

impl Shared {
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let guard = self.connect_lock.lock().await;
        if *self.connected.borrow() {
            return Ok(());
        }
        let lifecycle = self.lifecycle_token();
        self.start_dispatcher();

        if self.supervising.load(Ordering::SeqCst) {
            // the supervisor is already re-establishing the session
            drop(guard);
            return self.wait_connected(&lifecycle).await;
        }

        self.establish(&lifecycle).await?;
        self.start_supervisor(lifecycle);
        Ok(())
    }

    fn lifecycle_token(&self) -> CancellationToken {
        let current = self.lifecycle.load_full();
        if !current.is_cancelled() {
            return current.as_ref().clone();
        }
        let token = CancellationToken::new();
        self.lifecycle.store(Arc::new(token.clone()));
        token
    }

    async fn wait_connected(&self, lifecycle: &CancellationToken) -> Result<()> {
        let mut connected = self.connected.subscribe();
        loop {
            let is_connected = *connected.borrow_and_update();
            if is_connected {
                return Ok(());
            }
            tokio::select! {
                changed = connected.changed() => {
                    changed.map_err(|_| TerminalError::connection_closed())?;
                }
                _ = lifecycle.cancelled() => return Err(TerminalError::connection_closed()),
            }
        }
    }

    async fn establish(self: &Arc<Self>, lifecycle: &CancellationToken) -> Result<()> {
        let reconnect_interval = self.config.reconnect_interval();
        loop {
            if lifecycle.is_cancelled() {
                return Err(TerminalError::connection_closed());
            }
            match self.open_session().await {
                Ok(()) if lifecycle.is_cancelled() => {
                    // closed while the handshake was in flight
                    self.drop_session().await;
                    return Err(TerminalError::connection_closed());
                }
                Ok(()) => return Ok(()),
                Err(e @ TerminalError::Config { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        "failed to connect to {}: {}, retry in {:?}",
                        self.config.url, e, reconnect_interval
                    );
                }
            }
            tokio::select! {
                _ = lifecycle.cancelled() => return Err(TerminalError::connection_closed()),
                _ = tokio::time::sleep(reconnect_interval) => {}
            }
        }
    }

    async fn open_session(self: &Arc<Self>) -> Result<()> {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let handle: ws::Handle = Arc::new(move |msg: RecvMsg| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_message(msg).await;
                }
                Ok(())
            })
        });

        let mut ws_config = ws::Config::default(self.config.socket_url()?, handle);
        ws_config.send_buf_size = self.config.send_buf_size;
        ws_config.connect_timeout = self.config.connect_timeout();
        ws_config.heartbeat_interval = self.config.heartbeat_interval();

        let mut session = ws::Client::new(ws_config)?;
        session.connect().await?;
        if let Some(previous) = self.session.swap(Some(Arc::new(session))) {
            previous.get_shutdown_token().cancel();
        }
        self.connected.send_replace(true);
        info!("connected to {}", self.config.url);
        Ok(())
    }

    async fn send(&self, text: String) -> Result<()> {
        match self.session.load_full() {
            Some(session) => Ok(session.send(SendMsg::text(text)).await?),
            None => Err(TerminalError::NotConnected {
                message: "websocket session is not established".to_string(),
            }),
        }
    }

    fn start_dispatcher(&self) {
        let Some(mut packet_rx) = self.packet_rx.lock().ok().and_then(|mut rx| rx.take()) else {
            return;
        };
        let listeners = self.listeners.clone();
        tokio::spawn(async move {
            while let Some(value) = packet_rx.recv().await {
                match SynchronizationEnvelope::decode(value) {
                    Ok(envelope) => listeners.dispatch(envelope).await,
                    Err(e) => error!("failed to decode synchronization packet: {}", e),
                }
            }
            debug!("synchronization dispatcher stopped");
        });
    }

    fn start_supervisor(self: &Arc<Self>, lifecycle: CancellationToken) {
        if self.supervising.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.clone();
        tokio::spawn(async move {
            let reconnect_interval = shared.config.reconnect_interval();
            loop {
                let Some(session) = shared.session.load_full() else {
                    break;
                };
                let dead_token = session.get_shutdown_token();
                tokio::select! {
                    _ = lifecycle.cancelled() => break,
                    _ = dead_token.cancelled() => {}
                }

                shared.connected.send_replace(false);
                if let Err(e) = session.disconnect().await {
                    error!("failed to tear down dropped session: {}", e);
                }
                warn!(
                    "session to {} dropped, reconnect in {:?}",
                    shared.config.url, reconnect_interval
                );
                tokio::select! {
                    _ = lifecycle.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_interval) => {}
                }

                if shared.establish(&lifecycle).await.is_err() {
                    break;
                }
                info!("reconnected to {}", shared.config.url);
                let listeners: Vec<_> = shared
                    .reconnect_listeners
                    .read()
                    .map(|listeners| listeners.clone())
                    .unwrap_or_default();
                // listeners may issue requests, which must not wait on this loop
                tokio::spawn(async move {
                    for listener in listeners {
                        guarded("*", "reconnected", listener.on_reconnected()).await;
                    }
                });
            }
            shared.supervising.store(false, Ordering::SeqCst);
            debug!("session supervisor stopped");
        });
    }

    async fn handle_message(self: &Arc<Self>, msg: RecvMsg) {
        let Some(text) = msg.into_text() else {
            return;
        };
        match InboundMessage::parse(&text) {
            Ok(InboundMessage::Response { request_id, body }) => {
                self.resolve(&request_id, Ok(body)).await;
            }
            Ok(InboundMessage::Error { request_id, error }) => {
                let unauthorized = error.is_unauthorized();
                match request_id {
                    Some(request_id) => self.resolve(&request_id, Err(error)).await,
                    None => error!("server error without requestId: {}", error),
                }
                if unauthorized {
                    error!("credentials rejected by server, closing connection");
                    // close() joins the receive loop this runs on
                    let shared = self.clone();
                    tokio::spawn(async move { shared.close().await });
                }
            }
            Ok(InboundMessage::Synchronization(value)) => {
                if self.packet_tx.send(value).is_err() {
                    debug!("dispatcher gone, dropping synchronization packet");
                }
            }
            Err(e) => error!("failed to parse inbound message: {}, {}", e, text),
        }
    }

    async fn resolve(&self, request_id: &str, result: Result<Value>) {
        let pending = self.pending.lock().await.remove(request_id);
        match pending {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!("caller of request {} is gone", request_id);
                }
            }
            None => debug!("no pending request for requestId {}", request_id),
        }
    }

    async fn close(&self) {
        self.lifecycle.load().cancel();
        self.connected.send_replace(false);

        let pending: Vec<_> = self.pending.lock().await.drain().collect();
        if !pending.is_empty() {
            info!("rejecting {} pending requests on close", pending.len());
        }
        for (_, tx) in pending {
            let _ = tx.send(Err(TerminalError::connection_closed()));
        }

        self.listeners.clear();
        if let Ok(mut listeners) = self.reconnect_listeners.write() {
            listeners.clear();
        }

        self.drop_session().await;
        info!("connection to {} closed", self.config.url);
    }

    async fn drop_session(&self) {
        self.connected.send_replace(false);
        if let Some(session) = self.session.swap(None) {
            if let Err(e) = session.disconnect().await {
                error!("failed to disconnect session: {}", e);
            }
        }
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn take_field<T: DeserializeOwned>(mut response: Value, field: &str) -> Result<T> {
    let value = response
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| TerminalError::decode(format!("response without {}", field)))?;
    Ok(serde_json::from_value(value)?)
}
