use crate::{Result, WsError};
use futures_util::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use log::{debug, error, info};
use scopeguard::defer;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone)]
pub enum SendMsg {
    Text { content: String },
    Ping { data: Vec<u8> },
    Pong { data: Vec<u8> },
    Close { code: Option<u16>, reason: Option<String> },
}

impl SendMsg {
    pub fn text<S: Into<String>>(content: S) -> Self {
        SendMsg::Text {
            content: content.into(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SendMsg::Text { .. } => "text",
            SendMsg::Ping { .. } => "ping",
            SendMsg::Pong { .. } => "pong",
            SendMsg::Close { .. } => "close",
        }
    }

    pub fn to_websocket_message(self) -> Message {
        match self {
            SendMsg::Text { content } => Message::Text(content.into()),
            SendMsg::Ping { data } => Message::Ping(data.into()),
            SendMsg::Pong { data } => Message::Pong(data.into()),
            SendMsg::Close { code, reason } => {
                let close_frame =
                    code.map(|code| tokio_tungstenite::tungstenite::protocol::CloseFrame {
                        code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(
                            code,
                        ),
                        reason: reason.unwrap_or_default().into(),
                    });
                Message::Close(close_frame)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecvMsg {
    Text { content: String },
    Binary { data: Vec<u8> },
    Ping { data: Vec<u8> },
    Pong { data: Vec<u8> },
    Close { code: Option<u16>, reason: Option<String> },
}

impl RecvMsg {
    pub fn from_websocket_message(msg: Message) -> Option<Self> {
        match msg {
            Message::Text(content) => Some(RecvMsg::Text {
                content: content.to_string(),
            }),
            Message::Binary(data) => Some(RecvMsg::Binary {
                data: data.to_vec(),
            }),
            Message::Ping(data) => Some(RecvMsg::Ping {
                data: data.to_vec(),
            }),
            Message::Pong(data) => Some(RecvMsg::Pong {
                data: data.to_vec(),
            }),
            Message::Close(close_frame) => {
                let (code, reason) = match close_frame {
                    Some(frame) => (Some(frame.code.into()), Some(frame.reason.to_string())),
                    None => (None, None),
                };
                Some(RecvMsg::Close { code, reason })
            }
            // raw frames are handled inside tungstenite
            Message::Frame(_) => None,
        }
    }

    /// Payload of a data frame as text, if it is one.
    pub fn into_text(self) -> Option<String> {
        match self {
            RecvMsg::Text { content } => Some(content),
            RecvMsg::Binary { data } => String::from_utf8(data).ok(),
            _ => None,
        }
    }
}

pub type Handle =
    Arc<dyn Fn(RecvMsg) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

pub struct Config {
    pub url: String,
    pub send_buf_size: usize,
    pub handle: Handle,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Config {
    // Fields of the returned value can be adjusted directly.
    pub fn default(url: String, handle: Handle) -> Self {
        Self {
            url,
            send_buf_size: 1024,
            handle,
            connect_timeout: Duration::from_millis(10000),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// One websocket session. Data frames go to `Config::handle`; the session ends when
/// the server closes, a loop fails, or `disconnect` is called, all of which cancel the
/// shutdown token.
pub struct Client {
    config: Config,
    send_tx: Option<Sender<SendMsg>>,
    shutdown_token: CancellationToken,
    join_handles: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        if Url::parse(&config.url).is_err() {
            return Err(WsError::invalid_url(&config.url));
        }
        if config.connect_timeout.is_zero() {
            return Err(WsError::invalid_timeout("connect_timeout"));
        }
        if config.heartbeat_interval.is_zero() {
            return Err(WsError::invalid_heartbeat_interval());
        }
        if config.send_buf_size == 0 {
            return Err(WsError::invalid_send_buf_size());
        }
        Ok(Client {
            config,
            send_tx: None,
            shutdown_token: CancellationToken::new(),
            join_handles: Mutex::new(Vec::new()),
        })
    }

    pub fn get_shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.send_tx.is_some() && !self.shutdown_token.is_cancelled()
    }

    pub async fn connect(&mut self) -> Result<()> {
        let connect_timeout = self.config.connect_timeout;
        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(&self.config.url))
            .await
            .map_err(|_| WsError::connection_timeout(&self.config.url, connect_timeout))?
            .map_err(|e| WsError::connection_failed(&self.config.url, e))?;
        self.initialize_stream(ws_stream);
        info!("websocket connected: {}", self.config.url);
        Ok(())
    }

    fn initialize_stream<S>(&mut self, ws_stream: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = ws_stream.split();

        let (send_tx, send_rx) = channel::<SendMsg>(self.config.send_buf_size);
        self.send_tx = Some(send_tx.clone());

        let shutdown_token1 = self.shutdown_token.clone();
        let send_loop_handle =
            tokio::spawn(async move { Self::send_loop(sender, send_rx, shutdown_token1).await });

        let handle = self.config.handle.clone();
        let shutdown_token2 = self.shutdown_token.clone();
        let send_tx1 = send_tx.clone();
        let recv_loop_handle = tokio::spawn(async move {
            Self::recv_loop(receiver, handle, send_tx1, shutdown_token2).await
        });

        let heartbeat_interval = self.config.heartbeat_interval;
        let shutdown_token3 = self.shutdown_token.clone();
        let heartbeat_handle = tokio::spawn(async move {
            Self::heartbeat(send_tx, heartbeat_interval, shutdown_token3).await
        });

        if let Ok(mut handles) = self.join_handles.lock() {
            handles.push(send_loop_handle);
            handles.push(recv_loop_handle);
            handles.push(heartbeat_handle);
        }
    }

    /// Cancels the session and waits for its loops. Must not be awaited from inside
    /// `Config::handle`, which runs on the receive loop.
    pub async fn disconnect(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let handles: Vec<_> = match self.join_handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Task join error: {}", e);
            }
        }

        Ok(())
    }

    pub async fn send(&self, msg: SendMsg) -> Result<()> {
        let send_tx = match self.send_tx.as_ref() {
            Some(tx) if !self.shutdown_token.is_cancelled() => tx,
            _ => return Err(WsError::disconnected()),
        };
        send_tx
            .send(msg)
            .await
            .map_err(|e| WsError::channel_closed("send_tx", e.to_string()))
    }

    async fn recv_loop<S>(
        mut receiver: SplitStream<WebSocketStream<S>>,
        handle: Handle,
        send_tx: Sender<SendMsg>,
        shutdown_token: CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        defer!(
            shutdown_token.cancel();
        );
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    return Err(WsError::disconnected());
                }
                msg = receiver.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            error!("WebSocket receive error: {}", e);
                            return Err(WsError::receive_failed(e));
                        }
                        None => {
                            return Err(WsError::receive_failed(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "WebSocket stream ended unexpectedly",
                            )));
                        }
                    };
                    match RecvMsg::from_websocket_message(msg) {
                        Some(recv_msg @ (RecvMsg::Text { .. } | RecvMsg::Binary { .. })) => {
                            if let Err(e) = handle(recv_msg).await {
                                error!("failed to handle message: {}", e);
                            }
                        }
                        Some(RecvMsg::Ping { data }) => {
                            debug!("Received Ping: {}", String::from_utf8_lossy(&data));
                            if let Err(e) = send_tx.send(SendMsg::Pong { data }).await {
                                error!("failed to send Pong: {}", e);
                                return Err(WsError::channel_closed("send_tx", e.to_string()));
                            }
                        }
                        Some(RecvMsg::Pong { data }) => {
                            debug!("Received Pong: {}", String::from_utf8_lossy(&data));
                        }
                        Some(RecvMsg::Close { code, reason }) => {
                            info!("WebSocket connection closed: code={:?}, reason={:?}", code, reason);
                            return Err(WsError::connection_closed(code.unwrap_or(0), reason.unwrap_or_default()));
                        }
                        None => {}
                    }
                }
            }
        }
    }

    async fn send_loop<S>(
        mut sender: SplitSink<WebSocketStream<S>, Message>,
        mut send_rx: Receiver<SendMsg>,
        shutdown_token: CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        defer!(
            shutdown_token.cancel();
        );
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    send_rx.close();
                    let _ = sender.close().await;
                    return Err(WsError::disconnected());
                }
                msg = send_rx.recv() => {
                    let Some(msg) = msg else {
                        return Err(WsError::channel_closed("send_rx", "send channel closed".to_string()));
                    };
                    let kind = msg.kind();
                    if let Err(e) = sender.send(msg.to_websocket_message()).await {
                        error!("WebSocket send error: {}", e);
                        return Err(WsError::send_failed(kind, e));
                    }
                }
            }
        }
    }

    async fn heartbeat(
        send_tx: Sender<SendMsg>,
        interval: Duration,
        shutdown_token: CancellationToken,
    ) -> Result<()> {
        defer!(
            shutdown_token.cancel();
        );
        let mut interval = tokio::time::interval(interval);
        // the first tick fires immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    return Err(WsError::disconnected());
                }
                _ = interval.tick() => {
                    let now_ts = time::get_current_milli_timestamp();
                    let heartbeat_msg = SendMsg::Ping {
                        data: now_ts.to_string().into_bytes(),
                    };
                    if let Err(e) = send_tx.send(heartbeat_msg).await {
                        error!("Failed to send heartbeat: {}", e);
                        return Err(WsError::channel_closed("send_tx", e.to_string()));
                    }
                }
            }
        }
    }
}
