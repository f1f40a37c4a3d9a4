use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

/// Maps one client request to the frames sent back.
pub(crate) type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(Value),
    DropConnections,
}

/// Terminal server stand-in bound to an ephemeral port. Every text frame is recorded
/// and answered through the current responder, which by default acknowledges the
/// request with an empty response.
pub(crate) struct MockTerminalServer {
    addr: String,
    received: Arc<Mutex<Vec<Value>>>,
    responder: Arc<RwLock<Responder>>,
    pub(crate) connection_count: Arc<AtomicU32>,
    commands: broadcast::Sender<ServerCommand>,
    shutdown: CancellationToken,
}

pub(crate) fn response_to(request: &Value, mut body: Value) -> Value {
    if let Some(object) = body.as_object_mut() {
        object.insert("type".to_string(), json!("response"));
        object.insert("accountId".to_string(), request["accountId"].clone());
        object.insert("requestId".to_string(), request["requestId"].clone());
    }
    body
}

pub(crate) fn error_to(request: &Value, error: &str, message: &str) -> Value {
    json!({
        "error": error,
        "message": message,
        "requestId": request["requestId"].clone(),
    })
}

impl MockTerminalServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (commands, _) = broadcast::channel(64);
        let acknowledge: Responder = Arc::new(|request: &Value| vec![response_to(request, json!({}))]);
        let server = Self {
            addr,
            received: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(RwLock::new(acknowledge)),
            connection_count: Arc::new(AtomicU32::new(0)),
            commands,
            shutdown: CancellationToken::new(),
        };

        let received = server.received.clone();
        let responder = server.responder.clone();
        let connection_count = server.connection_count.clone();
        let commands = server.commands.clone();
        let shutdown = server.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        connection_count.fetch_add(1, Ordering::SeqCst);
                        let received = received.clone();
                        let responder = responder.clone();
                        let command_rx = commands.subscribe();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(
                                stream, received, responder, command_rx, shutdown,
                            )
                            .await
                            {
                                eprintln!("Connection handling error: {}", e);
                            }
                        });
                    }
                }
            }
        });
        server
    }

    async fn handle_connection(
        stream: TcpStream,
        received: Arc<Mutex<Vec<Value>>>,
        responder: Arc<RwLock<Responder>>,
        mut command_rx: broadcast::Receiver<ServerCommand>,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = accept_async(stream).await?;
        let (mut sender, mut receiver) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = command_rx.recv() => match command {
                    Ok(ServerCommand::Push(value)) => {
                        sender.send(Message::Text(value.to_string().into())).await?;
                    }
                    Ok(ServerCommand::DropConnections) | Err(_) => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let request: Value = serde_json::from_str(&text)?;
                        received.lock().await.push(request.clone());
                        let respond = responder.read().unwrap().clone();
                        for frame in respond(&request) {
                            sender.send(Message::Text(frame.to_string().into())).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
        Ok(())
    }

    pub(crate) fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub(crate) fn set_responder(&self, responder: Responder) {
        *self.responder.write().unwrap() = responder;
    }

    /// Sends a frame to every open connection.
    pub(crate) fn push(&self, frame: Value) {
        let _ = self.commands.send(ServerCommand::Push(frame));
    }

    /// Closes every open connection while still accepting new ones.
    pub(crate) fn drop_connections(&self) {
        let _ = self.commands.send(ServerCommand::DropConnections);
    }

    pub(crate) async fn received(&self) -> Vec<Value> {
        self.received.lock().await.clone()
    }

    pub(crate) async fn received_of_type(&self, request_type: &str) -> Vec<Value> {
        self.received()
            .await
            .into_iter()
            .filter(|request| request["type"] == request_type)
            .collect()
    }

    /// Waits until `count` requests of the given type arrived.
    pub(crate) async fn wait_for_requests(&self, request_type: &str, count: usize) -> Vec<Value> {
        for _ in 0..200 {
            let requests = self.received_of_type(request_type).await;
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} {} requests", count, request_type);
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
