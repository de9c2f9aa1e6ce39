//! Persistent WebSocket transport
//!
//! One connection per `(printer, suffix)`, opened lazily on first send and
//! reused until it closes. Sends issued while the connection is still
//! opening are queued and flushed once on open, following the configured
//! [`QueuedSendPolicy`]. Replies are pushed by the agent and routed to the
//! waiting request by `RequestID`, falling back to the oldest waiter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{AgentConfig, QueuedSendPolicy};
use crate::error::{TransportError, TransportResult};
use crate::protocol::AgentReply;

/// Suffix of the print connection
pub const PRINT_SUFFIX: &str = "";
/// Suffix of the card-reader connection
pub const MSR_SUFFIX: &str = "/requestMSRData";

/// Receives the agent's reply for one send
pub type ReplyReceiver = oneshot::Receiver<TransportResult<AgentReply>>;

/// Registry key: one live connection per printer and request kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketKey {
    pub printer: String,
    pub suffix: &'static str,
}

impl SocketKey {
    pub fn print(printer: &str) -> Self {
        Self {
            printer: printer.to_string(),
            suffix: PRINT_SUFFIX,
        }
    }

    pub fn msr(printer: &str) -> Self {
        Self {
            printer: printer.to_string(),
            suffix: MSR_SUFFIX,
        }
    }
}

struct Waiter {
    ticket: u64,
    request_id: Option<u64>,
    tx: oneshot::Sender<TransportResult<AgentReply>>,
}

struct QueuedSend {
    ticket: u64,
    body: String,
}

enum Phase {
    Connecting { queued: Vec<QueuedSend> },
    Open { outbound: mpsc::UnboundedSender<String> },
    Closed,
}

struct State {
    phase: Phase,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

impl State {
    /// Drop waiters whose caller stopped listening
    fn prune_abandoned(&mut self) {
        self.waiters.retain(|w| !w.tx.is_closed());
    }

    /// Waiter for `request_id`, else the oldest live one
    fn take_waiter(&mut self, request_id: Option<u64>) -> Option<Waiter> {
        self.prune_abandoned();
        let pos = request_id
            .and_then(|id| self.waiters.iter().position(|w| w.request_id == Some(id)))
            .unwrap_or(0);
        self.waiters.remove(pos)
    }
}

struct SocketConnection {
    key: SocketKey,
    policy: QueuedSendPolicy,
    state: Mutex<State>,
    shutdown: CancellationToken,
}

impl SocketConnection {
    fn new(key: SocketKey, policy: QueuedSendPolicy, shutdown: CancellationToken) -> Self {
        Self {
            key,
            policy,
            state: Mutex::new(State {
                phase: Phase::Connecting { queued: Vec::new() },
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            shutdown,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        matches!(self.lock().phase, Phase::Closed)
    }

    fn is_open(&self) -> bool {
        matches!(self.lock().phase, Phase::Open { .. })
    }

    /// Register a waiter and queue or transmit the body
    ///
    /// Hands the body back if the connection is already closed.
    fn enqueue(
        &self,
        request_id: Option<u64>,
        body: String,
        tx: oneshot::Sender<TransportResult<AgentReply>>,
    ) -> Result<(), (String, oneshot::Sender<TransportResult<AgentReply>>)> {
        let mut state = self.lock();
        state.prune_abandoned();
        let ticket = state.next_ticket;

        let superseded = match &mut state.phase {
            Phase::Closed => return Err((body, tx)),
            Phase::Open { outbound } => {
                if let Err(e) = outbound.send(body) {
                    return Err((e.0, tx));
                }
                Vec::new()
            }
            Phase::Connecting { queued } => {
                let displaced = match self.policy {
                    QueuedSendPolicy::LastWriteWins => std::mem::take(queued),
                    QueuedSendPolicy::QueueAll => Vec::new(),
                };
                queued.push(QueuedSend { ticket, body });
                displaced
            }
        };

        state.next_ticket += 1;
        state.waiters.push_back(Waiter {
            ticket,
            request_id,
            tx,
        });

        for old in superseded {
            if let Some(pos) = state.waiters.iter().position(|w| w.ticket == old.ticket)
                && let Some(waiter) = state.waiters.remove(pos)
            {
                warn!(
                    printer = %self.key.printer,
                    request_id = ?waiter.request_id,
                    "Queued payload superseded before socket opened"
                );
                let _ = waiter.tx.send(Err(TransportError::Superseded));
            }
        }

        Ok(())
    }

    /// Route one pushed message to its waiter
    fn dispatch(&self, text: &str) {
        let reply = AgentReply::parse(text);

        let request_id = match &reply {
            Ok(reply) => {
                if reply.status().is_pending() && reply.tracks().is_none() {
                    debug!(printer = %self.key.printer, result = %reply.result, "Request still pending");
                    return;
                }
                reply.request_id
            }
            Err(e) => {
                warn!(printer = %self.key.printer, error = %e, "Unparsable socket message");
                None
            }
        };

        let waiter = self.lock().take_waiter(request_id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.tx.send(reply);
            }
            None => debug!(printer = %self.key.printer, "Socket message without waiter"),
        }
    }

    /// Mark closed and fail every remaining waiter
    fn close(&self, opened: bool) {
        let waiters: Vec<Waiter> = {
            let mut state = self.lock();
            state.phase = Phase::Closed;
            state.waiters.drain(..).collect()
        };
        for waiter in waiters {
            let err = if opened {
                TransportError::ConnectionClosed
            } else {
                TransportError::Connection("socket closed before open".to_string())
            };
            let _ = waiter.tx.send(Err(err));
        }
    }

    #[instrument(skip(self), fields(printer = %self.key.printer, suffix = self.key.suffix))]
    async fn run(self: Arc<Self>, url: String) {
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let ws = tokio::select! {
            _ = self.shutdown.cancelled() => {
                self.close(false);
                return;
            }
            result = connect => match result {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    warn!(url = %url, error = %e, "Socket connection failed");
                    self.close(false);
                    return;
                }
            },
        };

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let queued = {
            let mut state = self.lock();
            match std::mem::replace(&mut state.phase, Phase::Open {
                outbound: outbound_tx,
            }) {
                Phase::Connecting { queued } => queued,
                _ => Vec::new(),
            }
        };
        info!(url = %url, queued = queued.len(), "Socket open");

        for q in queued {
            if let Err(e) = sink.send(Message::Text(q.body.into())).await {
                warn!(error = %e, "Flushing queued payload failed");
                self.close(true);
                return;
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                out = outbound_rx.recv() => {
                    let Some(body) = out else { break };
                    if let Err(e) = sink.send(Message::Text(body.into())).await {
                        warn!(error = %e, "Socket send failed");
                        break;
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Socket closed by agent");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Socket error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        self.close(true);
    }
}

/// Lazily opened agent sockets keyed by printer and request kind
#[derive(Clone)]
pub struct SocketRegistry {
    config: AgentConfig,
    connections: Arc<Mutex<HashMap<SocketKey, Arc<SocketConnection>>>>,
    shutdown: CancellationToken,
}

impl SocketRegistry {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            config: config.clone(),
            connections: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Live connection for `key`, opening one if none is usable
    ///
    /// The registry lock makes this the only place a connection attempt
    /// starts, so at most one is in flight per key.
    fn connection(&self, key: &SocketKey) -> Arc<SocketConnection> {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = connections.get(key)
            && !conn.is_closed()
        {
            return conn.clone();
        }

        let conn = Arc::new(SocketConnection::new(
            key.clone(),
            self.config.queued_send_policy,
            self.shutdown.child_token(),
        ));
        connections.insert(key.clone(), conn.clone());

        let url = self.config.endpoint_url(&key.printer, key.suffix);
        debug!(url = %url, "Opening agent socket");
        tokio::spawn(conn.clone().run(url));
        conn
    }

    /// Send a body over the connection for `key`
    ///
    /// Must be called inside a tokio runtime. The receiver yields the
    /// agent's terminal reply or the reason none will come.
    pub fn send(&self, key: &SocketKey, request_id: Option<u64>, body: String) -> ReplyReceiver {
        let (tx, rx) = oneshot::channel();
        let mut pending = (body, tx);

        // A connection may close between lookup and enqueue; retry once on a fresh one
        for _ in 0..2 {
            let conn = self.connection(key);
            match conn.enqueue(request_id, pending.0, pending.1) {
                Ok(()) => return rx,
                Err(back) => pending = back,
            }
        }

        let _ = pending
            .1
            .send(Err(TransportError::Connection("socket unavailable".to_string())));
        rx
    }

    pub fn is_open(&self, key: &SocketKey) -> bool {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .is_some_and(|c| c.is_open())
    }

    /// Number of connections not yet closed
    pub fn live_connections(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Close every connection; pending waiters are failed
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl std::fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("server_url", &self.config.server_url)
            .field("live_connections", &self.live_connections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn agent() -> (TcpListener, AgentConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = AgentConfig::new(format!("ws://{addr}/WebPrintSDK/")).unwrap();
        (listener, config)
    }

    #[tokio::test]
    async fn test_last_write_wins_before_open() {
        let (listener, config) = agent().await;
        let registry = SocketRegistry::new(&config);
        let key = SocketKey::print("Printer1");

        let first = registry.send(&key, Some(1), r#"{"id":1}"#.to_string());
        let second = registry.send(&key, Some(2), r#"{"id":2}"#.to_string());
        assert_eq!(registry.live_connections(), 1);

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"id":2}"#);

        ws.send(Message::Text(
            r#"{"Result":"success","RequestID":2,"ResponseID":"r2"}"#.into(),
        ))
        .await
        .unwrap();

        assert!(matches!(first.await.unwrap(), Err(TransportError::Superseded)));
        let reply = second.await.unwrap().unwrap();
        assert_eq!(reply.response_id(), "r2");

        // nothing else was transmitted
        let extra = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_queue_all_flushes_in_order() {
        let (listener, config) = agent().await;
        let config = config.with_queued_send_policy(QueuedSendPolicy::QueueAll);
        let registry = SocketRegistry::new(&config);
        let key = SocketKey::print("Printer1");

        let _first = registry.send(&key, Some(1), "a".to_string());
        let _second = registry.send(&key, Some(2), "b".to_string());

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let a = ws.next().await.unwrap().unwrap().into_text().unwrap();
        let b = ws.next().await.unwrap().unwrap().into_text().unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
    }

    #[tokio::test]
    async fn test_reuses_open_connection_and_routes_by_request_id() {
        let (listener, config) = agent().await;
        let registry = SocketRegistry::new(&config);
        let key = SocketKey::print("Printer1");

        let first = registry.send(&key, Some(1), "one".to_string());
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap().into_text().unwrap().as_str(), "one");

        let second = registry.send(&key, Some(2), "two".to_string());
        assert_eq!(ws.next().await.unwrap().unwrap().into_text().unwrap().as_str(), "two");
        assert_eq!(registry.live_connections(), 1);

        // pending status is not delivered, replies routed by id
        ws.send(Message::Text(r#"{"Result":"in-progress","RequestID":1,"ResponseID":"r1"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"Result":"success","RequestID":2,"ResponseID":"r2"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"Result":"success","RequestID":1,"ResponseID":"r1"}"#.into()))
            .await
            .unwrap();

        assert_eq!(second.await.unwrap().unwrap().response_id(), "r2");
        let reply = first.await.unwrap().unwrap();
        assert_eq!(reply.result, "success");
        assert_eq!(reply.response_id(), "r1");
    }

    #[tokio::test]
    async fn test_close_before_open_fails_connection() {
        let (listener, config) = agent().await;
        drop(listener);
        let registry = SocketRegistry::new(&config);

        let rx = registry.send(&SocketKey::print("Printer1"), Some(1), "x".to_string());
        assert!(matches!(rx.await.unwrap(), Err(TransportError::Connection(_))));
        assert_eq!(registry.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_close_after_open_is_teardown() {
        let (listener, config) = agent().await;
        let registry = SocketRegistry::new(&config);

        let rx = registry.send(&SocketKey::print("Printer1"), Some(1), "x".to_string());
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let _ = ws.next().await;
        ws.close(None).await.unwrap();

        assert!(matches!(rx.await.unwrap(), Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_take_next_reply() {
        let (listener, config) = agent().await;
        let registry = SocketRegistry::new(&config);
        let key = SocketKey::msr("Printer1");

        let first = registry.send(&key, None, r#"{"Timeout":5}"#.to_string());
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let _ = ws.next().await;
        drop(first);

        let second = registry.send(&key, None, r#"{"Timeout":5}"#.to_string());
        let _ = ws.next().await;
        ws.send(Message::Text(
            r#"{"Result":"success","ResponseID":"m2","Track1":"A","Track2":"B","Track3":"C"}"#
                .into(),
        ))
        .await
        .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply.response_id(), "m2");
        assert_eq!(registry.live_connections(), 1);
    }

    #[tokio::test]
    async fn test_print_and_msr_use_separate_connections() {
        let (listener, config) = agent().await;
        let registry = SocketRegistry::new(&config);

        let _print = registry.send(&SocketKey::print("Printer1"), Some(1), "p".to_string());
        let _msr = registry.send(&SocketKey::msr("Printer1"), None, "m".to_string());
        assert_eq!(registry.live_connections(), 2);
        drop(listener);
    }
}
