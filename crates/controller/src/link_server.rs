//! Controller's end of the persistent link (spec §4.12): accepts daemon
//! connections, calls RPC methods the daemon exposes (`get_drive_status`,
//! `get_drives`), and relays `disc_event`/`progress`/`heartbeat`/`sync`
//! frames onward to a browser-facing broadcast bus that this crate only
//! exposes, not serves.

use amphigory_link::{read_message, write_message, Message, PendingRequests, WireError, DEFAULT_RPC_TIMEOUT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

/// Frames worth relaying to connected browser clients. The actual browser
/// transport (websocket upgrade, JSON shape on that wire) is outside this
/// crate's scope; this channel is the seam a UI layer would subscribe to.
pub const BROADCAST_CAPACITY: usize = 256;

/// One connected daemon: the outbound write queue feeding its connection
/// and the table correlating this daemon's in-flight RPC calls.
#[derive(Clone)]
struct DaemonHandle {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingRequests,
}

#[derive(Clone)]
pub struct LinkServer {
    daemons: Arc<Mutex<HashMap<String, DaemonHandle>>>,
    broadcast: broadcast::Sender<Message>,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcCallError {
    #[error("no daemon connected with id {0}")]
    NotConnected(String),
    #[error(transparent)]
    Pending(#[from] amphigory_link::PendingError),
}

impl LinkServer {
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            daemons: Arc::new(Mutex::new(HashMap::new())),
            broadcast,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.broadcast.subscribe()
    }

    /// Binds `addr` and accepts daemon connections forever. Each connection
    /// runs on its own task; a dropped daemon just means the next accept
    /// picks up the reconnect.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening for daemon connections");

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    tracing::warn!(%peer, error = %e, "daemon connection ended");
                }
            });
        }
    }

    /// Calls `method` on the daemon identified by `daemon_id`, returning
    /// its `result` or an error built from the `{code, message}` it sent.
    pub async fn call(
        &self,
        daemon_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcCallError> {
        let handle = self
            .daemons
            .lock()
            .get(daemon_id)
            .cloned()
            .ok_or_else(|| RpcCallError::NotConnected(daemon_id.to_string()))?;

        let request_id = format!("{daemon_id}-{method}-{}", handle.pending.len());
        let waiter = handle.pending.wait_for(request_id.clone(), DEFAULT_RPC_TIMEOUT);
        let _ = handle.outbound.send(Message::Request {
            request_id,
            method: method.to_string(),
            params,
        });

        match waiter.await? {
            amphigory_link::RpcOutcome::Result { result } => Ok(result),
            amphigory_link::RpcOutcome::Error { error } => {
                Ok(serde_json::json!({ "error": { "code": error.code, "message": error.message } }))
            }
        }
    }

    pub fn publish(&self, message: Message) {
        let _ = self.broadcast.send(message);
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), WireError> {
        let daemon_id = match read_message(&mut stream).await? {
            Message::DaemonConfig { daemon_id, capabilities } => {
                tracing::info!(%daemon_id, ?capabilities, "daemon registered");
                daemon_id
            }
            other => {
                tracing::warn!(?other, "expected daemon_config as the first frame");
                return Ok(());
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let pending = PendingRequests::new();

        self.daemons.lock().insert(
            daemon_id.clone(),
            DaemonHandle {
                outbound: outbound_tx,
                pending: pending.clone(),
            },
        );

        let broadcast = self.broadcast.clone();
        let reader_pending = pending.clone();
        let reader_daemon_id = daemon_id.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_message(&mut read_half).await {
                    Ok(message @ (Message::DiscEvent { .. }
                    | Message::Progress { .. }
                    | Message::Heartbeat { .. }
                    | Message::Sync { .. })) => {
                        let _ = broadcast.send(message);
                    }
                    Ok(Message::Response { request_id, outcome }) => {
                        reader_pending.resolve(&request_id, outcome);
                    }
                    Ok(other) => {
                        tracing::debug!(%reader_daemon_id, ?other, "unexpected frame from daemon");
                    }
                    Err(_) => break,
                }
            }
        });

        while let Some(message) = outbound_rx.recv().await {
            if write_message(&mut write_half, &message).await.is_err() {
                break;
            }
        }

        reader.abort();
        pending.fail_all();
        self.daemons.lock().remove(&daemon_id);
        Ok(())
    }
}

impl Default for LinkServer {
    fn default() -> Self {
        Self::new()
    }
}
