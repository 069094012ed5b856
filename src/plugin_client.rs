//! The protocol engine: owns the Unix socket, frames messages, correlates
//! requests with responses, and reconnects forever on disconnect.
//!
//! Shutdown follows the same [`CancellationToken`] + [`TaskTracker`] shape
//! the teacher uses for its own signal-driven drain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::contract::{SendContract, StateClient};
use crate::dispatcher;
use crate::error::{PluginError, PluginErrorKind};
use crate::framing::FrameCodec;
use crate::proto::{
    FsmPayload, FsmToPlugin, PluginConfig, PluginPayload, PluginToFsm, StateReadQuery,
    StateReadRequest, StateReadResponse, StateWriteDelete, StateWriteRequest, StateWriteResponse,
    StateWriteSet,
};

/// Fixed correlation id for the plugin's own config handshake; never reused
/// for a contract request because the FSM assigns those ids itself.
const HANDSHAKE_ID: u64 = 999;

/// Hard cutoff for draining in-flight work on `Closing -> Closed`.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Handshaking,
    Ready,
    Closing,
    Closed,
    ReconnectBackoff,
}

type FrameSink = SplitSink<Framed<UnixStream, FrameCodec>, Bytes>;

/// Owns the socket connection and the in-flight request table. Cheap to
/// clone via `Arc`; every task handling an inbound request holds one.
pub struct PluginClient {
    socket_path: PathBuf,
    chain_id: u64,
    connection_timeout: Duration,
    request_timeout: Duration,
    reconnect_interval: Duration,
    pending: DashMap<u64, oneshot::Sender<FsmToPlugin>>,
    writer: Mutex<Option<FrameSink>>,
    state: Mutex<ConnectionState>,
    cancellation: CancellationToken,
    tasks: TaskTracker,
}

impl PluginClient {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            socket_path: config.socket_path(),
            chain_id: config.chain_id,
            connection_timeout: config.connection_timeout(),
            request_timeout: config.request_timeout(),
            reconnect_interval: config.reconnect_interval(),
            pending: DashMap::new(),
            writer: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            cancellation: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.lock().await = state;
    }

    /// Spawns the reconnect loop and returns immediately; the loop runs
    /// until [`close`](Self::close) cancels it.
    pub fn start(self: &Arc<Self>, contract: Arc<SendContract>) {
        let client = Arc::clone(self);
        self.tasks
            .spawn(async move { client.reconnect_loop(contract).await });
    }

    /// Cancels the reconnect loop, waits briefly for in-flight tasks, and
    /// fails any requests still awaiting a response.
    pub async fn close(&self) {
        self.set_state(ConnectionState::Closing).await;
        self.cancellation.cancel();
        self.tasks.close();
        let _ = timeout(CLOSE_DRAIN_TIMEOUT, self.tasks.wait()).await;
        self.fail_all_pending();
        self.set_state(ConnectionState::Closed).await;
    }

    fn fail_all_pending(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.pending.remove(&id);
        }
    }

    async fn reconnect_loop(self: Arc<Self>, contract: Arc<SendContract>) {
        loop {
            if self.cancellation.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::Connecting).await;
            match timeout(self.connection_timeout, UnixStream::connect(&self.socket_path)).await {
                Ok(Ok(stream)) => {
                    self.set_state(ConnectionState::Connected).await;
                    if let Err(e) = Arc::clone(&self).run_connection(stream, Arc::clone(&contract)).await {
                        warn!(error = %e, "plugin connection ended");
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, path = %self.socket_path.display(), "failed to connect to FSM socket");
                }
                Err(_) => {
                    warn!(path = %self.socket_path.display(), "connection attempt timed out");
                }
            }
            if self.cancellation.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::ReconnectBackoff).await;
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => {}
                _ = self.cancellation.cancelled() => return,
            }
        }
    }

    /// Runs one connection end to end: the reader loop is spawned first and
    /// kept running underneath the handshake, since the handshake's
    /// response only ever arrives through that same reader. Awaiting the
    /// handshake before the reader loop starts would deadlock it against
    /// its own response.
    async fn run_connection(
        self: Arc<Self>,
        raw: UnixStream,
        contract: Arc<SendContract>,
    ) -> Result<(), PluginError> {
        let framed = Framed::new(raw, FrameCodec::default());
        let (sink, source) = framed.split();
        *self.writer.lock().await = Some(sink);

        let reader = Arc::clone(&self);
        let reader_contract = Arc::clone(&contract);
        let mut reader_task =
            tokio::spawn(async move { reader.read_loop(source, reader_contract).await });

        self.set_state(ConnectionState::Handshaking).await;
        let handshake = self.handshake();
        tokio::pin!(handshake);
        let handshake_result = tokio::select! {
            result = &mut handshake => result,
            _ = &mut reader_task => Err(PluginError::new(PluginErrorKind::FailedPluginRead)),
        };
        if let Err(e) = handshake_result {
            reader_task.abort();
            self.teardown_connection().await;
            return Err(e);
        }

        self.set_state(ConnectionState::Ready).await;
        info!(path = %self.socket_path.display(), "plugin connection ready");

        tokio::select! {
            _ = self.cancellation.cancelled() => {}
            _ = &mut reader_task => {
                warn!("plugin read loop ended");
            }
        }
        reader_task.abort();
        self.teardown_connection().await;
        Ok(())
    }

    async fn read_loop(
        self: Arc<Self>,
        mut source: SplitStream<Framed<UnixStream, FrameCodec>>,
        contract: Arc<SendContract>,
    ) {
        loop {
            match source.next().await {
                Some(Ok(bytes)) => self.handle_frame(bytes.as_ref(), &contract),
                Some(Err(e)) => {
                    warn!(error = %e, "plugin read failed");
                    return;
                }
                None => {
                    warn!("FSM closed the connection");
                    return;
                }
            }
        }
    }

    fn handle_frame(self: &Arc<Self>, bytes: &[u8], contract: &Arc<SendContract>) {
        let msg = match FsmToPlugin::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "failed to decode inbound frame, discarding");
                return;
            }
        };
        let client = Arc::clone(self);
        let contract = Arc::clone(contract);
        tokio::spawn(async move { dispatcher::dispatch(&client, &contract, msg).await });
    }

    async fn handshake(&self) -> Result<(), PluginError> {
        let config = PluginConfig {
            name: "send".to_string(),
            id: 1,
            version: 1,
            supported_transactions: vec!["send".to_string()],
        };
        let response = self.send_sync(HANDSHAKE_ID, PluginPayload::Config(config)).await?;
        match response.payload {
            Some(FsmPayload::Config(_)) => Ok(()),
            Some(other) => Err(PluginError::with_detail(
                PluginErrorKind::UnexpectedFsmToPlugin,
                other.kind_name(),
            )),
            None => Err(PluginError::new(PluginErrorKind::InvalidFsmToPluginMessage)),
        }
    }

    async fn teardown_connection(&self) {
        *self.writer.lock().await = None;
        self.fail_all_pending();
    }

    /// Takes the pending completion for `id`, if the FSM ever registered one
    /// (i.e. this frame answers one of the plugin's own outbound calls).
    pub(crate) fn take_pending(&self, id: u64) -> Option<oneshot::Sender<FsmToPlugin>> {
        self.pending.remove(&id).map(|(_, tx)| tx)
    }

    /// Sends `payload` under `id` and replies without waiting for an
    /// acknowledgement; used for contract replies, which are fire-and-forget.
    pub(crate) async fn reply(&self, id: u64, payload: PluginPayload) -> Result<(), PluginError> {
        self.write_frame(&PluginToFsm::new(id, payload)).await
    }

    /// Sends `payload` under `id` and awaits the matching response, timing
    /// out after `request_timeout`. Used both for the handshake and for the
    /// plugin's own `stateRead`/`stateWrite` calls nested inside a handler.
    async fn send_sync(&self, id: u64, payload: PluginPayload) -> Result<FsmToPlugin, PluginError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if let Err(e) = self.write_frame(&PluginToFsm::new(id, payload)).await {
            self.pending.remove(&id);
            return Err(e);
        }
        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PluginError::new(PluginErrorKind::FailedPluginRead)),
            Err(_) => {
                self.pending.remove(&id);
                Err(PluginError::new(PluginErrorKind::PluginTimeout))
            }
        }
    }

    async fn write_frame(&self, msg: &PluginToFsm) -> Result<(), PluginError> {
        let mut guard = self.writer.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| PluginError::with_detail(PluginErrorKind::FailedPluginWrite, "not connected"))?;
        let bytes = Bytes::from(msg.encode_to_vec());
        sink.send(bytes)
            .await
            .map_err(|e| PluginError::with_detail(PluginErrorKind::FailedPluginWrite, e.to_string()))?;
        debug!(id = msg.id, "wrote frame");
        Ok(())
    }
}

impl StateClient for PluginClient {
    fn read_state(
        &self,
        fsm_id: u64,
        keys: Vec<(u64, Vec<u8>)>,
    ) -> impl std::future::Future<Output = Result<StateReadResponse, PluginError>> + Send {
        async move {
            let request = StateReadRequest {
                keys: keys
                    .into_iter()
                    .map(|(query_id, key)| StateReadQuery { query_id, key })
                    .collect(),
            };
            let response = self.send_sync(fsm_id, PluginPayload::StateRead(request)).await?;
            match response.payload {
                Some(FsmPayload::StateRead(resp)) => {
                    if let Some(err) = &resp.error {
                        return Err(PluginError::with_detail(PluginErrorKind::Unmarshal, err.msg.clone()));
                    }
                    Ok(resp)
                }
                Some(other) => Err(PluginError::with_detail(
                    PluginErrorKind::UnexpectedFsmToPlugin,
                    other.kind_name(),
                )),
                None => Err(PluginError::new(PluginErrorKind::InvalidFsmToPluginMessage)),
            }
        }
    }

    fn write_state(
        &self,
        fsm_id: u64,
        sets: Vec<(Vec<u8>, Vec<u8>)>,
        deletes: Vec<Vec<u8>>,
    ) -> impl std::future::Future<Output = Result<StateWriteResponse, PluginError>> + Send {
        async move {
            let request = StateWriteRequest {
                sets: sets
                    .into_iter()
                    .map(|(key, value)| StateWriteSet { key, value })
                    .collect(),
                deletes: deletes.into_iter().map(|key| StateWriteDelete { key }).collect(),
            };
            let response = self.send_sync(fsm_id, PluginPayload::StateWrite(request)).await?;
            match response.payload {
                Some(FsmPayload::StateWrite(resp)) => Ok(resp),
                Some(other) => Err(PluginError::with_detail(
                    PluginErrorKind::UnexpectedFsmToPlugin,
                    other.kind_name(),
                )),
                None => Err(PluginError::new(PluginErrorKind::InvalidFsmToPluginMessage)),
            }
        }
    }
}
