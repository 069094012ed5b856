//! Wire message types for the plugin<->FSM protocol.
//!
//! The protobuf schema itself is treated as an opaque codec by the rest of
//! the crate: these are plain [`prost::Message`]/[`prost::Oneof`] types with
//! `encode`/`decode` supplied by `prost`, not a hand-rolled format.

use prost::{Message, Oneof};

#[derive(Clone, PartialEq, Message)]
pub struct ProtoError {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub module: String,
    #[prost(string, tag = "3")]
    pub msg: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct PluginConfig {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(uint64, tag = "3")]
    pub version: u64,
    #[prost(string, repeated, tag = "4")]
    pub supported_transactions: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Account {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Pool {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct FeeParams {
    #[prost(uint64, tag = "1")]
    pub send_fee: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MessageSend {
    #[prost(bytes = "vec", tag = "1")]
    pub from_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub to_address: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub amount: u64,
}

/// Minimal, local stand-in for `google.protobuf.Any`: a type discriminator
/// plus the encoded bytes of the typed payload it names.
#[derive(Clone, PartialEq, Message)]
pub struct AnyMessage {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// Accepted `typeUrl` spellings for [`MessageSend`].
pub const MESSAGE_SEND_TYPE_URLS: &[&str] = &["types.MessageSend", "MessageSend"];

#[derive(Clone, PartialEq, Message)]
pub struct TxEnvelope {
    #[prost(uint64, tag = "1")]
    pub fee: u64,
    #[prost(message, optional, tag = "2")]
    pub msg: Option<AnyMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateReadQuery {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateReadRequest {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<StateReadQuery>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateReadEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateReadResult {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<StateReadEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateReadResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<StateReadResult>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateWriteSet {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateWriteDelete {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateWriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub sets: Vec<StateWriteSet>,
    #[prost(message, repeated, tag = "2")]
    pub deletes: Vec<StateWriteDelete>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateWriteResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GenesisRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GenesisResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BeginBlockRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct BeginBlockResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EndBlockRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct EndBlockResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CheckTxRequest {
    #[prost(message, optional, tag = "1")]
    pub tx: Option<TxEnvelope>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CheckTxResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub recipient: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub authorized_signers: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub error: Option<ProtoError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeliverTxRequest {
    #[prost(message, optional, tag = "1")]
    pub tx: Option<TxEnvelope>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeliverTxResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<ProtoError>,
}

/// Payload carried by a message travelling FSM -> plugin: either a new
/// request for the contract, or a response to one of the plugin's own
/// outbound `config`/`stateRead`/`stateWrite` calls.
#[derive(Clone, PartialEq, Oneof)]
pub enum FsmPayload {
    #[prost(message, tag = "2")]
    Config(PluginConfig),
    #[prost(message, tag = "3")]
    Genesis(GenesisRequest),
    #[prost(message, tag = "4")]
    Begin(BeginBlockRequest),
    #[prost(message, tag = "5")]
    Check(CheckTxRequest),
    #[prost(message, tag = "6")]
    Deliver(DeliverTxRequest),
    #[prost(message, tag = "7")]
    End(EndBlockRequest),
    #[prost(message, tag = "8")]
    StateRead(StateReadResponse),
    #[prost(message, tag = "9")]
    StateWrite(StateWriteResponse),
    #[prost(message, tag = "10")]
    Error(ProtoError),
}

impl FsmPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Genesis(_) => "genesis",
            Self::Begin(_) => "begin",
            Self::Check(_) => "check",
            Self::Deliver(_) => "deliver",
            Self::End(_) => "end",
            Self::StateRead(_) => "stateRead",
            Self::StateWrite(_) => "stateWrite",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct FsmToPlugin {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(oneof = "FsmPayload", tags = "2,3,4,5,6,7,8,9,10")]
    pub payload: Option<FsmPayload>,
}

/// Payload carried by a message travelling plugin -> FSM: either a reply to
/// an inbound contract request, or one of the plugin's own outbound calls
/// (`config` handshake, `stateRead`, `stateWrite`).
#[derive(Clone, PartialEq, Oneof)]
pub enum PluginPayload {
    #[prost(message, tag = "2")]
    Config(PluginConfig),
    #[prost(message, tag = "3")]
    Genesis(GenesisResponse),
    #[prost(message, tag = "4")]
    Begin(BeginBlockResponse),
    #[prost(message, tag = "5")]
    Check(CheckTxResponse),
    #[prost(message, tag = "6")]
    Deliver(DeliverTxResponse),
    #[prost(message, tag = "7")]
    End(EndBlockResponse),
    #[prost(message, tag = "8")]
    StateRead(StateReadRequest),
    #[prost(message, tag = "9")]
    StateWrite(StateWriteRequest),
    #[prost(message, tag = "10")]
    Error(ProtoError),
}

#[derive(Clone, PartialEq, Message)]
pub struct PluginToFsm {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(oneof = "PluginPayload", tags = "2,3,4,5,6,7,8,9,10")]
    pub payload: Option<PluginPayload>,
}

impl PluginToFsm {
    pub fn new(id: u64, payload: PluginPayload) -> Self {
        Self {
            id,
            payload: Some(payload),
        }
    }
}
