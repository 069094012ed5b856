pub mod codec;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod logging;
pub mod plugin_client;
pub mod proto;
pub mod sig_down;
