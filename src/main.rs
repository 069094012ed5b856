//! Send-plugin entrypoint.
//!
//! This binary connects to the FSM over a Unix socket, performs the config
//! handshake, and serves `genesis`/`beginBlock`/`checkTx`/`deliverTx`/
//! `endBlock` for the `send` transaction type until the process receives
//! SIGTERM/SIGINT.
//!
//! Environment:
//! - `CONFIG` – path to the JSON config file (default `plugin_config.json`)
//! - `LOG_LEVEL` – tracing filter directive (default `info`)

use std::sync::Arc;

use send_plugin::config::Config;
use send_plugin::contract::SendContract;
use send_plugin::logging;
use send_plugin::plugin_client::PluginClient;
use send_plugin::sig_down::SigDown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = Config::load()?;
    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let contract = Arc::new(SendContract::new(config.chain_id));
    let client = PluginClient::new(&config);
    client.start(contract);

    tracing::info!("send plugin starting, waiting for FSM connection");
    cancellation.cancelled().await;
    tracing::info!("shutdown signal received, closing plugin connection");
    client.close().await;

    Ok(())
}
