//! Routes an inbound `FsmToPlugin` frame to either a pending completion
//! (it answers one of the plugin's own outbound calls) or a contract
//! handler (it's a new request from the FSM).

use std::sync::Arc;

use tracing::warn;

use crate::contract::SendContract;
use crate::plugin_client::PluginClient;
use crate::proto::{FsmPayload, FsmToPlugin, PluginPayload};
use crate::error::{PluginError, PluginErrorKind};

pub async fn dispatch(client: &Arc<PluginClient>, contract: &SendContract, msg: FsmToPlugin) {
    let id = msg.id;

    if let Some(pending) = client.take_pending(id) {
        let _ = pending.send(msg);
        return;
    }

    let Some(payload) = msg.payload else {
        reply_error(client, id, PluginError::with_detail(
            PluginErrorKind::InvalidFsmToPluginMessage,
            "empty payload",
        ))
        .await;
        return;
    };

    let reply = match payload {
        FsmPayload::Config(_) => {
            reply_error(
                client,
                id,
                PluginError::with_detail(PluginErrorKind::UnexpectedFsmToPlugin, "config"),
            )
            .await;
            return;
        }
        FsmPayload::Genesis(req) => PluginPayload::Genesis(contract.genesis(req).await),
        FsmPayload::Begin(req) => PluginPayload::Begin(contract.begin_block(req).await),
        FsmPayload::Check(req) => {
            PluginPayload::Check(contract.check_tx(req, id, client.as_ref()).await)
        }
        FsmPayload::Deliver(req) => {
            PluginPayload::Deliver(contract.deliver_tx(req, id, client.as_ref()).await)
        }
        FsmPayload::End(req) => PluginPayload::End(contract.end_block(req).await),
        FsmPayload::StateRead(_) | FsmPayload::StateWrite(_) => {
            warn!(id, kind = "stateRead/stateWrite", "unexpected request-shaped message, ignoring");
            return;
        }
        FsmPayload::Error(err) => {
            warn!(id, code = err.code, msg = %err.msg, "FSM sent an unsolicited error, ignoring");
            return;
        }
    };

    if let Err(e) = client.reply(id, reply).await {
        warn!(id, error = %e, "failed to write reply frame");
    }
}

async fn reply_error(client: &Arc<PluginClient>, id: u64, err: PluginError) {
    if let Err(e) = client.reply(id, PluginPayload::Error(err.into())).await {
        warn!(id, error = %e, "failed to write error reply frame");
    }
}
