// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-action dispatch path: id policy, filter verdict, reducer
//! application, sender acknowledgment and fan-out.
//!
//! [`dispatch`] always runs as a task on the owning context's worker, which
//! is what makes the whole sequence race-free against every other dispatch
//! and scheduled item on the same key.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    contract::{Identity, Verdict},
    hub::{context::Context, session::ClientSession},
    models::ServerMessage,
    uuid7::Uuid7,
};

/// What the action filter gets to see and do. Scheduling is bound to the
/// owning context's worker; `verify_uuid` checks a claimed id against the
/// generation parameters issued to the sending client.
pub struct FilterContext {
    context: Arc<Context>,
    session: Arc<ClientSession>,
}

impl FilterContext {
    pub fn key(&self) -> &str {
        &self.context.key
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    pub async fn state(&self) -> Value {
        self.context.state().await
    }

    pub fn schedule<F>(&self, task: F)
    where F: Future<Output = Result<()>> + Send + 'static {
        self.context.schedule(task);
    }

    pub async fn verify_uuid(&self, claim: &str) -> bool {
        self.session.verify_claimed_uuid(claim).await
    }
}

fn default_fault_message(resp_type: &str) -> String {
    format!("no extra message given for {resp_type}")
}

/// Runs one client action through the full pipeline. Never fails the worker:
/// collaborator errors are logged and leave the state untouched.
pub(crate) async fn dispatch(
    ctx: Arc<Context>,
    sender: Arc<ClientSession>,
    action_id: String,
    action_data: Value,
) -> Result<()> {
    // Non-object payloads are dropped outright so the reducer never sees a
    // bare string or number.
    if !action_data.is_object() {
        debug!(context = %ctx.key, "dropping non-object action payload");
        return Ok(());
    }

    // Id policy: accept the client id only inside (lastActionId, next].
    // Anything stale, future-dated or unparsable gets the minted id.
    let next = ctx.shared.minter.mint().await;
    let last = ctx.last_action_id().await;
    let claimed = action_id.parse::<Uuid7>().ok().filter(Uuid7::is_v7);
    let id = match claimed {
        Some(u) if u > last && u <= next => u,
        _ => next,
    };

    let verdict = {
        let fctx = FilterContext {
            context: ctx.clone(),
            session: sender.clone(),
        };
        ctx.shared.filter.filter(fctx, &action_data).await
    };

    let (accepted, replaced) = match verdict {
        Err(e) => {
            warn!(context = %ctx.key, "action filter failed: {e:#}");
            return Ok(());
        },
        Ok(Verdict::Reject(msg)) => {
            sender
                .send_best_effort(ServerMessage::RejectAction {
                    message: msg
                        .unwrap_or_else(|| default_fault_message("rejectAction")),
                    action_id,
                })
                .await;
            return Ok(());
        },
        Ok(Verdict::NeedAuth(msg)) => {
            sender
                .send_best_effort(ServerMessage::NeedAuthentication {
                    action_id: Some(action_id),
                    message: Some(
                        msg.unwrap_or_else(|| {
                            default_fault_message("needAuthentication")
                        }),
                    ),
                })
                .await;
            return Ok(());
        },
        Ok(Verdict::BadAuth(msg)) => {
            sender
                .send_best_effort(ServerMessage::BadAuthorization {
                    action_id: Some(action_id),
                    message: Some(
                        msg.unwrap_or_else(|| {
                            default_fault_message("badAuthorization")
                        }),
                    ),
                })
                .await;
            return Ok(());
        },
        Ok(Verdict::Accept) => (action_data, false),
        Ok(Verdict::Rewrite(action)) => (action, true),
    };

    // Reducer failure: recover, log, keep the old state, answer nothing.
    let current = ctx.state().await;
    let reduced = match ctx.shared.reducer.apply(&current, &accepted) {
        Ok(next_state) => next_state,
        Err(e) => {
            warn!(context = %ctx.key, action = %id, "reducer failed: {e:#}");
            return Ok(());
        },
    };
    ctx.commit(reduced, id).await;

    // Exactly one response to the sender.
    let response = if replaced {
        ServerMessage::ReplaceAction {
            from_id: action_id,
            to_id: id.to_string(),
            action: accepted.clone(),
        }
    } else if claimed == Some(id) {
        ServerMessage::AckAction { id: action_id }
    } else {
        ServerMessage::RenameId {
            from_id: action_id,
            to_id: id.to_string(),
        }
    };
    sender.send_best_effort(response).await;

    // Fan-out to every attached peer; completes before the worker pulls the
    // next item.
    let peers: Vec<Arc<ClientSession>> = ctx
        .clients
        .iter()
        .filter(|entry| entry.value().auto_client_id() != sender.auto_client_id())
        .map(|entry| entry.value().clone())
        .collect();
    let id_text = id.to_string();
    for peer in peers {
        peer.send_best_effort(ServerMessage::Action {
            action: accepted.clone(),
            id: id_text.clone(),
        })
        .await;
    }

    Ok(())
}
