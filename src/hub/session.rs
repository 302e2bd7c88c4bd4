// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::VecDeque, fmt, pin::Pin, sync::Arc};

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    contract::Identity,
    hub::{Shared, context::Context, pipeline, registry::ContextRegistry},
    models::{ClientMessage, ServerMessage, SignedGenParams},
    uuid7::{GenState, Uuid7},
};

/// The transport seam a session talks through.
///
/// Implementations deliver already-framed messages; ordering per socket is
/// the transport's responsibility. `send` is best-effort: the hub logs
/// failures and moves on.
pub trait ClientSocket: Send + Sync + 'static {
    /// Stable handle identifying this socket inside a context's client set.
    fn id(&self) -> u64;

    fn is_open(&self) -> bool;

    fn send(
        &self,
        msg: ServerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Idempotent. After this, `is_open` reports false and sends fail fast.
    fn close(&self);
}

enum SessionPhase {
    /// Context lookup in flight; inbound frames pile up, bounded.
    Buffering(VecDeque<ClientMessage>),
    Live,
    Closed,
}

/// One binding of a socket to a context.
pub struct ClientSession {
    auto_client_id: Uuid7,
    context_key: Arc<str>,
    identity: Option<Identity>,
    socket: Arc<dyn ClientSocket>,
    shared: Arc<Shared>,
    phase: Mutex<SessionPhase>,
    context: OnceCell<Arc<Context>>,
    client_id: Mutex<Option<String>>,
    gen_params: Mutex<Option<SignedGenParams>>,
    gen_state: Mutex<Option<GenState>>,
}

impl ClientSession {
    pub(crate) fn new(
        auto_client_id: Uuid7,
        context_key: Arc<str>,
        identity: Option<Identity>,
        socket: Arc<dyn ClientSocket>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            auto_client_id,
            context_key,
            identity,
            socket,
            shared,
            phase: Mutex::new(SessionPhase::Buffering(VecDeque::new())),
            context: OnceCell::new(),
            client_id: Mutex::new(None),
            gen_params: Mutex::new(None),
            gen_state: Mutex::new(None),
        }
    }

    /// Server-minted fan-out identity; stable for the socket's lifetime.
    pub fn auto_client_id(&self) -> Uuid7 {
        self.auto_client_id
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// Principal the transport authenticated this socket as, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub(crate) fn socket_id(&self) -> u64 {
        self.socket.id()
    }

    pub async fn is_live(&self) -> bool {
        matches!(*self.phase.lock().await, SessionPhase::Live)
    }

    /// The signed bundle issued (or re-accepted) on the last `connect`.
    pub async fn issued_params(&self) -> Option<SignedGenParams> {
        self.gen_params.lock().await.clone()
    }

    /// Feeds one decoded client frame in. Frames arriving while the context
    /// hydrates are buffered and replayed in arrival order once attached.
    pub async fn receive(self: &Arc<Self>, msg: ClientMessage) {
        let mut phase = self.phase.lock().await;
        match &mut *phase {
            SessionPhase::Buffering(inbox) => {
                if inbox.len() >= self.shared.runtime.pending_inbox_limit {
                    warn!(
                        context = %self.context_key,
                        "pending inbox full, dropping frame"
                    );
                } else {
                    inbox.push_back(msg);
                }
            },
            // The phase lock is held across handling, so frames cannot
            // overtake a replay still in progress.
            SessionPhase::Live => self.handle_live(msg).await,
            SessionPhase::Closed => {
                debug!(context = %self.context_key, "frame after close dropped");
            },
        }
    }

    /// Resolves the context and brings the session live (or tears it down).
    pub(crate) async fn attach(self: &Arc<Self>, registry: &ContextRegistry) {
        match registry
            .get_or_create(&self.context_key, self.identity.as_ref())
            .await
        {
            Err(e) => {
                warn!(context = %self.context_key, "hydration failed: {e:#}");
                self.close().await;
            },
            Ok(None) => {
                self.send_best_effort(ServerMessage::InvalidStore).await;
                self.close().await;
            },
            Ok(Some(ctx)) => {
                // Hydration may have taken a while; a socket that went away
                // in the meantime is dropped silently.
                if !self.socket.is_open() {
                    self.close().await;
                    return;
                }
                let _ = self.context.set(ctx.clone());
                ctx.attach(self.clone());
                if !self.go_live().await {
                    ctx.detach(self.socket_id());
                }
            },
        }
    }

    /// Swaps Buffering -> Live and replays the inbox through the live
    /// handler. Returns false when the session closed underneath us.
    async fn go_live(self: &Arc<Self>) -> bool {
        let mut phase = self.phase.lock().await;
        let inbox = match &mut *phase {
            SessionPhase::Buffering(inbox) => std::mem::take(inbox),
            SessionPhase::Live => return true,
            SessionPhase::Closed => return false,
        };
        *phase = SessionPhase::Live;
        for msg in inbox {
            self.handle_live(msg).await;
        }
        true
    }

    async fn handle_live(self: &Arc<Self>, msg: ClientMessage) {
        match msg {
            ClientMessage::Connect {
                last_seen,
                client_id,
                uuid_params,
            } => self.handle_connect(last_seen, client_id, uuid_params).await,
            ClientMessage::Action {
                action_id,
                action_data,
            } => self.enqueue_action(action_id, action_data),
        }
    }

    async fn handle_connect(
        self: &Arc<Self>,
        last_seen: String,
        client_id: Option<String>,
        presented: Option<SignedGenParams>,
    ) {
        let Some(ctx) = self.context.get() else {
            return;
        };

        if let Some(id) = client_id {
            *self.client_id.lock().await = Some(id);
        }
        if !last_seen.is_empty() {
            // TODO: replay actions since lastSeen instead of the full
            // snapshot once a retention buffer exists.
            debug!(context = %self.context_key, %last_seen, "resume hint ignored");
        }

        // A bundle that fails verification is discarded, not rejected: the
        // client simply mints under fresh parameters from here on.
        let bundle = match presented {
            Some(b) if self.shared.params.verify(&b) => b,
            Some(_) => {
                debug!(
                    context = %self.context_key,
                    "presented generation parameters failed verification"
                );
                self.shared.params.mint_signed()
            },
            None => self.shared.params.mint_signed(),
        };

        match self.shared.params.decode(&bundle) {
            Ok(state) => *self.gen_state.lock().await = Some(state),
            Err(e) => {
                warn!(context = %self.context_key, "undecodable parameter bundle: {e:#}");
                return;
            },
        }
        *self.gen_params.lock().await = Some(bundle.clone());

        let effective_id = match &*self.client_id.lock().await {
            Some(id) => id.clone(),
            None => self.auto_client_id.to_string(),
        };
        let snapshot = ctx.state().await;
        self.send_best_effort(ServerMessage::Connected {
            initial_state: snapshot,
            client_id: effective_id,
            uuid_params: bundle,
        })
        .await;
    }

    /// Hands the action to the owning context's worker; the pipeline does
    /// the rest there, serialized against every other dispatch on the key.
    fn enqueue_action(self: &Arc<Self>, action_id: String, action_data: Value) {
        let Some(ctx) = self.context.get() else {
            return;
        };
        let sender = self.clone();
        ctx.schedule(pipeline::dispatch(ctx.clone(), sender, action_id, action_data));
    }

    /// Tears the session down: phase to Closed, socket closed, detached from
    /// the context. Idempotent and callable from any task.
    pub async fn close(&self) {
        {
            let mut phase = self.phase.lock().await;
            if matches!(*phase, SessionPhase::Closed) {
                return;
            }
            *phase = SessionPhase::Closed;
        }
        self.socket.close();
        if let Some(ctx) = self.context.get() {
            ctx.detach(self.socket_id());
        }
        debug!(
            context = %self.context_key,
            client = %self.auto_client_id,
            "session closed"
        );
    }

    pub(crate) async fn send_best_effort(&self, msg: ServerMessage) {
        if !self.socket.is_open() {
            return;
        }
        if let Err(e) = self.socket.send(msg).await {
            debug!(context = %self.context_key, "send failed: {e:#}");
        }
    }

    /// Parses a claimed id, re-derives it under the generation parameters
    /// issued to this client and compares bytes. Non-v7 input never passes.
    pub(crate) async fn verify_claimed_uuid(&self, claim: &str) -> bool {
        let Ok(parsed) = claim.parse::<Uuid7>() else {
            return false;
        };
        if !parsed.is_v7() {
            return false;
        }
        let guard = self.gen_state.lock().await;
        let Some(state) = guard.as_ref() else {
            return false;
        };
        state.reconstruct(&parsed) == parsed
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("auto_client_id", &self.auto_client_id)
            .field("context_key", &self.context_key)
            .field("socket_id", &self.socket.id())
            .finish_non_exhaustive()
    }
}
