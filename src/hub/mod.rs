// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod context;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod transport;
pub mod worker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::RuntimeConfig,
    contract::{ActionFilter, Hydrate, Identity, Reducer},
    hub::registry::ContextRegistry,
    keys::{ParamService, ServerKeypair},
    uuid7::Minter,
};

pub use context::Context;
pub use pipeline::FilterContext;
pub use session::{ClientSession, ClientSocket};

/// Everything contexts and sessions share: collaborators, the signed
/// parameter service, the authoritative minter and the shutdown token.
pub(crate) struct Shared {
    pub(crate) reducer: Arc<dyn Reducer>,
    pub(crate) filter: Arc<dyn ActionFilter>,
    pub(crate) hydrate: Arc<dyn Hydrate>,
    pub(crate) params: ParamService,
    pub(crate) minter: Minter,
    pub(crate) runtime: RuntimeConfig,
    pub(crate) cancel: CancellationToken,
}

/// The authoritative replication hub.
///
/// Owns the context registry and hands out sessions; the transport layer
/// feeds decoded frames into sessions and reports socket closure.
pub struct Hub {
    shared: Arc<Shared>,
    registry: ContextRegistry,
}

impl Hub {
    pub fn new(
        runtime: RuntimeConfig,
        keypair: Arc<ServerKeypair>,
        reducer: Arc<dyn Reducer>,
        hydrate: Arc<dyn Hydrate>,
        filter: Arc<dyn ActionFilter>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            reducer,
            filter,
            hydrate,
            params: ParamService::new(keypair),
            minter: Minter::random(),
            runtime,
            cancel: CancellationToken::new(),
        });
        Arc::new(Self {
            registry: ContextRegistry::new(shared.clone()),
            shared,
        })
    }

    /// Binds a freshly opened socket to `key`. The session starts buffering
    /// immediately; attachment (and hydration, if the key is cold) proceeds
    /// in the background.
    pub async fn open_session(
        self: &Arc<Self>,
        key: &str,
        identity: Option<Identity>,
        socket: Arc<dyn ClientSocket>,
    ) -> Arc<ClientSession> {
        let auto_client_id = self.shared.minter.mint().await;
        let session = Arc::new(ClientSession::new(
            auto_client_id,
            Arc::from(key),
            identity,
            socket,
            self.shared.clone(),
        ));

        let hub = self.clone();
        let attaching = session.clone();
        tokio::spawn(async move {
            attaching.attach(&hub.registry).await;
        });

        session
    }

    /// Completed contexts only; never hydrates.
    pub async fn context(&self, key: &str) -> Option<Arc<Context>> {
        self.registry.get(key).await
    }

    /// Cancels every context worker and anything derived from the hub's
    /// shutdown token. In-flight tasks finish; queued ones are dropped.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.registry.stop_all().await;
    }
}
