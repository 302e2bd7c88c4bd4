// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context as _, Result, bail};
use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::{
    contract::Identity,
    hub::{Shared, context::Context},
};

/// Resolution of one in-flight hydration, observed by every coalesced
/// caller.
#[derive(Clone)]
enum HydrationSlot {
    InFlight,
    /// `None` means the key does not exist; nothing is cached for it.
    Ready(Option<Arc<Context>>),
    Failed(Arc<str>),
}

struct RegistryInner {
    contexts: HashMap<String, Arc<Context>>,
    pending: HashMap<String, watch::Receiver<HydrationSlot>>,
}

/// Key -> context map with single-flight creation.
///
/// The inner mutex serializes map mutation only; it is never held across the
/// hydrate call. Concurrent `get_or_create` calls on a cold key elect one
/// leader, everyone else awaits the leader's watch channel; at most one
/// hydrate per key is ever in flight.
pub(crate) struct ContextRegistry {
    shared: Arc<Shared>,
    inner: Mutex<RegistryInner>,
}

enum Role {
    Lead(watch::Sender<HydrationSlot>),
    Follow(watch::Receiver<HydrationSlot>),
}

impl ContextRegistry {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            inner: Mutex::new(RegistryInner {
                contexts: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub(crate) async fn get_or_create(
        &self,
        key: &str,
        identity: Option<&Identity>,
    ) -> Result<Option<Arc<Context>>> {
        let role = {
            let mut inner = self.inner.lock().await;
            if let Some(ctx) = inner.contexts.get(key) {
                return Ok(Some(ctx.clone()));
            }
            match inner.pending.get(key) {
                Some(rx) => Role::Follow(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(HydrationSlot::InFlight);
                    inner.pending.insert(key.to_string(), rx);
                    Role::Lead(tx)
                },
            }
        };

        match role {
            Role::Follow(rx) => await_leader(key, rx).await,
            Role::Lead(tx) => {
                let outcome = self.hydrate_one(key, identity).await;
                let slot = match &outcome {
                    Ok(ctx) => HydrationSlot::Ready(ctx.clone()),
                    Err(e) => HydrationSlot::Failed(Arc::from(format!("{e:#}"))),
                };
                self.inner.lock().await.pending.remove(key);
                let _ = tx.send(slot);
                outcome
            },
        }
    }

    async fn hydrate_one(
        &self,
        key: &str,
        identity: Option<&Identity>,
    ) -> Result<Option<Arc<Context>>> {
        let initial = self
            .shared
            .hydrate
            .hydrate(key, identity)
            .await
            .with_context(|| format!("hydrate({key}) failed"))?;

        let Some(initial) = initial else {
            debug!(context = %key, "no such store");
            return Ok(None);
        };

        let first_id = self.shared.minter.mint().await;
        let ctx = Context::new(Arc::from(key), initial, first_id, self.shared.clone());
        self.inner
            .lock()
            .await
            .contexts
            .insert(key.to_string(), ctx.clone());
        debug!(context = %key, "context hydrated");
        Ok(Some(ctx))
    }

    /// Completed contexts only; never triggers hydration.
    pub(crate) async fn get(&self, key: &str) -> Option<Arc<Context>> {
        self.inner.lock().await.contexts.get(key).cloned()
    }

    pub(crate) async fn stop_all(&self) {
        for ctx in self.inner.lock().await.contexts.values() {
            ctx.stop();
        }
    }
}

async fn await_leader(
    key: &str,
    mut rx: watch::Receiver<HydrationSlot>,
) -> Result<Option<Arc<Context>>> {
    loop {
        let slot = rx.borrow().clone();
        match slot {
            HydrationSlot::InFlight => {
                if rx.changed().await.is_err() {
                    bail!("hydration of {key} aborted");
                }
            },
            HydrationSlot::Ready(ctx) => return Ok(ctx),
            HydrationSlot::Failed(msg) => bail!("hydration of {key} failed: {msg}"),
        }
    }
}
