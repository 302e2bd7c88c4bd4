// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    hub::{Shared, session::ClientSession, worker::Worker},
    uuid7::Uuid7,
};

/// One in-memory state container, keyed by an opaque string.
///
/// State and the id high-water mark are mutated only by tasks running on the
/// context's worker; the client set is a concurrent map so disconnects can
/// detach from any task.
pub struct Context {
    pub key: Arc<str>,
    state: Mutex<Value>,
    last_action_id: Mutex<Uuid7>,
    pub(crate) clients: DashMap<u64, Arc<ClientSession>>,
    worker: Worker,
    pub(crate) shared: Arc<Shared>,
}

impl Context {
    pub(crate) fn new(
        key: Arc<str>,
        initial: Value,
        first_id: Uuid7,
        shared: Arc<Shared>,
    ) -> Arc<Self> {
        let worker = Worker::spawn(
            key.clone(),
            shared.runtime.worker_idle(),
            shared.cancel.child_token(),
        );
        Arc::new(Self {
            key,
            state: Mutex::new(initial),
            last_action_id: Mutex::new(first_id),
            clients: DashMap::new(),
            worker,
            shared,
        })
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> Value {
        self.state.lock().await.clone()
    }

    /// The id of the most recent accepted action; lower bound for
    /// client-supplied ids.
    pub async fn last_action_id(&self) -> Uuid7 {
        *self.last_action_id.lock().await
    }

    /// Installs the reduced state and advances the high-water mark.
    pub(crate) async fn commit(&self, next: Value, id: Uuid7) {
        *self.state.lock().await = next;
        let mut last = self.last_action_id.lock().await;
        *last = (*last).max(id);
    }

    /// Enqueues work onto this context's serial worker.
    pub fn schedule<F>(&self, task: F)
    where F: Future<Output = anyhow::Result<()>> + Send + 'static {
        self.worker.schedule(task);
    }

    pub(crate) fn attach(&self, session: Arc<ClientSession>) {
        self.clients.insert(session.socket_id(), session);
    }

    /// Idempotent; safe from any task.
    pub(crate) fn detach(&self, socket_id: u64) {
        self.clients.remove(&socket_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn stop(&self) {
        self.worker.stop();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("key", &self.key)
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}
