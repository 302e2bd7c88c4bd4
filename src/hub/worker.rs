// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{pin::Pin, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A unit of work owned by one context: runs to completion before the next
/// item is pulled, may suspend on I/O.
pub type Task = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// The serial execution region of one context.
///
/// Exactly one task body executes at a time; everything that touches context
/// state goes through [`Worker::schedule`]. Workers never migrate across
/// contexts, so contexts run fully in parallel with each other.
#[derive(Debug)]
pub struct Worker {
    tx: mpsc::UnboundedSender<Task>,
    cancel: CancellationToken,
}

impl Worker {
    /// Spawns the worker loop for `key`. `idle` bounds how long the loop
    /// sleeps between wake-ups when the queue is empty.
    pub fn spawn(key: Arc<str>, idle: Duration, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(key, rx, idle, cancel.clone()));
        Self { tx, cancel }
    }

    /// Enqueues a task. Non-blocking and safe from any task; after shutdown
    /// the item is dropped.
    pub fn schedule<F>(&self, task: F)
    where F: Future<Output = Result<()>> + Send + 'static {
        if self.tx.send(Box::pin(task)).is_err() {
            debug!("task dropped: worker already stopped");
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

async fn run(
    key: Arc<str>,
    mut rx: mpsc::UnboundedReceiver<Task>,
    idle: Duration,
    cancel: CancellationToken,
) {
    debug!(context = %key, "worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            polled = timeout(idle, rx.recv()) => match polled {
                Ok(Some(task)) => {
                    // A failing task never takes the loop down with it.
                    if let Err(e) = task.await {
                        warn!(context = %key, "scheduled task failed: {e:#}");
                    }
                },
                Ok(None) => break,
                // Idle probe elapsed; loop around.
                Err(_) => {},
            },
        }
    }
    debug!(context = %key, "worker stopped");
}
