// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo transport: newline-delimited JSON over TCP.
//!
//! The first line on a fresh socket names the context key; every following
//! line is one [`ClientMessage`] frame. This module is glue around the core
//! seam: any transport that frames messages and keeps per-socket order can
//! implement [`ClientSocket`] instead.

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::{Context as _, Result, anyhow, ensure};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    hub::{Hub, session::ClientSocket},
    models::{ClientMessage, ServerMessage},
};

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// [`ClientSocket`] over a queue drained by a per-socket writer task.
///
/// The open flag is shared with the writer so a dead TCP write half flips
/// the socket closed without a reference cycle through the queue.
pub struct LineSocket {
    id: u64,
    open: Arc<AtomicBool>,
    tx: mpsc::Sender<ServerMessage>,
}

impl LineSocket {
    pub fn new(tx: mpsc::Sender<ServerMessage>, open: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            open,
            tx,
        })
    }
}

impl ClientSocket for LineSocket {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn send(
        &self,
        msg: ServerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            ensure!(self.is_open(), "socket closed");
            self.tx
                .send(msg)
                .await
                .map_err(|_| anyhow!("socket writer gone"))
        })
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Accept loop; one tracked task per socket, until `cancel` fires.
///
/// Handler tasks live in a `JoinSet`, and `serve` does not return until
/// every one of them has finished its teardown (session close, writer
/// flush), so dropping the runtime never cuts a socket off mid-write.
pub async fn serve(
    hub: Arc<Hub>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<()> {
    info!("listening on {}", listener.local_addr()?);
    let sockets_cancel = cancel.child_token();
    let mut handlers = JoinSet::new();

    let outcome: Result<()> = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            // Reap finished handlers so the set does not grow unbounded.
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {},
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "socket opened");
                    let hub = hub.clone();
                    let socket_cancel = sockets_cancel.child_token();
                    handlers.spawn(async move {
                        if let Err(e) =
                            handle_socket(hub, stream, socket_cancel).await
                        {
                            debug!(%peer, "socket ended with error: {e:#}");
                        }
                    });
                },
                Err(e) => break Err(anyhow::Error::new(e).context("accept failed")),
            },
        }
    };

    sockets_cancel.cancel();
    while handlers.join_next().await.is_some() {}
    outcome
}

async fn handle_socket(
    hub: Arc<Hub>,
    stream: TcpStream,
    cancel: CancellationToken,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (r, w) = stream.into_split();
    let mut lines = BufReader::new(r).lines();

    // Route glue: the first line names the context key.
    let key = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        line = lines.next_line() => line?
            .context("socket closed before naming a context")?,
    };
    let key = key.trim().to_string();
    ensure!(!key.is_empty(), "empty context key");

    let (tx, rx) = mpsc::channel::<ServerMessage>(64);
    let open = Arc::new(AtomicBool::new(true));
    let socket = LineSocket::new(tx, open.clone());
    let writer_task = tokio::spawn(write_loop(rx, w, open));

    let session = hub
        .open_session(&key, None, socket.clone() as Arc<dyn ClientSocket>)
        .await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(text)) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => session.receive(msg).await,
                        Err(e) => {
                            warn!(context = %key, "undecodable frame skipped: {e}");
                        },
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(context = %key, "read failed: {e}");
                    break;
                },
            },
        }
    }

    session.close().await;
    drop(session);
    drop(socket);
    let _ = writer_task.await;
    Ok(())
}

async fn write_loop(
    mut rx: mpsc::Receiver<ServerMessage>,
    mut writer: OwnedWriteHalf,
    open: Arc<AtomicBool>,
) {
    while let Some(msg) = rx.recv().await {
        let mut line = match serde_json::to_vec(&msg) {
            Ok(line) => line,
            Err(e) => {
                warn!("unencodable frame skipped: {e}");
                continue;
            },
        };
        line.push(b'\n');
        if writer.write_all(&line).await.is_err() {
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
    let _ = writer.shutdown().await;
}
