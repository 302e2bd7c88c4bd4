// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{pin::Pin, sync::Arc};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use state_hub_rs::{
    cfg::{config::Config, logger::init_logger},
    contract::{ActionFilter, Hydrate, Identity, Verdict},
    hub::{FilterContext, Hub, transport},
    keys::ServerKeypair,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Hydrates every key with an empty object. A real deployment loads the
/// snapshot from wherever state actually lives.
struct EmptyStateHydrate;

impl Hydrate for EmptyStateHydrate {
    fn hydrate<'a>(
        &'a self,
        _key: &'a str,
        _identity: Option<&'a Identity>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send + 'a>> {
        Box::pin(async { Ok(Some(json!({}))) })
    }
}

/// Lets everything through untouched.
struct AcceptAll;

impl ActionFilter for AcceptAll {
    fn filter<'a>(
        &'a self,
        _ctx: FilterContext,
        _action: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<Verdict>> + Send + 'a>> {
        Box::pin(async { Ok(Verdict::Accept) })
    }
}

/// Shallow-merges the action's fields (minus the `type` discriminant) into
/// the state object.
fn merge_reducer(state: &Value, action: &Value) -> Result<Value> {
    let Some(patch) = action.as_object() else {
        bail!("action is not an object");
    };

    let mut next = match state.as_object() {
        Some(map) => map.clone(),
        None => serde_json::Map::new(),
    };
    for (field, value) in patch {
        if field != "type" {
            next.insert(field.clone(), value.clone());
        }
    }
    Ok(Value::Object(next))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let cfg = Config::load(&cfg_path).context("failed to load config")?;

    let _log_guard = init_logger(&cfg.logger)?;

    let keypair = Arc::new(ServerKeypair::load_or_generate(
        &cfg.server.keypair_path,
        cfg.server.keypair_bits,
    )?);

    let hub = Hub::new(
        cfg.runtime.clone(),
        keypair,
        Arc::new(merge_reducer),
        Arc::new(EmptyStateHydrate),
        Arc::new(AcceptAll),
    );

    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.listen_addr))?;

    let cancel = CancellationToken::new();
    let accept_loop =
        tokio::spawn(transport::serve(hub.clone(), listener, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    // serve() drains every socket handler before returning; only then are
    // the context workers stopped.
    accept_loop.await??;
    hub.shutdown().await;

    Ok(())
}
