// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Seams between the hub core and its user-supplied collaborators.
//!
//! The hub owns contexts, workers, sessions and the wire; everything
//! domain-specific (what a state looks like, how an action mutates it, and
//! which actions are allowed) comes in through these traits.

use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::pipeline::FilterContext;

/// Authenticated principal attached to a socket by the transport layer.
/// Opaque to the core; forwarded to `Hydrate` and `ActionFilter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    #[serde(default)]
    pub claims: Value,
}

/// Outcome of running the action filter.
///
/// `Accept` carries no payload: the original action goes through untouched.
/// A rewrite is its own variant rather than an identity comparison on the
/// returned value.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accept,
    Rewrite(Value),
    Reject(Option<String>),
    NeedAuth(Option<String>),
    BadAuth(Option<String>),
}

/// Pure, synchronous state transition. Must not observe anything beyond its
/// arguments; the worker discards the result and keeps the old state if it
/// fails.
pub trait Reducer: Send + Sync + 'static {
    fn apply(&self, state: &Value, action: &Value) -> Result<Value>;
}

impl<F> Reducer for F
where F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static
{
    fn apply(&self, state: &Value, action: &Value) -> Result<Value> {
        self(state, action)
    }
}

/// Produces the initial state for a context key, or `None` when no such
/// store exists. Called at most once concurrently per key.
pub trait Hydrate: Send + Sync + 'static {
    fn hydrate<'a>(
        &'a self,
        key: &'a str,
        identity: Option<&'a Identity>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send + 'a>>;
}

/// Screens every action before it reaches the reducer. Runs inside the
/// owning context's worker; may suspend, and may schedule follow-up work
/// through the supplied [`FilterContext`].
pub trait ActionFilter: Send + Sync + 'static {
    fn filter<'a>(
        &'a self,
        ctx: FilterContext,
        action: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<Verdict>> + Send + 'a>>;
}
