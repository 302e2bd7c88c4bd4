// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The JSON message taxonomy spoken on a client socket.
//!
//! Every frame is one object tagged by `type`; the transport is assumed to
//! deliver frames whole and in order per socket. Ids travel as 36-char hex
//! strings, action payloads as opaque JSON values (the hub only ever looks
//! at whether they are objects).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::params::SignedGenParams;

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Binds the socket to the context and requests generation parameters
    /// plus an initial snapshot. `last_seen` is a resume hint; the hub
    /// currently always answers with the full state.
    Connect {
        #[serde(default)]
        last_seen: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uuid_params: Option<SignedGenParams>,
    },
    /// One action to run through filter, reducer and fan-out.
    Action { action_id: String, action_data: Value },
}

/// An entry of a `resumeConnection` replay batch (reserved).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumedAction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces_id: Option<String>,
    pub action: Value,
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The requested context does not exist; the socket closes after this.
    InvalidStore,
    NeedAuthentication {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    BadAuthorization {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Successful attachment: snapshot, effective client id and the signed
    /// generation parameters the client must mint ids under.
    Connected {
        initial_state: Value,
        client_id: String,
        uuid_params: SignedGenParams,
    },
    /// Reserved: replay of actions missed since `lastSeen`.
    ResumeConnection { actions: Vec<ResumedAction> },
    /// Reserved: authoritative snapshot replacement.
    ReplaceState { state: Value },
    /// Fan-out of an accepted action to every peer of the sender.
    Action { action: Value, id: String },
    /// The sender's action was accepted under its own id.
    AckAction { id: String },
    /// The sender's action was rewritten by the filter; peers saw `action`.
    ReplaceAction {
        from_id: String,
        to_id: String,
        action: Value,
    },
    /// The sender's action was accepted, but under a server-minted id.
    RenameId { from_id: String, to_id: String },
    RejectAction {
        message: String,
        action_id: String,
    },
}
