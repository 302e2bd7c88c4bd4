// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use serde_json::json;
use state_hub_rs::{
    keys::ParamService,
    models::{ServerMessage, SignedGenParams},
    uuid7::Uuid7,
};
use tokio::time::sleep;

use super::common::{
    AcceptAll, KEYPAIR, MapHydrate, TestSocket, action_frame, connect_frame,
    hub_with, recv,
};

const STALE_ID: &str = "00000000-0000-7000-8000-000000000000";
const FUTURE_ID: &str = "ffffffff-ffff-7fff-bfff-ffffffffffff";

/// Connects and returns the issued bundle for client-side minting.
async fn connect(
    session: &Arc<state_hub_rs::hub::ClientSession>,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerMessage>,
) -> SignedGenParams {
    session.receive(connect_frame()).await;
    let ServerMessage::Connected { uuid_params, .. } = recv(rx).await else {
        panic!("expected connected frame");
    };
    uuid_params
}

#[tokio::test]
async fn test_in_window_id_is_acked() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    let bundle = connect(&session, &mut rx).await;

    // Mint strictly after the context's initial id and strictly before the
    // dispatch-time override candidate.
    sleep(Duration::from_millis(20)).await;
    let mut client_state = ParamService::new(KEYPAIR.clone())
        .decode(&bundle)
        .expect("decode");
    let claim = client_state.mint();
    sleep(Duration::from_millis(20)).await;

    session
        .receive(action_frame(&claim.to_string(), json!({"type": "inc"})))
        .await;

    let ServerMessage::AckAction { id } = recv(&mut rx).await else {
        panic!("expected ack");
    };
    assert_eq!(id, claim.to_string());

    let ctx = hub.context("room/a").await.expect("context");
    assert_eq!(ctx.state().await, json!({"count": 1}));
    assert_eq!(ctx.last_action_id().await, claim);
}

#[tokio::test]
async fn test_stale_id_is_renamed() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    let ctx = hub.context("room/a").await.expect("context");
    let floor = ctx.last_action_id().await;

    session
        .receive(action_frame(STALE_ID, json!({"type": "inc"})))
        .await;

    let ServerMessage::RenameId { from_id, to_id } = recv(&mut rx).await else {
        panic!("expected rename");
    };
    assert_eq!(from_id, STALE_ID);
    let minted: Uuid7 = to_id.parse().expect("minted id");
    assert!(minted > floor, "override id must advance the high-water mark");

    assert_eq!(ctx.state().await, json!({"count": 1}));
    assert_eq!(ctx.last_action_id().await, minted);
}

#[tokio::test]
async fn test_future_dated_id_is_renamed() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    session
        .receive(action_frame(FUTURE_ID, json!({"type": "inc"})))
        .await;

    let ServerMessage::RenameId { from_id, to_id } = recv(&mut rx).await else {
        panic!("expected rename");
    };
    assert_eq!(from_id, FUTURE_ID);
    assert!(to_id.parse::<Uuid7>().is_ok());
}

#[tokio::test]
async fn test_replaying_last_accepted_id_is_stale() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    session
        .receive(action_frame(STALE_ID, json!({"type": "inc"})))
        .await;
    let ServerMessage::RenameId { to_id, .. } = recv(&mut rx).await else {
        panic!("expected rename");
    };

    // Equal to lastActionId: still stale, must not be acked.
    session
        .receive(action_frame(&to_id, json!({"type": "inc"})))
        .await;
    let ServerMessage::RenameId {
        from_id,
        to_id: next_id,
    } = recv(&mut rx).await
    else {
        panic!("expected rename for replayed id");
    };
    assert_eq!(from_id, to_id);
    assert!(next_id.parse::<Uuid7>().expect("id") > to_id.parse().expect("id"));
}

#[tokio::test]
async fn test_unparsable_id_is_renamed() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    session
        .receive(action_frame("not-a-uuid", json!({"type": "inc"})))
        .await;

    let ServerMessage::RenameId { from_id, .. } = recv(&mut rx).await else {
        panic!("expected rename");
    };
    assert_eq!(from_id, "not-a-uuid");
}

#[tokio::test]
async fn test_non_object_payload_is_dropped() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    session.receive(action_frame(STALE_ID, json!("inc"))).await;
    session.receive(action_frame(STALE_ID, json!(42))).await;

    super::common::assert_silent(&mut rx).await;
    let ctx = hub.context("room/a").await.expect("context");
    assert_eq!(ctx.state().await, json!({"count": 0}));
}

#[tokio::test]
async fn test_reducer_failure_leaves_state_and_worker_alive() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    session
        .receive(action_frame(STALE_ID, json!({"type": "boom"})))
        .await;
    super::common::assert_silent(&mut rx).await;

    let ctx = hub.context("room/a").await.expect("context");
    assert_eq!(ctx.state().await, json!({"count": 0}));

    // The worker loop survived and keeps dispatching.
    session
        .receive(action_frame(STALE_ID, json!({"type": "inc"})))
        .await;
    assert!(matches!(recv(&mut rx).await, ServerMessage::RenameId { .. }));
    assert_eq!(ctx.state().await, json!({"count": 1}));
}

#[tokio::test]
async fn test_last_action_id_is_monotonic() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/a", None, socket).await;
    connect(&session, &mut rx).await;

    let ctx = hub.context("room/a").await.expect("context");
    let mut watermark = ctx.last_action_id().await;
    for _ in 0..5 {
        session
            .receive(action_frame(STALE_ID, json!({"type": "inc"})))
            .await;
        let ServerMessage::RenameId { to_id, .. } = recv(&mut rx).await else {
            panic!("expected rename");
        };
        let accepted: Uuid7 = to_id.parse().expect("id");
        assert!(accepted > watermark);
        assert_eq!(ctx.last_action_id().await, accepted);
        watermark = accepted;
    }
    assert_eq!(ctx.state().await, json!({"count": 5}));
}

#[tokio::test]
async fn test_frames_buffered_during_hydration_replay_in_order() {
    let hydrate = MapHydrate::with_delay(
        "room/buf",
        json!({"count": 0}),
        Duration::from_millis(100),
    );
    let hub = hub_with(hydrate, Arc::new(AcceptAll));
    let (socket, mut rx) = TestSocket::pair();
    let session = hub.open_session("room/buf", None, socket).await;

    // All of these land while the context is still hydrating.
    session.receive(connect_frame()).await;
    session
        .receive(action_frame(STALE_ID, json!({"type": "inc"})))
        .await;
    session
        .receive(action_frame(STALE_ID, json!({"type": "inc"})))
        .await;

    assert!(matches!(recv(&mut rx).await, ServerMessage::Connected { .. }));
    assert!(matches!(recv(&mut rx).await, ServerMessage::RenameId { .. }));
    assert!(matches!(recv(&mut rx).await, ServerMessage::RenameId { .. }));

    let ctx = hub.context("room/buf").await.expect("context");
    assert_eq!(ctx.state().await, json!({"count": 2}));
}
