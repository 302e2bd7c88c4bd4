// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use serde_json::json;
use state_hub_rs::models::ServerMessage;

use super::common::{
    AcceptAll, MapHydrate, TestSocket, action_frame, assert_silent, connect_frame,
    hub_with, recv,
};

const ANY_ID: &str = "00000000-0000-7000-8000-000000000000";

#[tokio::test]
async fn test_every_peer_gets_exactly_one_copy() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );

    let (socket_a, mut rx_a) = TestSocket::pair();
    let (socket_b, mut rx_b) = TestSocket::pair();
    let (socket_c, mut rx_c) = TestSocket::pair();
    let sender = hub.open_session("room/a", None, socket_a).await;
    let peer_b = hub.open_session("room/a", None, socket_b).await;
    let peer_c = hub.open_session("room/a", None, socket_c).await;

    for (session, rx) in [
        (&sender, &mut rx_a),
        (&peer_b, &mut rx_b),
        (&peer_c, &mut rx_c),
    ] {
        session.receive(connect_frame()).await;
        assert!(matches!(recv(rx).await, ServerMessage::Connected { .. }));
    }

    sender
        .receive(action_frame(ANY_ID, json!({"type": "inc"})))
        .await;

    let ServerMessage::RenameId { to_id, .. } = recv(&mut rx_a).await else {
        panic!("expected rename for the sender");
    };

    for rx in [&mut rx_b, &mut rx_c] {
        let ServerMessage::Action { action, id } = recv(rx).await else {
            panic!("expected fan-out");
        };
        assert_eq!(action, json!({"type": "inc"}));
        assert_eq!(id, to_id);
        // Exactly one copy each.
        assert_silent(rx).await;
    }

    // The sender never receives its own fan-out.
    assert_silent(&mut rx_a).await;
}

#[tokio::test]
async fn test_disconnected_peer_is_skipped() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );

    let (socket_a, mut rx_a) = TestSocket::pair();
    let (socket_b, mut rx_b) = TestSocket::pair();
    let (socket_c, mut rx_c) = TestSocket::pair();
    let sender = hub.open_session("room/a", None, socket_a).await;
    let leaver = hub.open_session("room/a", None, socket_b).await;
    let stayer = hub.open_session("room/a", None, socket_c).await;

    for (session, rx) in [
        (&sender, &mut rx_a),
        (&leaver, &mut rx_b),
        (&stayer, &mut rx_c),
    ] {
        session.receive(connect_frame()).await;
        assert!(matches!(recv(rx).await, ServerMessage::Connected { .. }));
    }

    let ctx = hub.context("room/a").await.expect("context");
    assert_eq!(ctx.client_count(), 3);

    leaver.close().await;
    assert_eq!(ctx.client_count(), 2);

    sender
        .receive(action_frame(ANY_ID, json!({"type": "inc"})))
        .await;

    assert!(matches!(recv(&mut rx_a).await, ServerMessage::RenameId { .. }));
    assert!(matches!(recv(&mut rx_c).await, ServerMessage::Action { .. }));
    assert_silent(&mut rx_b).await;
    assert_eq!(ctx.state().await, json!({"count": 1}));
}

#[tokio::test]
async fn test_dispatches_are_serialized_per_context() {
    let hub = hub_with(
        MapHydrate::single("room/a", json!({"count": 0})),
        Arc::new(AcceptAll),
    );

    let (socket_a, mut rx_a) = TestSocket::pair();
    let (socket_b, mut rx_b) = TestSocket::pair();
    let left = hub.open_session("room/a", None, socket_a).await;
    let right = hub.open_session("room/a", None, socket_b).await;

    for (session, rx) in [(&left, &mut rx_a), (&right, &mut rx_b)] {
        session.receive(connect_frame()).await;
        assert!(matches!(recv(rx).await, ServerMessage::Connected { .. }));
    }

    // Interleave ten dispatches from both sides of the same context.
    for _ in 0..5 {
        left.receive(action_frame(ANY_ID, json!({"type": "inc"})))
            .await;
        right
            .receive(action_frame(ANY_ID, json!({"type": "inc"})))
            .await;
    }

    let mut left_frames = 0;
    let mut right_frames = 0;
    for _ in 0..10 {
        left_frames += 1;
        let _ = recv(&mut rx_a).await;
    }
    for _ in 0..10 {
        right_frames += 1;
        let _ = recv(&mut rx_b).await;
    }
    // 5 own responses + 5 fan-outs on each side; no lost updates.
    assert_eq!(left_frames, 10);
    assert_eq!(right_frames, 10);

    let ctx = hub.context("room/a").await.expect("context");
    assert_eq!(ctx.state().await, json!({"count": 10}));
}
