// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The realtime transport: one WebSocket connection per browser tab, bridged to
//! `room_fabric::RoomFabric` (spec.md §4.5). Browsers cannot set an `Authorization` header on
//! the WebSocket handshake request, so the bearer token travels as a query parameter instead —
//! verified with the same `JwtVerifier` the HTTP routes use.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use room_fabric::{ClientEvent, ConnectionId, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

pub async fn ws_upgrade(State(state): State<AppState>, Query(params): Query<WsParams>, ws: WebSocketUpgrade) -> impl IntoResponse {
    match state.jwt.verify(&params.token) {
        Ok(user) => ws.on_upgrade(move |socket| handle_socket(socket, state, user)),
        Err(e) => crate::error_response(e),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user: domain::UserDescriptor) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.fabric.connect(connection_id, user.clone(), tx).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    log::error!("failed to serialize outbound event for {connection_id}: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let fabric = state.fabric.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => fabric.handle_event(connection_id, event).await,
                Err(e) => log::warn!("dropping malformed event from {connection_id}: {e}"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.fabric.disconnect(connection_id).await;
}
