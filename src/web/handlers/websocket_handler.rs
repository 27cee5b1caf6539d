use axum::{
    extract::{
        Query, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::auth_service::resolve_identity;
use crate::web::middleware::auth::bearer_token;
use crate::web::models::Identity;
use crate::web::{AppError, AppState};

#[derive(Deserialize, Debug)]
pub struct WebSocketAuthQuery {
    token: Option<String>,
}

/// Browsers always send `Origin`; other clients may omit it.
pub fn origin_allowed(origin: Option<&str>, frontend_url: &str) -> bool {
    match origin {
        None => true,
        Some(origin) => origin.trim_end_matches('/') == frontend_url.trim_end_matches('/'),
    }
}

pub async fn live_websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebSocketAuthQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, &app_state.config.frontend_url) {
        warn!(origin = ?origin, "Rejected WebSocket from foreign origin.");
        return Err(AppError::Forbidden("Origin not allowed".to_string()));
    }

    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;
    let identity = resolve_identity(&token, &app_state.config.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, identity)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, identity: Identity) {
    let subscription = match app_state.hub.register(identity.tenant_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(user_id = %identity.user_id, error = %e, "Could not register live client.");
            return;
        }
    };
    let client_id = subscription.id;
    let mut outbound = subscription.receiver;
    info!(user_id = %identity.user_id, tenant_id = %identity.tenant_id, ?client_id, "Live client connected.");

    let (mut sender, mut receiver) = socket.split();

    // The hub closes `outbound` when it evicts or unregisters this client.
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sender
                .send(Message::Text(Utf8Bytes::from(payload.to_string())))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Inbound frames carry nothing; reading only detects the disconnect.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    app_state.hub.unregister(client_id).await;
    debug!(user_id = %identity.user_id, ?client_id, "Live client disconnected.");
}
