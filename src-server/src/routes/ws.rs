//! Live progress channel.
//!
//! Every connection becomes one observer on the progress bus. Events are
//! pushed as JSON text frames; anything the client sends is ignored.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use harvest::Subscription;

use crate::state::AppState;

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // Registered before the upgrade completes, so no event published after
    // the handshake is missed. Dropped (and unregistered) if it fails.
    let subscription = state.bus().subscribe(state.observer_buffer);
    let shutdown = state.shutdown_signal();
    ws.on_upgrade(move |socket| handle_socket(socket, subscription, shutdown))
}

async fn handle_socket(
    socket: WebSocket,
    subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let observer = subscription.handle().id();
    info!(observer = observer, "Progress observer connected");

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(forward_events(sink, subscription));
    let mut recv_task = tokio::spawn(drain_client(stream));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = shutdown.wait_for(|stop| *stop) => {
            send_task.abort();
            recv_task.abort();
        }
    }

    info!(observer = observer, "Progress observer disconnected");
}

/// Pushes events until the client goes away or the bus drops this observer.
async fn forward_events(mut sink: SplitSink<WebSocket, Message>, mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(job_id = event.job_id, error = %e, "Failed to encode progress event");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    // The bus unregistered us (lagging); tell the client instead of going silent.
    debug!(
        observer = subscription.handle().id(),
        "Observer dropped by bus, closing"
    );
    let _ = sink.send(Message::Close(None)).await;
}

async fn drain_client(mut stream: SplitStream<WebSocket>) {
    while let Some(Ok(msg)) = stream.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }
}
