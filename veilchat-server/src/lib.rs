//! The VeilChat relay.
//!
//! An untrusted intermediary: it registers clients, fans out the presence
//! list, and forwards directed envelopes to their recipient byte-for-byte.
//! It never decrypts anything and never rewrites a forwarded frame; the
//! `content` fields stay opaque.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use veilchat_core::{Envelope, PeerIdentity};

// Per-connection outbound queue depth. A slow reader drops frames rather
// than stalling the whole relay.
const MAX_QUEUE_DEPTH: usize = 32;

struct ClientHandle {
    username: String,
    public_key: String,
    tx: mpsc::Sender<String>,
}

type Registry = Arc<DashMap<String, ClientHandle>>;

/// Run the relay on an already-bound listener until the listener fails.
pub async fn run_server(listener: TcpListener) {
    let registry: Registry = Arc::new(DashMap::new());

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let registry = registry.clone();
        tokio::spawn(async move {
            debug!(%peer_addr, "accepted connection");
            if let Err(e) = handle_connection(stream, registry).await {
                debug!(%peer_addr, error = %e, "connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Registry,
) -> Result<(), Box<dyn std::error::Error>> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // 1. The first frame must be a registration. Anything else closes the
    //    connection without a reply.
    let raw = match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return Ok(()),
    };
    let (id, username, public_key) = match Envelope::parse(&raw) {
        Ok(Envelope::Register {
            from,
            content,
            public_key,
        }) => (from, content, public_key),
        _ => {
            debug!("first frame was not register; closing");
            return Ok(());
        }
    };

    // 2. Writer task owns the sink; everything outbound goes through the
    //    queue so welcome/userList/forwarded frames stay ordered.
    let (tx, mut rx) = mpsc::channel::<String>(MAX_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    if tx.send(Envelope::Welcome.to_json()?).await.is_err() {
        return Ok(());
    }

    registry.insert(
        id.clone(),
        ClientHandle {
            username: username.clone(),
            public_key,
            tx: tx.clone(),
        },
    );
    info!(%id, %username, "client registered");
    broadcast_user_list(&registry);

    // 3. Relay loop: forward directed frames verbatim.
    while let Some(msg) = ws_rx.next().await {
        let raw = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue, // Ignore Binary, Ping, Pong
        };

        match Envelope::parse(&raw) {
            Ok(Envelope::KeyExchange { to, .. } | Envelope::Chat { to, .. }) => {
                // Forward the received text untouched. Unknown recipient:
                // the frame is dropped (no error channel back to sender).
                if let Some(recipient) = registry.get(&to) {
                    if recipient.tx.try_send(raw).is_err() {
                        warn!(%id, %to, "recipient queue full; dropping frame");
                    }
                }
            }
            Ok(other) => debug!(%id, frame = frame_name(&other), "ignoring frame"),
            Err(_) => debug!(%id, "dropping malformed frame"),
        }
    }

    // 4. Cleanup: deregister and refresh everyone's presence list.
    registry.remove(&id);
    info!(%id, %username, "client unregistered");
    broadcast_user_list(&registry);

    Ok(())
}

/// Push a full presence snapshot to every registered client.
fn broadcast_user_list(registry: &Registry) {
    let users: Vec<PeerIdentity> = registry
        .iter()
        .map(|entry| PeerIdentity {
            id: entry.key().clone(),
            username: entry.value().username.clone(),
            public_key: entry.value().public_key.clone(),
        })
        .collect();

    let frame = match (Envelope::UserList { users }).to_json() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "failed to encode user list");
            return;
        }
    };

    for entry in registry.iter() {
        if entry.value().tx.try_send(frame.clone()).is_err() {
            warn!(id = %entry.key(), "client queue full; skipping presence update");
        }
    }
}

fn frame_name(envelope: &Envelope) -> &'static str {
    match envelope {
        Envelope::Register { .. } => "register",
        Envelope::Welcome => "welcome",
        Envelope::UserList { .. } => "userList",
        Envelope::KeyExchange { .. } => "keyExchange",
        Envelope::Chat { .. } => "chat",
    }
}
