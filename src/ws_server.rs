// WebSocket server for viewer connections.
//
// Each accepted connection becomes one hub session driven by its own task:
// outbound frames come from the session's hub queue, inbound frames are read
// only to detect liveness and disconnection. The server never closes a
// connection from its side; a session ends when the client closes, the
// transport errors, or the hub drops the session.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;

/// Run the viewer WebSocket server on an already-bound listener.
///
/// Accepts connections forever; each one is handed to its own task so a
/// slow client never delays the accept loop or other viewers. Transient
/// accept failures are logged and skipped.
pub async fn run(listener: TcpListener, hub: Arc<BroadcastHub>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("viewer WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        debug!("accepted TCP connection from {addr}");

        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {addr}: {e}");
                    return;
                }
            };
            serve_viewer(ws, hub, &addr.to_string()).await;
        });
    }
}

/// Drive one viewer session until it ends, then remove it from the hub.
///
/// Generic over the transport so it can be tested with in-memory duplex
/// streams without opening TCP ports.
pub async fn serve_viewer<S>(ws: WebSocketStream<S>, hub: Arc<BroadcastHub>, addr: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (session, mut frames) = hub.connect();
    info!("viewer {addr} connected as session {session}");

    let (mut sink, mut read) = ws.split();

    loop {
        tokio::select! {
            outbound = frames.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!("send to viewer {addr} failed: {e}");
                        break;
                    }
                }
                // Session was dropped from the registry elsewhere.
                None => break,
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    info!("viewer {addr} disconnected");
                    break;
                }
                Some(Ok(_)) => {
                    // Inbound frames are accepted but ignored; the connection
                    // is kept open only to detect liveness.
                }
                Some(Err(e)) => {
                    warn!("WebSocket error from viewer {addr}: {e}");
                    break;
                }
            },
        }
    }

    hub.disconnect(session);
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
