//! WebSocket transport
//!
//! This file implements the client side of one realtime session:
//! - build the endpoint URL with the auth token attached as a query parameter
//! - open the websocket
//! - pump frames until the session ends: inbound text (or UTF-8 binary)
//!   frames go to the router, queued outbound frames go to the socket
//!
//! Reconnection is not handled here; `RealtimeClient` decides what happens
//! after `run_session` returns.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::router::Router;
use crate::utils::Result;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The server sent a close frame.
    ClosedByPeer,
    /// The socket ended without a close frame.
    StreamEnded,
    /// The outbound queue was dropped locally (disconnect).
    LocalClose,
    Failed(tungstenite::Error),
}

/// Returns `base` with `token` set as the `token_param` query parameter,
/// replacing any value already present. Without a token the URL is unchanged.
pub fn endpoint(base: &Url, token_param: &str, token: Option<&str>) -> Url {
    let mut url = base.clone();
    if let Some(token) = token {
        let retained: Vec<(String, String)> = base
            .query_pairs()
            .filter(|(key, _)| key != token_param)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(token_param, token);
    }
    url
}

pub async fn open(url: &Url) -> Result<WsStream> {
    let (stream, response) = connect_async(url.as_str()).await?;
    debug!(status = %response.status(), "websocket handshake complete");
    Ok(stream)
}

/// Runs one connected session until either side ends it.
pub async fn run_session(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    router: &Router,
) -> SessionEnd {
    let (mut ws_sender, mut ws_receiver) = stream.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(msg) => {
                    if let Err(e) = ws_sender.send(msg).await {
                        return SessionEnd::Failed(e);
                    }
                }
                None => {
                    let _ = ws_sender.close().await;
                    return SessionEnd::LocalClose;
                }
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    router.dispatch_frame(text.as_str());
                }
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        router.dispatch_frame(text);
                    }
                    Err(_) => warn!(len = bytes.len(), "dropping non UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "server closed the session");
                    return SessionEnd::ClosedByPeer;
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Failed(e),
                None => return SessionEnd::StreamEnded,
            },
        }
    }
}
