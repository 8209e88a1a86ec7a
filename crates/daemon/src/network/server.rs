//! Outer WebSocket server for terminal connections.
//!
//! Thin glue between TCP sockets and the [`TerminalGateway`]: it performs the
//! WebSocket handshake (delegating upgrade validation to the gateway),
//! demultiplexes inbound frames per connection, and drains each connection's
//! outbound channel into its socket. All terminal semantics live in the
//! gateway; this module only moves frames.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::TerminalGateway;

/// Accepts terminal WebSocket connections until the token is cancelled.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<TerminalGateway>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Terminal WebSocket server listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let gateway = Arc::clone(&gateway);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, gateway).await {
                                debug!(peer = %peer, error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept TCP connection"),
                }
            }
        }
    }

    info!("Terminal WebSocket server stopped");
    Ok(())
}

/// Drives one WebSocket connection from handshake to close.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    gateway: Arc<TerminalGateway>,
) -> Result<()> {
    let handshake_gateway = Arc::clone(&gateway);
    let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let headers: Vec<(&str, &str)> = req
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("")))
            .collect();

        if handshake_gateway.validate_upgrade(req.method().as_str(), req.uri().path(), &headers) {
            Ok(response)
        } else {
            let mut reject = ErrorResponse::new(Some("invalid terminal upgrade request".into()));
            *reject.status_mut() = StatusCode::BAD_REQUEST;
            Err(reject)
        }
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (mut sink, mut stream) = ws.split();

    let accepted = match gateway.accept_upgrade().await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Rejecting WebSocket connection");
            let _ = sink.send(Message::Close(None)).await;
            return Ok(());
        }
    };

    debug!(
        peer = %peer,
        session_id = %accepted.session_id,
        "Terminal connection established"
    );

    let token = accepted.token;
    let mut outbound = accepted.outbound;

    // Writer side: outbound frames from the pump into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader side: inbound frames into the gateway, one at a time.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = gateway.on_message(&token, text.as_bytes()).await {
                    warn!(peer = %peer, error = %e, "Failed to handle terminal message");
                }
            }
            Ok(Message::Binary(bytes)) => {
                if let Err(e) = gateway.on_message(&token, &bytes).await {
                    warn!(peer = %peer, error = %e, "Failed to handle terminal message");
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    gateway.on_close(&token).await;

    // The close dropped the outbound sender, so the writer drains and exits.
    let _ = writer.await;

    Ok(())
}
