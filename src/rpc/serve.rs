use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::network::{receive_frame, send_frame, stream_to_rpc_network};
use super::protocol::{Call, Reply};

/// Inbound side of an endpoint: turns each call into exactly one reply.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, call: Call) -> Reply;
}

/// Serves sequential calls on one connection until the remote closes it.
pub async fn serve_connection(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<dyn Dispatcher>) {
    tracing::debug!("accepted connection from {peer}");
    let mut network = stream_to_rpc_network(stream);

    loop {
        let call = match receive_frame::<Call>(&mut network).await {
            Ok(Some(call)) => call,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!("dropping connection from {peer}: {err}");
                break;
            }
        };

        let reply = dispatcher.dispatch(call).await;

        if let Err(err) = send_frame(&mut network, &reply).await {
            tracing::debug!("failed to reply to {peer}: {err}");
            break;
        }
    }

    tracing::debug!("peer {peer} disconnected");
}

/// Accepts connections until `interrupt` is notified, one task per connection.
pub async fn listen(listener: TcpListener, dispatcher: Arc<dyn Dispatcher>, interrupt: &Notify) {
    let mut connections: Vec<JoinHandle<()>> = vec![];

    loop {
        tokio::select! {
            _ = interrupt.notified() => {
                tracing::info!("stopping the listener");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Err(err) => tracing::warn!("failed to accept connection: {err}"),
                    Ok((stream, addr)) => {
                        connections.retain(|connection| !connection.is_finished());
                        let serve = serve_connection(stream, addr, dispatcher.clone());
                        connections.push(tokio::spawn(serve));
                    }
                }
            }
        }
    }

    tracing::debug!("aborting {} connection tasks", connections.len());
    for connection in connections {
        connection.abort();
    }
}
