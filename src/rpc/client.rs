use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::network::{receive_frame, send_frame, stream_to_rpc_network, RpcNetwork};
use super::protocol::{Call, Reply};
use crate::error::{Error, Result};

/// Outbound side of a remote endpoint.
///
/// Calls on one client are serialized over a single lazily opened connection.
/// Every call is bounded by the client's timeout, and any failure drops the
/// connection so the next call starts from a fresh one.
pub struct RpcClient {
    addr: String,
    timeout: Duration,
    network: Mutex<Option<RpcNetwork>>,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            network: Mutex::new(None),
        }
    }

    /// Like [`RpcClient::new`], but fails unless the endpoint accepts a connection now.
    pub async fn connect(addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Self::new(addr, timeout);
        client.local_addr().await?;
        Ok(client)
    }

    /// Local address of the connection to the endpoint, opening it if needed.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        let mut slot = self.network.lock().await;
        self.ensure_open(&mut slot).await?;
        let network = slot.as_ref().ok_or(Error::ConnectionClosed)?;
        Ok(network.get_ref().local_addr()?)
    }

    /// Remote address the endpoint name resolved to, opening the connection if needed.
    pub async fn peer_addr(&self) -> Result<SocketAddr> {
        let mut slot = self.network.lock().await;
        self.ensure_open(&mut slot).await?;
        let network = slot.as_ref().ok_or(Error::ConnectionClosed)?;
        Ok(network.get_ref().peer_addr()?)
    }

    pub async fn call(&self, call: Call) -> Result<Reply> {
        let mut slot = self.network.lock().await;

        let outcome = tokio::time::timeout(self.timeout, Self::exchange(&self.addr, &mut slot, &call)).await;
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                *slot = None;
                return Err(err);
            }
            Err(_) => {
                *slot = None;
                return Err(Error::Timeout(self.timeout));
            }
        };

        match reply {
            Reply::Failed(reason) => Err(Error::Remote(reason)),
            reply => Ok(reply),
        }
    }

    async fn ensure_open(&self, slot: &mut Option<RpcNetwork>) -> Result<()> {
        if slot.is_none() {
            let network = tokio::time::timeout(self.timeout, Self::open(&self.addr))
                .await
                .map_err(|_| Error::Timeout(self.timeout))??;
            *slot = Some(network);
        }
        Ok(())
    }

    async fn exchange(addr: &str, slot: &mut Option<RpcNetwork>, call: &Call) -> Result<Reply> {
        if slot.is_none() {
            *slot = Some(Self::open(addr).await?);
        }
        let network = slot.as_mut().ok_or(Error::ConnectionClosed)?;

        send_frame(network, call).await?;
        receive_frame(network).await?.ok_or(Error::ConnectionClosed)
    }

    async fn open(addr: &str) -> Result<RpcNetwork> {
        let stream = TcpStream::connect(addr).await?;
        Ok(stream_to_rpc_network(stream))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
