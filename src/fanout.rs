//! Best-effort broadcast of one event to every currently connected peer.
//!
//! The acting peer snapshots membership from the authority, resolves each name
//! through the directory and calls it directly. A target that cannot be
//! resolved or reached is recorded and skipped; there is no retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use crate::authority::SessionAuthority;
use crate::datatypes::{DisplayName, Message};
use crate::directory::{Directory, DirectoryKey, EndpointRef};
use crate::error::{Error, Result};
use crate::rpc::{unexpected_reply, Call, PeerCall, Reply, RpcClient};
use crate::util::Handle;

/// Calls a peer accepts from other peers (and from itself).
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    async fn deliver_message(&self, message: Message) -> Result<()>;
    async fn peer_joined(&self, name: &str) -> Result<()>;
    async fn peer_left(&self, name: &str) -> Result<()>;
}

/// Turns a directory entry into something callable.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &EndpointRef) -> Result<Arc<dyn PeerEndpoint>>;
}

/// A peer in another process.
#[derive(Debug)]
pub struct RemotePeer {
    client: RpcClient,
}

impl RemotePeer {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    async fn call(&self, call: PeerCall) -> Result<()> {
        match self.client.call(Call::Peer(call)).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }
}

#[async_trait]
impl PeerEndpoint for RemotePeer {
    async fn deliver_message(&self, message: Message) -> Result<()> {
        self.call(PeerCall::DeliverMessage { message }).await
    }

    async fn peer_joined(&self, name: &str) -> Result<()> {
        self.call(PeerCall::PeerJoined { name: name.to_owned() }).await
    }

    async fn peer_left(&self, name: &str) -> Result<()> {
        self.call(PeerCall::PeerLeft { name: name.to_owned() }).await
    }
}

/// Opens one connection per target, used for a single event.
#[derive(Clone, Debug)]
pub struct TcpDialer {
    timeout: Duration,
}

impl TcpDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, endpoint: &EndpointRef) -> Result<Arc<dyn PeerEndpoint>> {
        let client = RpcClient::new(endpoint.addr.to_string(), self.timeout);
        Ok(Arc::new(RemotePeer::new(client)))
    }
}

/// Dialer for peers living in the same process, keyed by endpoint session.
#[derive(Clone, Default)]
pub struct LocalDialer {
    endpoints: Handle<HashMap<Uuid, Arc<dyn PeerEndpoint>>>,
}

impl LocalDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, endpoint: &EndpointRef, target: Arc<dyn PeerEndpoint>) {
        self.endpoints.get_mut().insert(endpoint.session, target);
    }

    pub fn detach(&self, endpoint: &EndpointRef) {
        self.endpoints.get_mut().remove(&endpoint.session);
    }
}

#[async_trait]
impl Dialer for LocalDialer {
    async fn dial(&self, endpoint: &EndpointRef) -> Result<Arc<dyn PeerEndpoint>> {
        self.endpoints
            .get()
            .get(&endpoint.session)
            .cloned()
            .ok_or_else(|| Error::Remote(format!("endpoint {} is not reachable", endpoint.session)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FanoutEvent {
    Message(Message),
    Joined(DisplayName),
    Left(DisplayName),
}

#[derive(Debug)]
pub struct FanoutFailure {
    pub target: DisplayName,
    pub error: Error,
}

/// Per-target outcome of one broadcast.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub delivered: Vec<DisplayName>,
    pub failed: Vec<FanoutFailure>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Fanout {
    authority: Arc<dyn SessionAuthority>,
    directory: Arc<dyn Directory>,
    dialer: Arc<dyn Dialer>,
    timeout: Duration,
}

impl Fanout {
    pub fn new(
        authority: Arc<dyn SessionAuthority>,
        directory: Arc<dyn Directory>,
        dialer: Arc<dyn Dialer>,
        timeout: Duration,
    ) -> Self {
        Self {
            authority,
            directory,
            dialer,
            timeout,
        }
    }

    /// Delivers `event` to every name the authority currently lists.
    ///
    /// Fails only if the membership snapshot cannot be fetched. Individual
    /// targets run concurrently, each bounded by the call timeout, and their
    /// failures end up in the report.
    pub async fn broadcast(&self, event: &FanoutEvent) -> Result<FanoutReport> {
        let targets = self.authority.list_connected_names().await?;

        let attempts = targets.into_iter().map(|target| async move {
            let outcome = match tokio::time::timeout(self.timeout, self.deliver(&target, event)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout(self.timeout)),
            };
            (target, outcome)
        });

        let mut report = FanoutReport::default();
        for (target, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => report.delivered.push(target),
                Err(error) => {
                    tracing::warn!("fanout to {target} failed: {error}");
                    report.failed.push(FanoutFailure { target, error });
                }
            }
        }

        tracing::debug!(
            "fanout delivered to {} peers, {} failed",
            report.delivered.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn deliver(&self, target: &str, event: &FanoutEvent) -> Result<()> {
        let key = DirectoryKey::Peer(target.to_owned());
        let endpoint = self
            .directory
            .resolve(&key)
            .await?
            .ok_or_else(|| Error::StaleDirectoryEntry(key.to_string()))?;

        let peer = self.dialer.dial(&endpoint).await?;

        match event {
            FanoutEvent::Message(message) => peer.deliver_message(message.clone()).await,
            FanoutEvent::Joined(name) => peer.peer_joined(name).await,
            FanoutEvent::Left(name) => peer.peer_left(name).await,
        }
    }
}
