//! Name-to-endpoint lookup for the authority and every connected peer.

use std::collections::HashMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datatypes::DisplayName;
use crate::error::Result;
use crate::rpc::{unexpected_reply, Call, DirectoryCall, Reply, RpcClient};
use crate::util::Handle;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectoryKey {
    /// Well-known key of the session authority.
    Authority,
    Peer(DisplayName),
}

impl Display for DirectoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authority => write!(f, "chatlink://authority"),
            Self::Peer(name) => write!(f, "chatlink://peer/{name}"),
        }
    }
}

/// Where a remote-callable object can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    pub addr: SocketAddr,
    /// Tells apart successive registrations made from the same address.
    pub session: Uuid,
}

impl EndpointRef {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            session: Uuid::new_v4(),
        }
    }

    /// Same endpoint, reachable through `ip` instead of an unspecified bind address.
    pub fn reachable_via(&self, ip: std::net::IpAddr) -> Self {
        if self.addr.ip().is_unspecified() {
            Self {
                addr: SocketAddr::new(ip, self.addr.port()),
                session: self.session,
            }
        } else {
            self.clone()
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Binds `key`, replacing any previous binding.
    async fn register(&self, key: DirectoryKey, endpoint: EndpointRef) -> Result<()>;

    /// Removes the binding for `key`; absent keys are not an error.
    async fn unregister(&self, key: &DirectoryKey) -> Result<()>;

    async fn resolve(&self, key: &DirectoryKey) -> Result<Option<EndpointRef>>;
}

/// In-process directory. The server hosts one and serves it to remote peers.
#[derive(Clone, Default, Debug)]
pub struct LocalDirectory {
    bindings: Handle<HashMap<DirectoryKey, EndpointRef>>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.get().is_empty()
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    async fn register(&self, key: DirectoryKey, endpoint: EndpointRef) -> Result<()> {
        tracing::debug!("binding {key} to {}", endpoint.addr);
        self.bindings.get_mut().insert(key, endpoint);
        Ok(())
    }

    async fn unregister(&self, key: &DirectoryKey) -> Result<()> {
        if self.bindings.get_mut().remove(key).is_some() {
            tracing::debug!("unbound {key}");
        }
        Ok(())
    }

    async fn resolve(&self, key: &DirectoryKey) -> Result<Option<EndpointRef>> {
        Ok(self.bindings.get().get(key).cloned())
    }
}

/// Directory hosted by a server process.
#[derive(Clone, Debug)]
pub struct RemoteDirectory {
    client: Arc<RpcClient>,
}

impl RemoteDirectory {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Directory for RemoteDirectory {
    async fn register(&self, key: DirectoryKey, endpoint: EndpointRef) -> Result<()> {
        match self.client.call(Call::Directory(DirectoryCall::Register { key, endpoint })).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn unregister(&self, key: &DirectoryKey) -> Result<()> {
        let call = Call::Directory(DirectoryCall::Unregister { key: key.clone() });
        match self.client.call(call).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn resolve(&self, key: &DirectoryKey) -> Result<Option<EndpointRef>> {
        let call = Call::Directory(DirectoryCall::Resolve { key: key.clone() });
        match self.client.call(call).await? {
            Reply::Endpoint(endpoint) => Ok(endpoint),
            other => Err(unexpected_reply(other)),
        }
    }
}
