//! Start-up of a peer process: find the directory, then the session authority through it.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::authority::RemoteAuthority;
use crate::config::PeerConfig;
use crate::directory::{Directory, DirectoryKey, EndpointRef, RemoteDirectory};
use crate::error::{Error, Result};
use crate::rpc::RpcClient;

/// Connections to a running server.
pub struct ServerLink {
    pub directory: Arc<RemoteDirectory>,
    pub authority: Arc<RemoteAuthority>,
    /// Local IP of the connection to the directory, as other hosts see this one.
    pub local_ip: IpAddr,
}

impl ServerLink {
    /// Endpoint to register for a callback listener bound at `listen_addr`.
    pub fn advertise(&self, listen_addr: SocketAddr) -> EndpointRef {
        EndpointRef::new(listen_addr).reachable_via(self.local_ip)
    }
}

/// Both the directory and a registered authority are required; anything less
/// is [`Error::DirectoryUnreachable`].
pub async fn locate_server(config: &PeerConfig) -> Result<ServerLink> {
    let addr = config.directory_address();
    let unreachable = |reason: String| Error::DirectoryUnreachable {
        addr: addr.clone(),
        reason,
    };

    let client = RpcClient::connect(addr.clone(), config.call_timeout)
        .await
        .map_err(|err| unreachable(err.to_string()))?;
    let local_ip = client.local_addr().await?.ip();
    let server_ip = client.peer_addr().await?.ip();
    let directory = Arc::new(RemoteDirectory::new(Arc::new(client)));

    let endpoint = directory
        .resolve(&DirectoryKey::Authority)
        .await
        .map_err(|err| unreachable(err.to_string()))?
        .ok_or_else(|| unreachable("no session authority is registered".to_owned()))?
        .reachable_via(server_ip);
    tracing::debug!("session authority at {}", endpoint.addr);

    let authority_client = RpcClient::connect(endpoint.addr.to_string(), config.call_timeout)
        .await
        .map_err(|err| unreachable(err.to_string()))?;

    Ok(ServerLink {
        directory,
        authority: Arc::new(RemoteAuthority::new(Arc::new(authority_client))),
        local_ip,
    })
}
