//! Server process core: hosts the directory and the session authority on one listener.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::authority::{dispatch_authority_call, BasicAuthority, SessionAuthority};
use crate::directory::{Directory, DirectoryKey, EndpointRef, LocalDirectory};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::rpc::{self, AuthorityCall, Call, DirectoryCall, Dispatcher, Reply};

pub struct Server {
    interrupt: Notify,
    authority: BasicAuthority,
    directory: LocalDirectory,
    history: HistoryStore,
}

impl Server {
    /// Creates a server whose message log starts as the saved history.
    pub fn new(history: HistoryStore) -> Self {
        let messages = history.load();

        Self {
            interrupt: Notify::new(),
            authority: BasicAuthority::with_history(messages),
            directory: LocalDirectory::new(),
            history,
        }
    }

    pub fn authority(&self) -> &BasicAuthority {
        &self.authority
    }

    pub fn directory(&self) -> &LocalDirectory {
        &self.directory
    }

    /// Serves calls until interrupted, then saves the history once.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        self.clone().listen(listener).await?;

        let saved = self.save_history().await;
        if let Err(err) = &saved {
            tracing::error!("{err}");
        }
        saved
    }

    pub async fn listen(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        self.directory
            .register(DirectoryKey::Authority, EndpointRef::new(addr))
            .await?;

        tracing::info!("server ready on {addr}");

        let dispatcher: Arc<dyn Dispatcher> = self.clone();
        rpc::listen(listener, dispatcher, &self.interrupt).await;

        tracing::info!("server stopped");
        Ok(())
    }

    pub async fn save_history(&self) -> Result<()> {
        tracing::info!("saving history into {}", self.history.path().display());
        let messages = self.authority.get_history().await?;
        self.history.save(&messages)
    }

    pub fn interrupt(&self) {
        self.interrupt.notify_one();
    }

    async fn dispatch_directory(&self, call: DirectoryCall) -> Reply {
        let result = match call {
            DirectoryCall::Register { key: DirectoryKey::Authority, .. }
            | DirectoryCall::Unregister { key: DirectoryKey::Authority } => {
                return Reply::Failed(format!("{} is reserved", DirectoryKey::Authority));
            }
            DirectoryCall::Register { key, endpoint } => {
                self.directory.register(key, endpoint).await.map(|()| Reply::Done)
            }
            DirectoryCall::Unregister { key } => self.directory.unregister(&key).await.map(|()| Reply::Done),
            DirectoryCall::Resolve { key } => self.directory.resolve(&key).await.map(Reply::Endpoint),
        };

        result.unwrap_or_else(|err| Reply::Failed(err.to_string()))
    }
}

impl Server {
    pub fn set_interrupt_handler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);

        let result = ctrlc::set_handler(move || match weak.upgrade() {
            Some(server) => server.interrupt(),
            None => tracing::warn!("server no longer exists, nothing to interrupt"),
        });

        match result {
            Ok(()) => {}

            Err(ctrlc::Error::NoSuchSignal(signal_type)) => tracing::warn!(
                "signal {signal_type:?} not found, interrupt will not be handled gracefully"
            ),

            Err(ctrlc::Error::MultipleHandlers) => tracing::warn!(
                "interrupt already has a handler, history may not be saved on exit"
            ),

            Err(ctrlc::Error::System(err)) => tracing::warn!(
                "interrupt handler not set, history may not be saved on exit: {err}"
            ),
        }
    }
}

#[async_trait]
impl Dispatcher for Server {
    async fn dispatch(&self, call: Call) -> Reply {
        match call {
            Call::Directory(call) => self.dispatch_directory(call).await,
            Call::Authority(AuthorityCall::ReplaceHistory { .. }) => {
                Reply::Failed("history is only replaced by the server itself".to_owned())
            }
            Call::Authority(call) => dispatch_authority_call(&self.authority, call).await,
            other => Reply::unsupported(&other),
        }
    }
}
