//! The session authority: sole owner of who is online and of the message log.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::datatypes::{DisplayName, Message, MessageTime};
use crate::error::{Error, Result};
use crate::rpc::{unexpected_reply, AuthorityCall, Call, Reply, RpcClient, MAX_FRAME_LENGTH};
use crate::util::Handle;

/// Encoded size budget of one history page. Half a frame leaves room for the reply envelope.
pub const HISTORY_PAGE_BYTES: u64 = (MAX_FRAME_LENGTH / 2) as u64;

/// A run of the message log, so a log of any length crosses the wire in bounded frames.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// Index of the first message of the following page.
    pub next: Option<usize>,
}

impl HistoryPage {
    /// Takes messages from `start` until `budget` encoded bytes are used, but always at least one.
    pub fn slice(log: &[Message], start: usize, budget: u64) -> Result<Self> {
        let start = start.min(log.len());
        let mut used = 0;
        let mut end = start;

        for message in &log[start..] {
            let size = bincode::serialized_size(message)?;
            if end > start && used + size > budget {
                break;
            }
            used += size;
            end += 1;
        }

        Ok(Self {
            messages: log[start..end].to_vec(),
            next: (end < log.len()).then_some(end),
        })
    }
}

#[async_trait]
pub trait SessionAuthority: Send + Sync {
    /// Claims `name`. Returns `false` if it is already connected.
    async fn connect(&self, name: &str) -> Result<bool>;

    /// Releases `name`; releasing an unknown name is a no-op.
    async fn disconnect(&self, name: &str) -> Result<()>;

    /// Appends a message and returns the time the authority stamped on it.
    async fn add_message(&self, sender: &str, content: &str) -> Result<MessageTime>;

    /// Snapshot of connected names in join order. May be stale by the time it is used.
    async fn list_connected_names(&self) -> Result<Vec<DisplayName>>;

    async fn get_history(&self) -> Result<Vec<Message>>;

    /// The part of the log starting at index `start`, at most [`HISTORY_PAGE_BYTES`] long.
    async fn get_history_page(&self, start: usize) -> Result<HistoryPage>;

    async fn replace_history(&self, messages: Vec<Message>) -> Result<()>;
}

#[derive(Debug, Default)]
struct AuthorityState {
    names: Vec<DisplayName>,
    log: Vec<Message>,
    last_time: Option<MessageTime>,
}

/// In-memory authority. Every operation runs under one lock, start to finish.
#[derive(Clone, Debug, Default)]
pub struct BasicAuthority {
    state: Handle<AuthorityState>,
}

impl BasicAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(messages: Vec<Message>) -> Self {
        let authority = Self::new();
        authority.state.get_mut().load(messages);
        authority
    }
}

impl AuthorityState {
    fn load(&mut self, messages: Vec<Message>) {
        self.last_time = messages.iter().map(|message| message.time).max();
        self.log = messages;
    }
}

#[async_trait]
impl SessionAuthority for BasicAuthority {
    async fn connect(&self, name: &str) -> Result<bool> {
        let mut state = self.state.get_mut();

        if state.names.iter().any(|connected| connected == name) {
            tracing::info!("rejected duplicate name: {name}");
            return Ok(false);
        }

        tracing::info!("peer joining: {name}");
        state.names.push(name.to_owned());
        Ok(true)
    }

    async fn disconnect(&self, name: &str) -> Result<()> {
        let mut state = self.state.get_mut();

        if let Some(index) = state.names.iter().position(|connected| connected == name) {
            tracing::info!("peer exiting: {name}");
            state.names.remove(index);
        }
        Ok(())
    }

    async fn add_message(&self, sender: &str, content: &str) -> Result<MessageTime> {
        let mut state = self.state.get_mut();

        // The wall clock may step backwards; stamped times must not.
        let now = MessageTime::now();
        let time = match state.last_time {
            Some(last) if last > now => last,
            _ => now,
        };

        state.last_time = Some(time);
        state.log.push(Message::new(time, sender, content));
        Ok(time)
    }

    async fn list_connected_names(&self) -> Result<Vec<DisplayName>> {
        Ok(self.state.get().names.clone())
    }

    async fn get_history(&self) -> Result<Vec<Message>> {
        Ok(self.state.get().log.clone())
    }

    async fn get_history_page(&self, start: usize) -> Result<HistoryPage> {
        HistoryPage::slice(&self.state.get().log, start, HISTORY_PAGE_BYTES)
    }

    async fn replace_history(&self, messages: Vec<Message>) -> Result<()> {
        self.state.get_mut().load(messages);
        Ok(())
    }
}

/// Session authority hosted by a server process.
#[derive(Clone, Debug)]
pub struct RemoteAuthority {
    client: Arc<RpcClient>,
}

impl RemoteAuthority {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    async fn call(&self, call: AuthorityCall) -> Result<Reply> {
        self.client.call(Call::Authority(call)).await
    }
}

#[async_trait]
impl SessionAuthority for RemoteAuthority {
    async fn connect(&self, name: &str) -> Result<bool> {
        match self.call(AuthorityCall::Connect { name: name.to_owned() }).await? {
            Reply::Accepted(accepted) => Ok(accepted),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn disconnect(&self, name: &str) -> Result<()> {
        match self.call(AuthorityCall::Disconnect { name: name.to_owned() }).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn add_message(&self, sender: &str, content: &str) -> Result<MessageTime> {
        let call = AuthorityCall::AddMessage {
            sender: sender.to_owned(),
            content: content.to_owned(),
        };
        match self.call(call).await? {
            Reply::Time(time) => Ok(time),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn list_connected_names(&self) -> Result<Vec<DisplayName>> {
        match self.call(AuthorityCall::ListConnectedNames).await? {
            Reply::Names(names) => Ok(names),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn get_history(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut start = Some(0);

        while let Some(from) = start {
            let page = self.get_history_page(from).await?;
            messages.extend(page.messages);
            start = match page.next {
                Some(next) if next <= from => {
                    return Err(Error::Remote(format!("history page at {from} does not advance")));
                }
                next => next,
            };
        }
        Ok(messages)
    }

    async fn get_history_page(&self, start: usize) -> Result<HistoryPage> {
        match self.call(AuthorityCall::GetHistoryPage { start }).await? {
            Reply::HistoryPage(page) => Ok(page),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn replace_history(&self, messages: Vec<Message>) -> Result<()> {
        match self.call(AuthorityCall::ReplaceHistory { messages }).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }
}

/// Serves one authority call. Failures never cross the wire as anything but `Reply::Failed`.
pub async fn dispatch_authority_call(authority: &dyn SessionAuthority, call: AuthorityCall) -> Reply {
    let result = match call {
        AuthorityCall::Connect { name } => authority.connect(&name).await.map(Reply::Accepted),
        AuthorityCall::Disconnect { name } => authority.disconnect(&name).await.map(|()| Reply::Done),
        AuthorityCall::AddMessage { sender, content } => {
            authority.add_message(&sender, &content).await.map(Reply::Time)
        }
        AuthorityCall::ListConnectedNames => authority.list_connected_names().await.map(Reply::Names),
        AuthorityCall::GetHistoryPage { start } => {
            authority.get_history_page(start).await.map(Reply::HistoryPage)
        }
        AuthorityCall::ReplaceHistory { messages } => {
            authority.replace_history(messages).await.map(|()| Reply::Done)
        }
    };

    result.unwrap_or_else(|err| Reply::Failed(err.to_string()))
}
