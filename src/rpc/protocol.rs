use serde::{Deserialize, Serialize};

use crate::authority::HistoryPage;
use crate::datatypes::{DisplayName, Message, MessageTime};
use crate::directory::{DirectoryKey, EndpointRef};
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Call {
    Directory(DirectoryCall),
    Authority(AuthorityCall),
    Peer(PeerCall),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DirectoryCall {
    Register { key: DirectoryKey, endpoint: EndpointRef },
    Unregister { key: DirectoryKey },
    Resolve { key: DirectoryKey },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuthorityCall {
    Connect { name: DisplayName },
    Disconnect { name: DisplayName },
    AddMessage { sender: DisplayName, content: String },
    ListConnectedNames,
    GetHistoryPage { start: usize },
    ReplaceHistory { messages: Vec<Message> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerCall {
    DeliverMessage { message: Message },
    PeerJoined { name: DisplayName },
    PeerLeft { name: DisplayName },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Done,
    Accepted(bool),
    Time(MessageTime),
    Names(Vec<DisplayName>),
    HistoryPage(HistoryPage),
    Endpoint(Option<EndpointRef>),
    /// The call reached the endpoint but could not be served there.
    Failed(String),
}

impl Reply {
    pub fn unsupported(call: &Call) -> Self {
        let service = match call {
            Call::Directory(_) => "directory",
            Call::Authority(_) => "session authority",
            Call::Peer(_) => "peer",
        };
        Self::Failed(format!("this endpoint does not host the {service} service"))
    }
}

/// Error for a well-formed reply of the wrong kind.
pub fn unexpected_reply(reply: Reply) -> Error {
    Error::Remote(format!("unexpected reply: {reply:?}"))
}
