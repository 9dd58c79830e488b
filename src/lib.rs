//! Presence directory and message fanout for a small group of named peers.
//!
//! A central server hosts the [`directory`] and the [`authority`]. Every peer
//! is itself a callable endpoint: actions go to the authority first, then the
//! acting peer [`fanout`]s the event to everyone currently connected.

pub mod authority;
pub mod config;
pub mod console;
pub mod datatypes;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod history;
pub mod locate;
pub mod peer;
pub mod rpc;
pub mod server;
pub mod util;

pub use authority::{BasicAuthority, HistoryPage, RemoteAuthority, SessionAuthority};
pub use console::{run_console, Command};
pub use datatypes::{DisplayName, Message, MessageTime};
pub use directory::{Directory, DirectoryKey, EndpointRef, LocalDirectory, RemoteDirectory};
pub use error::{Error, Result};
pub use fanout::{Dialer, Fanout, FanoutEvent, FanoutFailure, FanoutReport, LocalDialer, PeerEndpoint, TcpDialer};
pub use history::HistoryStore;
pub use locate::{locate_server, ServerLink};
pub use peer::{Inbox, LineStyle, Peer, Presentation};
pub use server::Server;
