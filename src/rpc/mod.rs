//! Request/response calls between the server and peer processes.
//!
//! Each call is one bincode-encoded [`Call`] frame answered by one [`Reply`]
//! frame on a length-delimited TCP stream.

mod client;
mod network;
mod protocol;
mod serve;

pub use client::RpcClient;
pub use network::{receive_frame, send_frame, stream_to_rpc_network, RpcNetwork, MAX_FRAME_LENGTH};
pub use protocol::{unexpected_reply, AuthorityCall, Call, DirectoryCall, PeerCall, Reply};
pub use serve::{listen, serve_connection, Dispatcher};
