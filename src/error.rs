//! Error types shared by the library and both binaries.

use std::time::Duration;

use thiserror::Error;

use crate::datatypes::DisplayName;

#[derive(Error, Debug)]
pub enum Error {
    /// The authority already has a connected peer with this name.
    #[error("name \"{0}\" is not available")]
    NameUnavailable(DisplayName),

    /// The directory or the authority could not be located at start-up.
    #[error("directory unreachable at {addr}: {reason}")]
    DirectoryUnreachable { addr: String, reason: String },

    /// Resolving a key found no binding, usually because the peer has left.
    #[error("no directory binding for {0}")]
    StaleDirectoryEntry(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote endpoint answered, but refused or failed the call.
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("connection closed by remote endpoint")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("already connected as \"{0}\"")]
    AlreadyConnected(DisplayName),

    #[error("display name must not be empty")]
    EmptyName,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
