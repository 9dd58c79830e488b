//! Process defaults and configuration.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4097;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);
/// Peers listen on an ephemeral port on every interface and advertise the
/// address they use to reach the directory.
pub const DEFAULT_PEER_LISTEN: &str = "0.0.0.0:0";

pub const HOME_DIR_NAME: &str = ".chatlink";
pub const HISTORY_FILE_NAME: &str = "history";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    pub history_path: PathBuf,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub directory_host: String,
    pub port: u16,
    pub listen: String,
    pub call_timeout: Duration,
}

impl PeerConfig {
    pub fn directory_address(&self) -> String {
        format!("{}:{}", self.directory_host, self.port)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            directory_host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            listen: DEFAULT_PEER_LISTEN.to_owned(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}
