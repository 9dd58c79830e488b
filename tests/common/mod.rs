//! Shared helpers for the end-to-end tests: a real server and real peers over loopback TCP.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chatlink::config::PeerConfig;
use chatlink::rpc::{self, Dispatcher, RpcClient};
use chatlink::util::Handle;
use chatlink::{
    locate_server, Directory, DirectoryKey, HistoryStore, LineStyle, Peer, Presentation,
    RemoteAuthority, RemoteDirectory, Server, TcpDialer,
};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Default timeout for test operations.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on single remote calls; short so unreachable peers fail fast.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatlink=debug")))
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub async fn with_timeout<T, F>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("Test operation timed out")
}

/// Presentation that keeps everything it is shown.
#[derive(Default)]
pub struct RecordingPresentation {
    lines: Handle<Vec<(String, LineStyle)>>,
    members: Handle<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingPresentation {
    /// Chat lines only, in arrival order.
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .get()
            .iter()
            .filter(|(_, style)| matches!(style, LineStyle::Plain | LineStyle::EmphasisPrimary))
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn lines_with(&self, style: LineStyle) -> Vec<String> {
        self.lines
            .get()
            .iter()
            .filter(|(_, line_style)| *line_style == style)
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn members(&self) -> Vec<String> {
        let mut members = self.members.get().clone();
        members.sort();
        members
    }
}

impl Presentation for RecordingPresentation {
    fn on_transcript_line(&self, text: &str, style: LineStyle) {
        self.lines.get_mut().push((text.to_owned(), style));
    }

    fn on_peer_list_add(&self, name: &str) {
        let mut members = self.members.get_mut();
        if !members.iter().any(|member| member == name) {
            members.push(name.to_owned());
        }
    }

    fn on_peer_list_remove(&self, name: &str) {
        self.members.get_mut().retain(|member| member != name);
    }

    fn on_peer_list_clear(&self) {
        self.members.get_mut().clear();
    }
}

/// A server listening on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<Server>,
    task: JoinHandle<chatlink::Result<()>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start(history: &Path) -> Self {
        let server = Arc::new(Server::new(HistoryStore::new(history)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(server.clone().run(listener));

        // The authority entry is registered as soon as the listener task starts.
        with_timeout(async {
            while server.directory().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await;

        Self { addr, server, task }
    }

    /// Interrupts the server and waits for the history to be saved.
    pub async fn stop(self) -> chatlink::Result<()> {
        self.server.interrupt();
        with_timeout(self.task).await.unwrap()
    }

    pub async fn remote_directory(&self) -> RemoteDirectory {
        let client = RpcClient::connect(self.addr.to_string(), CALL_TIMEOUT).await.unwrap();
        RemoteDirectory::new(Arc::new(client))
    }

    pub async fn remote_authority(&self) -> RemoteAuthority {
        let directory = self.remote_directory().await;
        let endpoint = directory.resolve(&DirectoryKey::Authority).await.unwrap().unwrap();
        let client = RpcClient::connect(endpoint.addr.to_string(), CALL_TIMEOUT).await.unwrap();
        RemoteAuthority::new(Arc::new(client))
    }

    /// Peer settings pointing at this server, otherwise the defaults.
    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            directory_host: self.addr.ip().to_string(),
            port: self.addr.port(),
            call_timeout: CALL_TIMEOUT,
            ..PeerConfig::default()
        }
    }

    /// A peer started the way the peer process starts one.
    pub async fn peer(&self) -> TestPeer {
        let config = self.peer_config();
        let link = locate_server(&config).await.unwrap();

        let listener = TcpListener::bind(&config.listen).await.unwrap();
        let endpoint = link.advertise(listener.local_addr().unwrap());
        let screen = Arc::new(RecordingPresentation::default());

        let peer = Peer::new(
            link.authority,
            link.directory,
            Arc::new(TcpDialer::new(CALL_TIMEOUT)),
            screen.clone(),
            endpoint,
            CALL_TIMEOUT,
        );

        let stop = Arc::new(Notify::new());
        let inbox: Arc<dyn Dispatcher> = peer.inbox();
        let inbox_task = tokio::spawn({
            let stop = stop.clone();
            async move { rpc::listen(listener, inbox, &stop).await }
        });

        TestPeer {
            peer,
            screen,
            stop,
            inbox_task,
        }
    }
}

/// A peer whose inbox is served over TCP.
pub struct TestPeer {
    pub peer: Peer,
    pub screen: Arc<RecordingPresentation>,
    stop: Arc<Notify>,
    inbox_task: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestPeer {
    /// Stops answering calls without telling anyone, like a crashed process.
    pub async fn vanish(self) {
        self.stop.notify_one();
        with_timeout(self.inbox_task).await.unwrap();
    }
}
