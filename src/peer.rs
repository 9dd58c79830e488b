//! One connected user: caller of the authority and fanout, and callee of other peers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::authority::SessionAuthority;
use crate::datatypes::{DisplayName, Message};
use crate::directory::{Directory, DirectoryKey, EndpointRef};
use crate::error::{Error, Result};
use crate::fanout::{Dialer, Fanout, FanoutEvent, FanoutReport, PeerEndpoint};
use crate::rpc::{Call, Dispatcher, PeerCall, Reply};
use crate::util::Handle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    Plain,
    EmphasisPrimary,
    EmphasisSecondary,
    Error,
    System,
}

/// Whatever shows the transcript and the member list to the user.
pub trait Presentation: Send + Sync {
    fn on_transcript_line(&self, text: &str, style: LineStyle);
    fn on_peer_list_add(&self, name: &str);
    fn on_peer_list_remove(&self, name: &str);
    fn on_peer_list_clear(&self);
}

/// Inbound side of a peer. Forwards every call to the presentation.
pub struct Inbox {
    own_name: Handle<Option<DisplayName>>,
    members: Handle<BTreeSet<DisplayName>>,
    presentation: Arc<dyn Presentation>,
}

impl Inbox {
    fn new(own_name: Handle<Option<DisplayName>>, presentation: Arc<dyn Presentation>) -> Self {
        Self {
            own_name,
            members: Handle::default(),
            presentation,
        }
    }

    fn is_own_name(&self, name: &str) -> bool {
        self.own_name.get().as_deref() == Some(name)
    }

    fn add_member(&self, name: &str) {
        self.members.get_mut().insert(name.to_owned());
        self.presentation.on_peer_list_add(name);
    }

    fn remove_member(&self, name: &str) {
        self.members.get_mut().remove(name);
        self.presentation.on_peer_list_remove(name);
    }

    fn clear_members(&self) {
        self.members.get_mut().clear();
        self.presentation.on_peer_list_clear();
    }
}

#[async_trait]
impl PeerEndpoint for Inbox {
    async fn deliver_message(&self, message: Message) -> Result<()> {
        let style = if self.is_own_name(&message.sender) {
            LineStyle::EmphasisPrimary
        } else {
            LineStyle::Plain
        };
        self.presentation.on_transcript_line(&message.to_string(), style);
        Ok(())
    }

    async fn peer_joined(&self, name: &str) -> Result<()> {
        if !self.is_own_name(name) {
            self.presentation
                .on_transcript_line(&format!("{name} is connected."), LineStyle::System);
        }
        self.add_member(name);
        Ok(())
    }

    async fn peer_left(&self, name: &str) -> Result<()> {
        self.remove_member(name);
        if !self.is_own_name(name) {
            self.presentation
                .on_transcript_line(&format!("{name} is disconnected."), LineStyle::System);
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for Inbox {
    async fn dispatch(&self, call: Call) -> Reply {
        let result = match call {
            Call::Peer(PeerCall::DeliverMessage { message }) => self.deliver_message(message).await,
            Call::Peer(PeerCall::PeerJoined { name }) => self.peer_joined(&name).await,
            Call::Peer(PeerCall::PeerLeft { name }) => self.peer_left(&name).await,
            other => return Reply::unsupported(&other),
        };

        match result {
            Ok(()) => Reply::Done,
            Err(err) => Reply::Failed(err.to_string()),
        }
    }
}

/// Outbound side of a peer: join, send and leave.
///
/// Every failure is also reported to the local user through the presentation,
/// so callers may drop the returned errors.
pub struct Peer {
    authority: Arc<dyn SessionAuthority>,
    directory: Arc<dyn Directory>,
    fanout: Fanout,
    inbox: Arc<Inbox>,
    presentation: Arc<dyn Presentation>,
    endpoint: EndpointRef,
    name: Handle<Option<DisplayName>>,
    // Held across a whole connect or disconnect.
    session: Mutex<()>,
}

impl Peer {
    /// `endpoint` is where other peers reach this peer's [`Inbox`].
    pub fn new(
        authority: Arc<dyn SessionAuthority>,
        directory: Arc<dyn Directory>,
        dialer: Arc<dyn Dialer>,
        presentation: Arc<dyn Presentation>,
        endpoint: EndpointRef,
        call_timeout: Duration,
    ) -> Self {
        let name = Handle::from(None);
        let inbox = Arc::new(Inbox::new(name.clone(), presentation.clone()));
        let fanout = Fanout::new(authority.clone(), directory.clone(), dialer, call_timeout);

        Self {
            authority,
            directory,
            fanout,
            inbox,
            presentation,
            endpoint,
            name,
            session: Mutex::new(()),
        }
    }

    pub fn inbox(&self) -> Arc<Inbox> {
        self.inbox.clone()
    }

    pub fn endpoint(&self) -> &EndpointRef {
        &self.endpoint
    }

    pub fn name(&self) -> Option<DisplayName> {
        self.name.get().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.name.get().is_some()
    }

    /// Names this peer currently shows as connected, sorted.
    pub fn members(&self) -> Vec<DisplayName> {
        self.inbox.members.get().iter().cloned().collect()
    }

    pub fn welcome(&self) {
        self.presentation.on_transcript_line(
            "Welcome on chatlink. Log in with /connect <name>.",
            LineStyle::EmphasisSecondary,
        );
    }

    /// Claims `name`, announces it to everyone and replays the history.
    pub async fn connect(&self, name: &str) -> Result<()> {
        let _session = self.session.lock().await;

        match self.join(name).await {
            Ok(()) => {
                self.system(&format!("You are connected as \"{name}\"."));
                Ok(())
            }
            Err(err) => {
                tracing::info!("connect as {name} failed: {err}");
                self.error(&connect_failure(&err));
                Err(err)
            }
        }
    }

    /// Sends `text` to everyone, this peer included. Empty text is ignored.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let sent = self.distribute(text).await;

        match &sent {
            Ok(()) => {}
            Err(Error::NotConnected) => self.error("Please log in to send messages."),
            Err(err) => {
                tracing::warn!("message not sent: {err}");
                self.error("Error, cannot distribute this message.");
            }
        }
        sent
    }

    /// Releases the name and tells everyone still connected.
    pub async fn disconnect(&self) {
        let _session = self.session.lock().await;

        let Some(name) = self.name() else {
            return;
        };

        self.system("Initiating your disconnection...");

        let released = async {
            self.directory.unregister(&DirectoryKey::Peer(name.clone())).await?;
            self.authority.disconnect(&name).await
        };
        if let Err(err) = released.await {
            tracing::warn!("disconnect of {name} incomplete: {err}");
            self.error(
                "Error, cannot completely disconnect you. \
                 Your name may be unavailable until the server restarts.",
            );
        }

        *self.name.get_mut() = None;

        match self.fanout.broadcast(&FanoutEvent::Left(name)).await {
            Ok(report) => self.report_failures(&report, "cannot notify your disconnection to"),
            Err(err) => {
                tracing::warn!("leave fanout failed: {err}");
                self.error("Error, cannot notify your disconnection.");
            }
        }

        self.inbox.clear_members();
        self.system("Disconnection finished.");
    }

    async fn join(&self, name: &str) -> Result<()> {
        if let Some(current) = self.name() {
            return Err(Error::AlreadyConnected(current));
        }
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        self.system("Initiating your connection...");

        if !self.authority.connect(name).await? {
            return Err(Error::NameUnavailable(name.to_owned()));
        }

        let key = DirectoryKey::Peer(name.to_owned());
        if let Err(err) = self.directory.register(key, self.endpoint.clone()).await {
            if let Err(release) = self.authority.disconnect(name).await {
                tracing::warn!("cannot release {name} after failed registration: {release}");
            }
            return Err(err);
        }

        *self.name.get_mut() = Some(name.to_owned());

        self.spread_connection(name).await;
        self.retrieve_messages().await;
        Ok(())
    }

    async fn distribute(&self, text: &str) -> Result<()> {
        let name = self.name().ok_or(Error::NotConnected)?;
        if text.is_empty() {
            return Ok(());
        }

        let time = self.authority.add_message(&name, text).await?;
        let event = FanoutEvent::Message(Message::new(time, name, text));
        let report = self.fanout.broadcast(&event).await?;

        self.report_failures(&report, "cannot distribute this message to");
        Ok(())
    }

    async fn spread_connection(&self, name: &str) {
        let report = match self.fanout.broadcast(&FanoutEvent::Joined(name.to_owned())).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!("join fanout failed: {err}");
                self.error("Error, cannot notify your connection.");
                return;
            }
        };

        for other in report.delivered.iter().filter(|other| other.as_str() != name) {
            self.inbox.add_member(other);
        }
        self.report_failures(&report, "cannot notify your connection to");
    }

    async fn retrieve_messages(&self) {
        self.system("Recovering message history...");

        let history = match self.authority.get_history().await {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!("cannot fetch history: {err}");
                self.error("Error, cannot retrieve message history.");
                return;
            }
        };

        for message in history {
            if let Err(err) = self.inbox.deliver_message(message).await {
                tracing::warn!("cannot replay a message: {err}");
                self.error("Error, cannot retrieve a message from the history.");
            }
        }
    }

    fn report_failures(&self, report: &FanoutReport, what: &str) {
        for failure in &report.failed {
            self.error(&format!("Error, {what} \"{}\".", failure.target));
        }
    }

    fn system(&self, text: &str) {
        self.presentation.on_transcript_line(&format!("[Server]: {text}"), LineStyle::System);
    }

    fn error(&self, text: &str) {
        self.presentation.on_transcript_line(&format!("[Server]: {text}"), LineStyle::Error);
    }
}

fn connect_failure(err: &Error) -> String {
    match err {
        Error::AlreadyConnected(current) => format!("You are already connected as \"{current}\"."),
        Error::EmptyName => format!("Error on connection: {err}."),
        Error::NameUnavailable(_) => "Error, this name is not available.".to_owned(),
        _ => "Error with the server, try again or relaunch the app.".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::authority::BasicAuthority;
    use crate::directory::LocalDirectory;
    use crate::fanout::LocalDialer;

    #[derive(Default)]
    struct Screen {
        lines: Handle<Vec<(String, LineStyle)>>,
        members: Handle<Vec<String>>,
    }

    impl Screen {
        fn lines_with(&self, style: LineStyle) -> Vec<String> {
            self.lines
                .get()
                .iter()
                .filter(|(_, line_style)| *line_style == style)
                .map(|(text, _)| text.clone())
                .collect()
        }

        fn messages(&self) -> Vec<String> {
            self.lines
                .get()
                .iter()
                .filter(|(_, style)| matches!(style, LineStyle::Plain | LineStyle::EmphasisPrimary))
                .map(|(text, _)| text.clone())
                .collect()
        }

        fn members(&self) -> Vec<String> {
            let mut members = self.members.get().clone();
            members.sort();
            members
        }
    }

    impl Presentation for Screen {
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

    struct Network {
        authority: Arc<BasicAuthority>,
        directory: Arc<LocalDirectory>,
        dialer: Arc<LocalDialer>,
        next_port: u16,
    }

    impl Network {
        fn new() -> Self {
            Self {
                authority: Arc::new(BasicAuthority::new()),
                directory: Arc::new(LocalDirectory::new()),
                dialer: Arc::new(LocalDialer::new()),
                next_port: 6000,
            }
        }

        fn peer(&mut self) -> (Peer, Arc<Screen>) {
            self.next_port += 1;
            let endpoint = EndpointRef::new(SocketAddr::from(([127, 0, 0, 1], self.next_port)));
            let screen = Arc::new(Screen::default());
            let peer = Peer::new(
                self.authority.clone(),
                self.directory.clone(),
                self.dialer.clone(),
                screen.clone(),
                endpoint.clone(),
                Duration::from_secs(1),
            );
            self.dialer.attach(&endpoint, peer.inbox());
            (peer, screen)
        }
    }

    #[tokio::test]
    async fn lone_peer_receives_its_own_message() {
        let mut network = Network::new();
        let (alice, screen) = network.peer();

        alice.connect("alice").await.unwrap();
        alice.send_message("hi").await.unwrap();

        assert_eq!(network.authority.list_connected_names().await.unwrap(), vec!["alice"]);
        let messages = screen.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].ends_with(" alice: hi"));
        assert_eq!(screen.lines_with(LineStyle::EmphasisPrimary), messages);
        assert_eq!(screen.members(), vec!["alice"]);
    }

    #[tokio::test]
    async fn late_joiner_gets_history_by_replay_not_by_fanout() {
        let mut network = Network::new();
        let (alice, alice_screen) = network.peer();
        let (bob, bob_screen) = network.peer();

        alice.connect("alice").await.unwrap();
        alice.send_message("hi").await.unwrap();
        alice.send_message("anyone?").await.unwrap();
        bob.connect("bob").await.unwrap();

        let replayed = bob_screen.messages();
        assert_eq!(replayed.len(), 2);
        assert!(replayed[0].ends_with("alice: hi"));
        assert!(replayed[1].ends_with("alice: anyone?"));

        assert_eq!(alice_screen.messages().len(), 2);
        assert!(alice_screen.lines_with(LineStyle::System).contains(&"bob is connected.".to_owned()));
        assert_eq!(alice_screen.members(), vec!["alice", "bob"]);
        assert_eq!(bob_screen.members(), vec!["alice", "bob"]);

        let bob_notices = bob_screen.lines_with(LineStyle::System);
        assert!(!bob_notices.iter().any(|line| line == "bob is connected."));
    }

    #[tokio::test]
    async fn taken_name_is_refused_without_side_effects() {
        let mut network = Network::new();
        let (bob, _) = network.peer();
        let (alice, alice_screen) = network.peer();
        bob.connect("bob").await.unwrap();

        assert!(matches!(alice.connect("bob").await, Err(Error::NameUnavailable(_))));

        assert!(!alice.is_connected());
        assert_eq!(network.authority.list_connected_names().await.unwrap(), vec!["bob"]);
        assert_eq!(
            network.directory.resolve(&DirectoryKey::Peer("bob".into())).await.unwrap(),
            Some(bob.endpoint().clone())
        );
        assert_eq!(
            alice_screen.lines_with(LineStyle::Error),
            vec!["[Server]: Error, this name is not available."]
        );
    }

    #[tokio::test]
    async fn empty_name_is_rejected_locally() {
        let mut network = Network::new();
        let (peer, screen) = network.peer();

        assert!(matches!(peer.connect("   ").await, Err(Error::EmptyName)));

        assert!(network.authority.list_connected_names().await.unwrap().is_empty());
        assert_eq!(screen.lines_with(LineStyle::Error).len(), 1);
    }

    #[tokio::test]
    async fn sending_before_connecting_is_refused() {
        let mut network = Network::new();
        let (peer, screen) = network.peer();

        assert!(matches!(peer.send_message("hello?").await, Err(Error::NotConnected)));

        assert!(network.authority.get_history().await.unwrap().is_empty());
        assert_eq!(
            screen.lines_with(LineStyle::Error),
            vec!["[Server]: Please log in to send messages."]
        );
    }

    #[tokio::test]
    async fn leaving_notifies_others_and_frees_the_name() {
        let mut network = Network::new();
        let (alice, alice_screen) = network.peer();
        let (bob, bob_screen) = network.peer();
        alice.connect("alice").await.unwrap();
        bob.connect("bob").await.unwrap();

        bob.disconnect().await;

        assert!(!bob.is_connected());
        assert!(bob_screen.members().is_empty());
        assert_eq!(alice_screen.members(), vec!["alice"]);
        assert!(alice_screen.lines_with(LineStyle::System).contains(&"bob is disconnected.".to_owned()));
        assert_eq!(network.directory.resolve(&DirectoryKey::Peer("bob".into())).await.unwrap(), None);

        let (carol, _) = network.peer();
        carol.connect("bob").await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_peer_is_reported_and_skipped() {
        let mut network = Network::new();
        let (alice, alice_screen) = network.peer();
        let (bob, _) = network.peer();
        let (carol, carol_screen) = network.peer();
        alice.connect("alice").await.unwrap();
        bob.connect("bob").await.unwrap();
        carol.connect("carol").await.unwrap();
        network.dialer.detach(bob.endpoint());

        alice.send_message("still there?").await.unwrap();

        assert_eq!(carol_screen.messages().len(), 1);
        assert_eq!(alice_screen.messages().len(), 1);
        assert_eq!(
            alice_screen.lines_with(LineStyle::Error),
            vec!["[Server]: Error, cannot distribute this message to \"bob\"."]
        );
        assert!(carol_screen.lines_with(LineStyle::Error).is_empty());
    }

    #[tokio::test]
    async fn second_connect_while_connected_is_refused() {
        let mut network = Network::new();
        let (alice, _) = network.peer();
        alice.connect("alice").await.unwrap();

        assert!(matches!(alice.connect("alice2").await, Err(Error::AlreadyConnected(_))));

        assert_eq!(alice.name().as_deref(), Some("alice"));
        assert_eq!(network.authority.list_connected_names().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn concurrent_connects_on_one_peer_claim_one_name() {
        let mut network = Network::new();
        let (alice, _) = network.peer();

        let (first, second) = tokio::join!(alice.connect("alice"), alice.connect("bob"));

        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::AlreadyConnected(name)) if name == "alice"));
        assert_eq!(network.authority.list_connected_names().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn members_follow_joins_and_leaves() {
        let mut network = Network::new();
        let (alice, _) = network.peer();
        let (bob, _) = network.peer();
        alice.connect("alice").await.unwrap();
        bob.connect("bob").await.unwrap();

        assert_eq!(alice.members(), vec!["alice", "bob"]);
        assert_eq!(bob.members(), vec!["alice", "bob"]);

        bob.disconnect().await;

        assert_eq!(alice.members(), vec!["alice"]);
        assert!(bob.members().is_empty());
    }

    #[tokio::test]
    async fn inbox_rejects_calls_for_other_services() {
        let mut network = Network::new();
        let (alice, _) = network.peer();

        let reply = alice
            .inbox()
            .dispatch(Call::Authority(crate::rpc::AuthorityCall::GetHistoryPage { start: 0 }))
            .await;

        assert!(matches!(reply, Reply::Failed(_)));
    }
}
