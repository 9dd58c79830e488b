//! Line commands driving a [`Peer`] from a text input.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;

use crate::peer::{LineStyle, Peer, Presentation};

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Connect(&'a str),
    Disconnect,
    Who,
    Quit,
    Send(&'a str),
    Unknown(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };

        match head {
            "/connect" => Self::Connect(rest),
            "/disconnect" => Self::Disconnect,
            "/who" => Self::Who,
            "/q" | "/quit" => Self::Quit,
            // A doubled slash sends the rest literally.
            _ if trimmed.starts_with("//") => Self::Send(&trimmed[1..]),
            _ if head.starts_with('/') => Self::Unknown(head),
            _ => Self::Send(trimmed),
        }
    }
}

/// Runs commands from `input` until `/quit`, end of input, a read error or
/// `interrupt`, then releases the peer's name if it holds one.
///
/// Input that is not UTF-8 is decoded lossily.
pub async fn run_console<R>(peer: &Peer, presentation: &dyn Presentation, mut input: R, interrupt: &Notify)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = interrupt.notified() => {
                tracing::info!("interrupted");
                break;
            }
            read = input.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!("cannot read input: {err}");
                break;
            }
        }

        let text = String::from_utf8_lossy(&line);
        // Failures are already on the transcript.
        match Command::parse(&text) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Connect(name) => {
                let _ = peer.connect(name).await;
            }
            Command::Disconnect => peer.disconnect().await,
            Command::Who => presentation.on_transcript_line(
                &format!("Connected: {}", peer.members().join(", ")),
                LineStyle::System,
            ),
            Command::Send(text) => {
                let _ = peer.send_message(text).await;
            }
            Command::Unknown(command) => presentation.on_transcript_line(
                &format!("Unknown command {command}. Try /connect, /disconnect, /who or /quit."),
                LineStyle::Error,
            ),
        }
    }

    peer.disconnect().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(Command::parse("/connect alice"), Command::Connect("alice"));
        assert_eq!(Command::parse("  /connect   bob  "), Command::Connect("bob"));
        assert_eq!(Command::parse("/connect"), Command::Connect(""));
        assert_eq!(Command::parse("/disconnect"), Command::Disconnect);
        assert_eq!(Command::parse("/who\n"), Command::Who);
        assert_eq!(Command::parse("/q"), Command::Quit);
        assert_eq!(Command::parse("hello there \n"), Command::Send("hello there"));
        assert_eq!(Command::parse("//who"), Command::Send("/who"));
        assert_eq!(Command::parse("/dance now"), Command::Unknown("/dance"));
        assert_eq!(Command::parse("   "), Command::Empty);
    }
}
