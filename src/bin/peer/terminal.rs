use std::io::{stdout, Write};

use chatlink::{LineStyle, Presentation};

/// Line-oriented presentation on stdout. There is no member pane; `/who`
/// prints the peer's member list instead.
#[derive(Default)]
pub struct TerminalPresentation;

impl Presentation for TerminalPresentation {
    fn on_transcript_line(&self, text: &str, style: LineStyle) {
        match style {
            LineStyle::Plain => println!("{text}"),
            LineStyle::EmphasisPrimary => println!("\x1b[1m{text}\x1b[0m"),
            LineStyle::EmphasisSecondary => println!("\x1b[3m{text}\x1b[0m"),
            LineStyle::Error => println!("\x1b[1;31m{text}\x1b[0m"),
            LineStyle::System => println!("\x1b[1;33m{text}\x1b[0m"),
        }
        let _ = stdout().flush();
    }

    fn on_peer_list_add(&self, name: &str) {
        tracing::debug!("member added: {name}");
    }

    fn on_peer_list_remove(&self, name: &str) {
        tracing::debug!("member removed: {name}");
    }

    fn on_peer_list_clear(&self) {
        tracing::debug!("member list cleared");
    }
}
