//! Terminal presentation of session events

use crate::domain::models::{MessageSeverity, SessionEvent, SessionState, StatusMessage};
use std::io::IsTerminal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Startup banner with platform hints
pub fn banner() -> Vec<String> {
    let mut lines = vec![format!(
        "Scroll Wheel host {} - press Ctrl+C or type 'exit' to quit",
        env!("CARGO_PKG_VERSION")
    )];
    if cfg!(target_os = "linux") {
        lines.push("Linux detected: make sure BlueZ is installed and running.".to_string());
    }
    lines
}

fn color(severity: MessageSeverity) -> &'static str {
    match severity {
        MessageSeverity::Info => "\x1b[94m",
        MessageSeverity::Success => "\x1b[32m",
        MessageSeverity::Warning => "\x1b[33m",
        MessageSeverity::Error => "\x1b[31m",
    }
}

/// Format a status line, colored by severity when `ansi` is set
pub fn format_status(msg: &StatusMessage, ansi: bool) -> String {
    if ansi {
        format!("{}{}\x1b[0m", color(msg.severity), msg.message)
    } else {
        msg.message.clone()
    }
}

/// Format an event for the operator; state changes below `Active` stay in
/// the log only
pub fn format_event(event: &SessionEvent, ansi: bool) -> Option<String> {
    match event {
        SessionEvent::Status(msg) => Some(format_status(msg, ansi)),
        SessionEvent::Battery(level) => Some(format!("Battery level: {}%", level)),
        SessionEvent::StateChanged(state @ (SessionState::Closed | SessionState::Failed)) => {
            Some(format!("Session {}", state))
        }
        SessionEvent::StateChanged(_) => None,
    }
}

/// Print events until every sender is gone
pub fn spawn_printer(mut events: mpsc::UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
    let ansi = std::io::stdout().is_terminal();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = format_event(&event, ansi) {
                println!("{}", line);
            }
        }
    })
}
