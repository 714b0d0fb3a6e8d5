//! Operator line input
//!
//! Terminal reads block, so [`StdinLines`] reads on a dedicated thread and
//! forwards lines over a channel. Awaiting a line never stalls the runtime
//! and the reader can be abandoned at teardown.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tracing::debug;

/// Source of operator-entered lines
#[async_trait]
pub trait LineSource: Send {
    /// Show `prompt` and wait for the next line, without its terminator.
    /// `None` means the input is closed.
    async fn next_line(&mut self, prompt: &str) -> Option<String>;

    /// Print a line of operator-facing output
    fn show(&mut self, text: &str);
}

pub struct StdinLines {
    lines: mpsc::Receiver<String>,
}

impl StdinLines {
    /// Start the reader thread
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(16);
        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                debug!("stdin reader finished");
            })
            .ok();
        Self { lines: rx }
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn next_line(&mut self, prompt: &str) -> Option<String> {
        if !prompt.is_empty() {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{}", prompt);
            let _ = stdout.flush();
        }
        self.lines
            .recv()
            .await
            .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn show(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Pre-recorded operator input
#[derive(Debug, Default)]
pub struct ScriptedLines {
    lines: std::collections::VecDeque<String>,
    pub shown: Vec<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            shown: Vec::new(),
        }
    }
}

#[async_trait]
impl LineSource for ScriptedLines {
    async fn next_line(&mut self, _prompt: &str) -> Option<String> {
        self.lines.pop_front()
    }

    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}
