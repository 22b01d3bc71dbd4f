//! Operator interaction.
//!
//! The pipeline suspends for a human only while a platform CLI is being
//! installed and while the operator logs in to a platform.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::watch;

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The operator agreed or signalled completion.
    Confirmed,
    /// The operator declined or closed the input.
    Declined,
}

/// Source of operator decisions.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Asks a yes/no question, blocking until the operator answers.
    async fn confirm(&self, prompt: &str) -> Confirmation;

    /// Shows an informational message.
    async fn inform(&self, message: &str);
}

/// Operator on the controlling terminal.
pub struct TerminalOperator {
    input: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for TerminalOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalOperator {
    /// Creates a terminal operator reading answers from stdin.
    pub fn new() -> Self {
        Self {
            input: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

fn parse_answer(line: &str) -> Confirmation {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Confirmation::Confirmed,
        _ => Confirmation::Declined,
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn confirm(&self, prompt: &str) -> Confirmation {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(format!("{} [Y/n] ", prompt).as_bytes()).await;
        let _ = stdout.flush().await;

        let mut input = self.input.lock().await;
        match input.next_line().await {
            Ok(Some(line)) => parse_answer(&line),
            Ok(None) => Confirmation::Declined,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read operator input");
                Confirmation::Declined
            }
        }
    }

    async fn inform(&self, message: &str) {
        println!("{}", message);
    }
}

/// Operator that replays a fixed list of answers.
///
/// Once the answers run out every prompt is declined.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<Confirmation>>,
    prompts: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    /// Creates an operator that answers with `answers` in order.
    pub fn new(answers: impl IntoIterator<Item = Confirmation>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Informational messages shown so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, prompt: &str) -> Confirmation {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Confirmation::Declined)
    }

    async fn inform(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

/// Receiving side of an operator interrupt.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Creates a linked sender/receiver pair.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested. Pends forever if the sender
    /// is gone without having cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
