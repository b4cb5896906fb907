use crate::ui::render_update;
use anyhow::{anyhow, Result};
use mangrove_core::state::{ConversationError, ConversationSnapshot, ConversationState};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Clear,
    Cancel,
    Quit,
    Skip,
}

/// Interprets one line of user input. Blank lines are skipped here because
/// the conversation itself accepts any content.
pub fn parse_line(line: &str) -> Command {
    let trimmed = line.trim();
    match trimmed {
        "" => Command::Skip,
        "/clear" => Command::Clear,
        "/cancel" => Command::Cancel,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Submit(trimmed.to_string()),
    }
}

/// Line-oriented front end over a [`ConversationState`].
pub struct ConsoleApp {
    state: ConversationState,
    tx: UnboundedSender<Result<(), ConversationError>>,
    rx: UnboundedReceiver<Result<(), ConversationError>>,
}

impl ConsoleApp {
    pub fn new(state: ConversationState) -> Self {
        let (tx, rx) = unbounded_channel();
        Self { state, tx, rx }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Reads commands from `input` until it ends or the user quits, printing
    /// every conversation change to `out`. Pending replies are awaited once
    /// the input is exhausted.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut updates = self.state.subscribe();
        let mut shown = updates.borrow_and_update().clone();
        let mut pending = 0usize;
        let mut input_closed = false;

        loop {
            if input_closed && pending == 0 {
                break;
            }
            tokio::select! {
                line = lines.next_line(), if !input_closed => {
                    let Some(line) = line? else {
                        input_closed = true;
                        continue;
                    };
                    match parse_line(&line) {
                        Command::Submit(content) => {
                            pending += 1;
                            self.submit_in_background(content);
                        }
                        Command::Clear => self.state.clear(),
                        Command::Cancel => {
                            if !self.state.cancel() {
                                writeln!(out, "nothing to cancel")?;
                            }
                        }
                        Command::Quit => break,
                        Command::Skip => {}
                    }
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = updates.borrow_and_update().clone();
                    shown = print_update(out, &shown, next)?;
                }
                Some(result) = self.rx.recv() => {
                    pending = pending.saturating_sub(1);
                    if let Err(err) = result {
                        writeln!(out, "{err}")?;
                    }
                }
            }
        }

        print_update(out, &shown, self.state.snapshot())?;
        Ok(())
    }

    /// Submits a single question and returns the reply text.
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.state.submit(question).await?;
        let snapshot = self.state.snapshot();
        if let Some(error) = snapshot.error {
            return Err(anyhow!(error));
        }
        snapshot
            .messages
            .last()
            .map(|message| message.content().to_string())
            .ok_or_else(|| anyhow!("the chat service sent no reply"))
    }

    fn submit_in_background(&self, content: String) {
        let state = self.state.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = state.submit(content).await;
            if tx.send(result).is_err() {
                warn!("console closed before the reply arrived");
            }
        });
    }
}

fn print_update<W: Write>(
    out: &mut W,
    shown: &ConversationSnapshot,
    next: ConversationSnapshot,
) -> Result<ConversationSnapshot> {
    for line in render_update(shown, &next) {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(next)
}
