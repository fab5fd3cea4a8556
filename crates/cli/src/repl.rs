//! Line-oriented chat front end over the send workflow.

use chat::{SendOutcome, SendWorkflow};
use proto::{Message, MessageId, PENDING_PLACEHOLDER, SendPhase, Sender, StoreAction};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

const USER_PROMPT: &str = "you> ";
const AI_PREFIX: &str = "ai> ";

/// Parsed REPL input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Quit,
    Clear,
    History,
    Send(String),
}

impl ReplCommand {
    fn parse(raw: &str) -> Self {
        let line = raw.trim();
        match line {
            "" => Self::Empty,
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/history" => Self::History,
            _ => Self::Send(raw.to_string()),
        }
    }
}

/// Turns store changes into terminal output.
///
/// The message currently being streamed is printed incrementally: each
/// `ReplaceText` prints only the new suffix. A replacement that is not an
/// extension of what was printed reprints the message on a fresh line.
#[derive(Debug, Default)]
pub struct TranscriptRenderer {
    streaming: Option<(MessageId, String)>,
}

impl TranscriptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output for one store change, if it is visible.
    pub fn apply(&mut self, action: &StoreAction) -> Option<String> {
        match action {
            StoreAction::AppendMessage(message) => self.append(message),
            StoreAction::ReplaceText { id, text } => self.replace(id, text),
            StoreAction::ClearLog => {
                let was_streaming = self.streaming.take().is_some();
                let lead = if was_streaming { "\n" } else { "" };
                Some(format!("{lead}(conversation cleared)\n"))
            }
        }
    }

    /// Closes the streamed line, if one is open.
    pub fn finish(&mut self) -> Option<String> {
        self.streaming.take().map(|_| "\n".to_string())
    }

    /// Brings the streamed line up to date after missed updates.
    ///
    /// `current` is the message being streamed; it is adopted when its append
    /// was among the missed updates.
    pub fn resync(&mut self, messages: &[Message], current: Option<&MessageId>) -> Option<String> {
        let streaming_id = self.streaming.as_ref().map(|(id, _)| id.clone());
        match streaming_id {
            Some(id) => match messages.iter().find(|m| m.id == id) {
                Some(message) => self.replace(&id, &message.text),
                None => self.finish(),
            },
            None => {
                let id = current?;
                let message = messages
                    .iter()
                    .find(|m| &m.id == id && m.sender == Sender::Ai)?;
                self.streaming = Some((id.clone(), String::new()));
                let text = self.replace(id, &message.text).unwrap_or_default();
                Some(format!("{AI_PREFIX}{text}"))
            }
        }
    }

    fn append(&mut self, message: &Message) -> Option<String> {
        if message.sender == Sender::User || self.is_streaming(&message.id) {
            return None;
        }
        let lead = self.finish().unwrap_or_default();
        if message.is_pending() {
            self.streaming = Some((message.id.clone(), String::new()));
            return Some(format!("{lead}{AI_PREFIX}"));
        }
        Some(format!("{lead}{AI_PREFIX}{}\n", message.text))
    }

    fn replace(&mut self, id: &MessageId, text: &str) -> Option<String> {
        let (streaming_id, printed) = self.streaming.as_mut()?;
        // Older texts still queued after a resync are prefixes of what is shown.
        if streaming_id != id || printed.starts_with(text) {
            return None;
        }
        let out = match text.strip_prefix(printed.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{AI_PREFIX}{text}"),
        };
        *printed = text.to_string();
        Some(out)
    }

    fn is_streaming(&self, id: &MessageId) -> bool {
        self.streaming.as_ref().is_some_and(|(current, _)| current == id)
    }
}

/// Renders the whole log, one message per line.
pub fn render_log(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(no messages)\n".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let prefix = match m.sender {
                Sender::User => USER_PROMPT,
                Sender::Ai => AI_PREFIX,
            };
            let text = if m.is_pending() {
                PENDING_PLACEHOLDER
            } else {
                m.text.as_str()
            };
            format!("{prefix}{text}\n")
        })
        .collect()
}

/// Formats the header printed before a one-shot send.
pub fn format_run_header(exec: &str) -> String {
    format!("{USER_PROMPT}{exec}")
}

/// Interactive loop: reads lines from `input` until EOF or `/quit`.
pub async fn run_chat<R, W>(workflow: &SendWorkflow, input: R, output: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut updates = workflow.store().subscribe();
    let mut renderer = TranscriptRenderer::new();

    info!("Chat session started");
    write_out(output, USER_PROMPT).await?;

    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Clear => {
                workflow.store().clear();
                drain_updates(workflow, &mut updates, &mut renderer, output, None).await?;
            }
            ReplCommand::History => {
                let log = workflow.store().snapshot();
                write_out(output, &render_log(&log)).await?;
            }
            ReplCommand::Send(text) => {
                let mut draft = text;
                stream_send(workflow, &mut draft, &mut updates, &mut renderer, output).await?;
            }
        }
        write_out(output, USER_PROMPT).await?;
    }

    write_out(output, "\n").await?;
    info!(messages = workflow.store().len(), "Chat session ended");
    Ok(())
}

/// Sends a single prompt and prints the streamed answer.
pub async fn run_once<W>(
    workflow: &SendWorkflow,
    prompt: &str,
    output: &mut W,
) -> anyhow::Result<SendOutcome>
where
    W: AsyncWrite + Unpin,
{
    let mut updates = workflow.store().subscribe();
    let mut renderer = TranscriptRenderer::new();
    write_out(output, &format!("{}\n", format_run_header(prompt))).await?;
    let mut draft = prompt.to_string();
    stream_send(workflow, &mut draft, &mut updates, &mut renderer, output).await
}

async fn stream_send<W>(
    workflow: &SendWorkflow,
    draft: &mut String,
    updates: &mut broadcast::Receiver<StoreAction>,
    renderer: &mut TranscriptRenderer,
    output: &mut W,
) -> anyhow::Result<SendOutcome>
where
    W: AsyncWrite + Unpin,
{
    let send = workflow.submit(draft);
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            update = updates.recv() => match update {
                Ok(action) => {
                    if let Some(text) = renderer.apply(&action) {
                        write_out(output, &text).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Renderer lagged behind store updates");
                    let current = streaming_id(workflow);
                    let snapshot = workflow.store().snapshot();
                    if let Some(text) = renderer.resync(&snapshot, current.as_ref()) {
                        write_out(output, &text).await?;
                    }
                }
                Err(RecvError::Closed) => {
                    break (&mut send).await;
                }
            },
        }
    };

    drain_updates(workflow, updates, renderer, output, outcome_id(&outcome)).await?;
    if let Some(text) = renderer.finish() {
        write_out(output, &text).await?;
    }

    match &outcome {
        SendOutcome::Completed { text, .. } => {
            debug!(answer_len = text.len(), "Send completed");
        }
        SendOutcome::Failed { error, .. } => {
            debug!(error = %error, "Send failed");
        }
        SendOutcome::Ignored | SendOutcome::Busy => {}
    }
    Ok(outcome)
}

fn streaming_id(workflow: &SendWorkflow) -> Option<MessageId> {
    match workflow.phase() {
        SendPhase::Streaming { message_id } => Some(message_id),
        SendPhase::Idle | SendPhase::Sending => None,
    }
}

/// AI message a finished send wrote to.
fn outcome_id(outcome: &SendOutcome) -> Option<&MessageId> {
    match outcome {
        SendOutcome::Completed { message_id, .. } => Some(message_id),
        SendOutcome::Failed { notice_id, .. } => Some(notice_id),
        SendOutcome::Ignored | SendOutcome::Busy => None,
    }
}

async fn drain_updates<W>(
    workflow: &SendWorkflow,
    updates: &mut broadcast::Receiver<StoreAction>,
    renderer: &mut TranscriptRenderer,
    output: &mut W,
    current: Option<&MessageId>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let text = match updates.try_recv() {
            Ok(action) => renderer.apply(&action),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Renderer lagged behind store updates");
                renderer.resync(&workflow.store().snapshot(), current)
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        };
        if let Some(text) = text {
            write_out(output, &text).await?;
        }
    }
}

async fn write_out<W>(output: &mut W, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}
