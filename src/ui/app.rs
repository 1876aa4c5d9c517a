use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::common::Message;
use crate::network::ChatService;

use super::components::input_bar::{self, Input};
use super::components::chat_area;
use super::state::AppState;

const EMPTY_BODY_NOTICE: &str = "! message body is required";

pub struct ChatApp {
    state: AppState,
    service: Arc<ChatService>,
    inbound: broadcast::Receiver<Message>,
}

impl ChatApp {
    /// Subscribes immediately so nothing arriving before `run` is missed.
    pub fn new(service: Arc<ChatService>, sender: String) -> Self {
        let inbound = service.subscribe();
        Self {
            state: AppState::new(sender),
            service,
            inbound,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    /// Read lines from `input` until `/quit` or EOF, printing the inbox to
    /// `output` as messages arrive.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        log::debug!("Input closed");
                        break;
                    };
                    match input_bar::read(&line) {
                        Input::Send(body) => self.send(body),
                        Input::Empty => {
                            output.write_all(format!("{EMPTY_BODY_NOTICE}\n").as_bytes()).await?;
                            output.flush().await?;
                        }
                        Input::Quit => break,
                    }
                }
                inbound = self.inbound.recv() => match inbound {
                    Ok(message) => {
                        let line = chat_area::render(&message, chrono::Local::now());
                        output.write_all(format!("{line}\n").as_bytes()).await?;
                        output.flush().await?;
                        self.state.push_message(message);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Inbox fell behind; skipped {skipped} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }

    fn send(&self, body: String) {
        match Message::new(self.state.sender.clone(), body) {
            Ok(message) => {
                self.service.send(message);
            }
            Err(err) => log::warn!("Not sending: {err}"),
        }
    }
}
