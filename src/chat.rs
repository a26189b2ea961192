use std::fmt::Display;

use futures::{pin_mut, Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{api::Api, types::ChatReq};

pub const RATE_LIMIT_REPLY: &str = "Limit has been reached. Please wait for awhile.";
pub const FAILURE_REPLY: &str = "Something went wrong.";

const FRAME_PREFIX: &str = "data: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// One transcript entry. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
        }
    }

    /// Lines as they should be displayed. Line breaks in the content are kept.
    pub fn render_lines(&self) -> Vec<String> {
        let label = match self.role {
            Role::User => "you> ",
            Role::Bot => "bot> ",
        };
        let indent = " ".repeat(label.len());
        self.content
            .split('\n')
            .enumerate()
            .map(|(i, line)| {
                let prefix = if i == 0 { label } else { indent.as_str() };
                format!("{}{}", prefix, line.trim_end_matches('\r'))
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Frame {
    message: String,
}

/// Extracts the cumulative reply from a `data: {...}` frame.
pub fn parse_frame(line: &str) -> Option<String> {
    let data = line.strip_prefix(FRAME_PREFIX)?.trim();
    match serde_json::from_str::<Frame>(data) {
        Ok(frame) => Some(frame.message),
        Err(err) => {
            tracing::warn!("Skipping malformed chat frame: {}", err);
            None
        }
    }
}

/// Splits a byte stream into newline-terminated frames. Bytes are held until
/// a newline arrives, so frames and UTF-8 sequences may straddle chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&line[..pos]));
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Blank input, nothing was sent.
    Ignored,
    Replied,
    RateLimited,
    Failed,
}

/// Chat transcript for one bot thread.
#[derive(Debug)]
pub struct ChatView {
    bot_id: String,
    thread_id: String,
    transcript: Vec<Message>,
    partial: String,
}

impl ChatView {
    pub fn new(bot_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            thread_id: thread_id.into(),
            transcript: Vec::new(),
            partial: String::new(),
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Reply text received so far for the message in flight.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Sends `text` and streams the reply into the transcript. `on_partial`
    /// sees the cumulative reply every time a frame arrives.
    pub async fn submit<F>(
        &mut self,
        api: &Api,
        token: Option<&str>,
        text: &str,
        on_partial: F,
    ) -> Outcome
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Outcome::Ignored;
        }
        self.transcript.push(Message::user(text));

        let payload = ChatReq {
            chatbot_id: self.bot_id.clone(),
            thread_id: self.thread_id.clone(),
            message: text.to_string(),
        };
        let resp = match api.open_chat(token, &payload).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::error!("Streaming error: {}", err);
                self.transcript.push(Message::bot(FAILURE_REPLY));
                return Outcome::Failed;
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Chat rate limit reached for bot {}", self.bot_id);
            self.transcript.push(Message::bot(RATE_LIMIT_REPLY));
            return Outcome::RateLimited;
        }
        if !status.is_success() {
            tracing::error!("Streaming failed with status {}", status);
            self.transcript.push(Message::bot(FAILURE_REPLY));
            return Outcome::Failed;
        }

        self.consume(resp.bytes_stream(), on_partial).await
    }

    /// Reads frames until the stream ends. Each frame replaces the partial reply.
    pub async fn consume<S, B, E, F>(&mut self, stream: S, mut on_partial: F) -> Outcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
        F: FnMut(&str),
    {
        pin_mut!(stream);
        let mut decoder = FrameDecoder::default();
        self.partial.clear();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!("Streaming error: {}", err);
                    self.partial.clear();
                    self.transcript.push(Message::bot(FAILURE_REPLY));
                    return Outcome::Failed;
                }
            };
            for line in decoder.push(chunk.as_ref()) {
                self.apply(&line, &mut on_partial);
            }
        }
        if let Some(line) = decoder.finish() {
            self.apply(&line, &mut on_partial);
        }

        let reply = std::mem::take(&mut self.partial);
        self.transcript.push(Message::bot(reply));
        Outcome::Replied
    }

    fn apply<F: FnMut(&str)>(&mut self, line: &str, on_partial: &mut F) {
        if let Some(message) = parse_frame(line) {
            self.partial = message;
            on_partial(&self.partial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], String>> {
        stream::iter(parts.iter().copied().map(|x| Ok(x.as_bytes())).collect::<Vec<_>>())
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(
            parse_frame(r#"data: {"message": "Hi there"}"#),
            Some("Hi there".to_string())
        );
        assert_eq!(parse_frame("event: ping"), None);
        assert_eq!(parse_frame("data: not json"), None);
        assert_eq!(parse_frame(""), None);
    }

    #[test]
    fn test_decoder_joins_split_frames() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(b"data: {\"mess").is_empty());
        let lines = decoder.push(b"age\": \"Hi\"}\r\ndata: {\"message\": \"Hi t");
        assert_eq!(lines, vec![r#"data: {"message": "Hi"}"#.to_string()]);
        assert_eq!(
            decoder.finish(),
            Some(r#"data: {"message": "Hi t"#.to_string())
        );
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_keeps_multibyte_chars_across_chunks() {
        let frame = "data: {\"message\": \"caf\u{e9}\"}\n".as_bytes();
        let split = frame.len() - 4; // inside the two-byte é
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(&frame[..split]).is_empty());
        let lines = decoder.push(&frame[split..]);
        assert_eq!(parse_frame(&lines[0]), Some("caf\u{e9}".to_string()));
    }

    #[tokio::test]
    async fn test_cumulative_frames_replace_partial() {
        let mut view = ChatView::new("b1", "default");
        let mut seen = Vec::new();
        let outcome = view
            .consume(
                chunks(&[
                    "data: {\"message\": \"Hi\"}\n",
                    "data: {\"message\": \"Hi there\"}\ndata: {\"message\"",
                    ": \"Hi there!\"}\n",
                ]),
                |partial| seen.push(partial.to_string()),
            )
            .await;

        assert_eq!(outcome, Outcome::Replied);
        assert_eq!(seen, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(view.partial(), "");
        assert_eq!(
            view.transcript().last(),
            Some(&Message::bot("Hi there!"))
        );
        assert_eq!(view.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_unterminated_last_frame_is_used() {
        let mut view = ChatView::new("b1", "default");
        view.consume(
            chunks(&["data: {\"message\": \"Hel\"}\n", "data: {\"message\": \"Hello\"}"]),
            |_| {},
        )
        .await;
        assert_eq!(view.transcript()[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let mut view = ChatView::new("b1", "default");
        view.consume(
            chunks(&[
                "data: {\"message\": \"A\"}\n",
                "data: {oops}\n",
                ": keep-alive\n",
            ]),
            |_| {},
        )
        .await;
        assert_eq!(view.transcript()[0].content, "A");
    }

    #[tokio::test]
    async fn test_read_failure_appends_failure_reply() {
        let mut view = ChatView::new("b1", "default");
        let parts: Vec<Result<&'static [u8], String>> = vec![
            Ok(&b"data: {\"message\": \"Half\"}\n"[..]),
            Err("connection reset".to_string()),
        ];
        let outcome = view.consume(stream::iter(parts), |_| {}).await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(view.partial(), "");
        assert_eq!(view.transcript(), &[Message::bot(FAILURE_REPLY)]);
    }

    #[test]
    fn test_render_lines_keeps_line_breaks() {
        let msg = Message::bot("Opening hours:\nMon-Fri 9-5\r\n\nClosed weekends");
        assert_eq!(
            msg.render_lines(),
            vec![
                "bot> Opening hours:",
                "     Mon-Fri 9-5",
                "     ",
                "     Closed weekends",
            ]
        );
    }
}
