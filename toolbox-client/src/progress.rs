//! Job progress stream
//!
//! The server publishes progress as server-sent events: one `event:` line
//! naming the status and one `data:` line holding the JSON [`ProgressEvent`].
//! Keep-alive comments are skipped.

use futures_util::StreamExt;
use toolbox_core::domain::event::ProgressEvent;
use toolbox_core::domain::job::JobId;
use tracing::debug;

use crate::ConsoleClient;
use crate::error::{ClientError, Result};

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser for a `text/event-stream` body
///
/// Chunks may split lines anywhere; partial lines are buffered until the
/// next chunk arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

impl ConsoleClient {
    /// Follows a job's progress stream until its terminal event
    ///
    /// `on_event` is called for every event in order. Returns the terminal
    /// event, or the last event seen if the server closed the stream early.
    /// A job's stream can be drained once; a second call yields a 404.
    pub async fn follow_progress<F>(&self, id: JobId, mut on_event: F) -> Result<Option<ProgressEvent>>
    where
        F: FnMut(&ProgressEvent),
    {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{}/progress", id)))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        let mut last = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for frame in parser.feed(&chunk) {
                let event: ProgressEvent = serde_json::from_str(&frame.data).map_err(|e| {
                    ClientError::ParseError(format!("Invalid progress event: {}", e))
                })?;

                on_event(&event);

                if event.is_terminal() {
                    return Ok(Some(event));
                }
                last = Some(event);
            }
        }

        debug!("Progress stream for job {} closed before a terminal event", id);
        Ok(last)
    }
}
