use crate::domain::ports::{EventMessage, EventSource};
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Reads newline-delimited JSON events from any async buffered source
/// (e.g. a file or stdin).
///
/// Each non-blank line is handed over as one message body; decoding is left to
/// the settler so a malformed line is rejected like any other bad message.
pub struct JsonLinesEventSource<R> {
    lines: tokio::io::Lines<R>,
    line_number: i64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesEventSource<R> {
    pub fn new(source: R) -> Self {
        Self {
            lines: source.lines(),
            line_number: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesEventSource<R> {
    async fn next_event(&mut self) -> Result<Option<EventMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let mut message = EventMessage::new(line.into_bytes());
            message.offset = Some(self.line_number);
            return Ok(Some(message));
        }
        Ok(None)
    }
}
