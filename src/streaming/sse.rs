use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::constants::{LOG_PREFIX_CONN, SSE_DATA_PREFIX, SSE_DONE_MESSAGE, SSE_LINE_BOUNDARY};
use crate::error::ChatError;
use crate::logging::{log_timed, sanitize_log_message};
use crate::streaming::chunks::{ChunkProcessingState, extract_first_choice, process_choice_delta};

static STREAM_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Next piece of assistant text
    Delta(String),
    /// The `[DONE]` terminator
    Done,
}

/// Splits a response body into lines and decodes `data: ` payloads.
///
/// Network chunks may end mid-line (or mid-character); the unfinished tail
/// is kept until the rest arrives. Everything after `[DONE]` is ignored.
#[derive(Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
    state: ChunkProcessingState,
    skipped_lines: u64,
    done: bool,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(boundary_pos) = self.buffer.iter().position(|b| *b == SSE_LINE_BOUNDARY) {
            let line: Vec<u8> = self.buffer.drain(..=boundary_pos).collect();
            if let Some(event) = self.decode_raw_line(&line[..boundary_pos]) {
                let finished = event == SseEvent::Done;
                events.push(event);
                if finished {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Decodes a final line left without a trailing newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done || self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        let event = self.decode_raw_line(&line);
        if event == Some(SseEvent::Done) {
            self.done = true;
        }
        event
    }

    pub fn decode_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(data_content) = line.strip_prefix(SSE_DATA_PREFIX) else {
            if !line.trim().is_empty() {
                log::debug!("SSE format: non-data line: {}", sanitize_log_message(line));
            }
            return None;
        };

        if data_content.trim() == SSE_DONE_MESSAGE {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<Value>(data_content) {
            Ok(json_chunk) => extract_first_choice(&json_chunk)
                .and_then(|choice| process_choice_delta(choice, &mut self.state))
                .map(SseEvent::Delta),
            Err(e) => {
                self.skipped_lines += 1;
                log::debug!("SSE parsing error, line skipped: {}", e);
                None
            }
        }
    }

    fn decode_raw_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        match std::str::from_utf8(raw) {
            Ok(line) => self.decode_line(line),
            Err(e) => {
                self.skipped_lines += 1;
                log::debug!("SSE line is not valid UTF-8, skipped: {}", e);
                None
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.state.finish_reason()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub fragment_count: u64,
    pub skipped_lines: u64,
    pub saw_done: bool,
    pub finish_reason: Option<String>,
}

/// Drives a response body to completion, handing each text fragment to
/// `on_delta` as soon as it is decoded.
///
/// Ends at `[DONE]` or at end of body. A failed chunk read aborts with the
/// transport's error; fragments already delivered stay delivered.
pub async fn read_completion_stream<S, F>(
    mut stream: S,
    mut on_delta: F,
) -> Result<StreamSummary, ChatError>
where
    S: Stream<Item = Result<bytes::Bytes, ChatError>> + Unpin,
    F: FnMut(&str),
{
    let stream_id = STREAM_COUNTER.fetch_add(1, Ordering::Relaxed) % 1_000_000;
    let start_time = Instant::now();
    let mut decoder = SseLineDecoder::new();
    let mut summary = StreamSummary::default();

    let mut deliver = |event: SseEvent, summary: &mut StreamSummary| match event {
        SseEvent::Delta(text) => {
            summary.fragment_count += 1;
            on_delta(&text);
        }
        SseEvent::Done => summary.saw_done = true,
    };

    while !decoder.is_done() {
        let Some(chunk_result) = stream.next().await else {
            if let Some(event) = decoder.finish() {
                deliver(event, &mut summary);
            }
            if !summary.saw_done {
                log::debug!("stream [{}] ended without [DONE]", stream_id);
            }
            break;
        };

        let bytes_chunk = chunk_result.inspect_err(|e| {
            log::error!("stream [{}] aborted: {}", stream_id, e);
        })?;

        for event in decoder.feed(&bytes_chunk) {
            deliver(event, &mut summary);
        }
    }

    summary.skipped_lines = decoder.skipped_lines();
    summary.finish_reason = decoder.finish_reason().map(str::to_string);

    log_timed(
        LOG_PREFIX_CONN,
        &format!(
            "stream [{}] completed | {} fragments | {} skipped",
            stream_id, summary.fragment_count, summary.skipped_lines
        ),
        start_time,
    );

    Ok(summary)
}
