use bytes::Bytes;
use futures_util::stream;

use crate::error::ChatError;
use crate::streaming::read_completion_stream;
use crate::streaming::sse::{SseEvent, SseLineDecoder};

fn delta_line(text: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
    )
}

fn chunks(
    parts: Vec<Vec<u8>>,
) -> impl futures_util::Stream<Item = Result<Bytes, ChatError>> + Unpin {
    stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
}

async fn collect(parts: Vec<Vec<u8>>) -> (String, crate::streaming::StreamSummary) {
    let mut text = String::new();
    let summary = read_completion_stream(chunks(parts), |delta| text.push_str(delta))
        .await
        .expect("stream completes");
    (text, summary)
}

#[test]
fn decodes_deltas_until_done() {
    let mut decoder = SseLineDecoder::new();
    let body = format!("{}{}data: [DONE]\n\n", delta_line("A"), delta_line("B"));

    let events = decoder.feed(body.as_bytes());
    assert_eq!(
        events,
        vec![
            SseEvent::Delta("A".to_string()),
            SseEvent::Delta("B".to_string()),
            SseEvent::Done
        ]
    );
    assert!(decoder.is_done());
}

#[test]
fn lines_after_done_are_ignored() {
    let mut decoder = SseLineDecoder::new();
    let body = format!("data: [DONE]\n{}", delta_line("late"));
    assert_eq!(decoder.feed(body.as_bytes()), vec![SseEvent::Done]);
    assert!(decoder.feed(delta_line("later").as_bytes()).is_empty());
    assert_eq!(decoder.finish(), None);
}

#[test]
fn malformed_line_is_skipped() {
    let mut decoder = SseLineDecoder::new();
    let body = format!("{}data: {{broken json\n{}", delta_line("A"), delta_line("B"));

    let events = decoder.feed(body.as_bytes());
    assert_eq!(
        events,
        vec![SseEvent::Delta("A".to_string()), SseEvent::Delta("B".to_string())]
    );
    assert_eq!(decoder.skipped_lines(), 1);
}

#[test]
fn non_data_lines_are_ignored() {
    let mut decoder = SseLineDecoder::new();
    let body = format!(": keep-alive\nevent: message\nid: 7\n\n{}", delta_line("x"));
    assert_eq!(decoder.feed(body.as_bytes()), vec![SseEvent::Delta("x".to_string())]);
    assert_eq!(decoder.skipped_lines(), 0);
}

#[test]
fn crlf_line_endings_are_accepted() {
    let mut decoder = SseLineDecoder::new();
    let body = delta_line("hi").replace('\n', "\r\n");
    assert_eq!(decoder.feed(body.as_bytes()), vec![SseEvent::Delta("hi".to_string())]);
}

#[test]
fn final_line_without_newline_is_decoded_on_finish() {
    let mut decoder = SseLineDecoder::new();
    let line = delta_line("tail");
    let without_newline = line.trim_end_matches('\n');

    assert!(decoder.feed(without_newline.as_bytes()).is_empty());
    assert_eq!(decoder.finish(), Some(SseEvent::Delta("tail".to_string())));
}

#[test]
fn finish_reason_is_reported() {
    let mut decoder = SseLineDecoder::new();
    decoder.feed(b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n");
    assert_eq!(decoder.finish_reason(), Some("stop"));
}

#[tokio::test]
async fn line_split_across_chunks_is_reassembled() {
    let body = format!("{}{}data: [DONE]\n", delta_line("Hello"), delta_line(" world"));
    let bytes = body.into_bytes();
    let parts = bytes.chunks(7).map(|c| c.to_vec()).collect();

    let (text, summary) = collect(parts).await;
    assert_eq!(text, "Hello world");
    assert_eq!(summary.fragment_count, 2);
    assert!(summary.saw_done);
}

#[tokio::test]
async fn multibyte_character_split_across_chunks_survives() {
    let body = format!("{}data: [DONE]\n", delta_line("你好🙂"));
    let bytes = body.into_bytes();
    let split = bytes
        .iter()
        .position(|b| *b >= 0x80)
        .expect("multibyte content")
        + 1;
    let parts = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];

    let (text, _) = collect(parts).await;
    assert_eq!(text, "你好🙂");
}

#[tokio::test]
async fn stream_without_done_still_completes() {
    let parts = vec![delta_line("A").into_bytes(), delta_line("B").into_bytes()];
    let (text, summary) = collect(parts).await;
    assert_eq!(text, "AB");
    assert!(!summary.saw_done);
}

#[tokio::test]
async fn read_error_keeps_already_delivered_fragments() {
    let parts: Vec<Result<Bytes, ChatError>> = vec![
        Ok(Bytes::from(delta_line("A"))),
        Err(ChatError::stream_read("connection reset")),
        Ok(Bytes::from(delta_line("B"))),
    ];
    let mut text = String::new();

    let result = read_completion_stream(stream::iter(parts), |delta| text.push_str(delta)).await;
    assert_eq!(result, Err(ChatError::stream_read("connection reset")));
    assert_eq!(text, "A");
}
