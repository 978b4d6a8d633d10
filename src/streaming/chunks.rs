use serde_json::Value;

#[derive(Default)]
pub struct ChunkProcessingState {
    last_finish_reason: Option<String>,
}

impl ChunkProcessingState {
    pub fn finish_reason(&self) -> Option<&str> {
        self.last_finish_reason.as_deref()
    }

    pub fn update_finish_reason(&mut self, choice: &Value) {
        if let Some(reason) = choice.get("finish_reason").and_then(|value| value.as_str()) {
            self.last_finish_reason = Some(reason.to_string());
        }
    }
}

pub fn extract_first_choice(chunk: &Value) -> Option<&Value> {
    chunk
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|array| array.first())
}

/// Returns the text carried by `choice.delta.content`, or `None` when the
/// chunk has no text (role-only deltas, finish markers, usage chunks).
pub fn process_choice_delta(choice: &Value, state: &mut ChunkProcessingState) -> Option<String> {
    state.update_finish_reason(choice);

    let mut content = String::new();
    if let Some(content_value) = choice.get("delta").and_then(|delta| delta.get("content")) {
        append_stream_content(content_value, &mut content);
    }

    (!content.is_empty()).then_some(content)
}

fn append_stream_content(content_value: &Value, buffer: &mut String) {
    match content_value {
        Value::String(text) => buffer.push_str(text),
        Value::Array(items) => {
            for item in items {
                if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                    buffer.push_str(text);
                }
            }
        }
        Value::Object(obj) => {
            if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                buffer.push_str(text);
            } else if let Some(nested) = obj.get("content") {
                append_stream_content(nested, buffer);
            }
        }
        _ => {}
    }
}
