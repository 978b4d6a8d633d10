pub mod chunks;
pub mod sse;

pub use sse::{StreamSummary, read_completion_stream};
