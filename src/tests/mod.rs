mod engine_tests;
mod sse_decoder_tests;
