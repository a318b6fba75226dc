pub mod client;
pub mod sse;

pub use client::{UpstreamChunk, UpstreamClient, VOICE_HINT};
pub use sse::{chunk_json, encode_chunk, SseDecoder, SseEvent, DONE_FRAME};
