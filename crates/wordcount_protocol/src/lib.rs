#![forbid(unsafe_code)]

pub mod chunking;

pub use chunking::{
	DEFAULT_MAX_LINE_BYTES, EncodeError, LINE_PREFIX, LINE_TERMINATOR, MIN_CHUNK_BUDGET, chunk_budget, encode_line_into,
	encode_lines, framing_len, line_payload, split_chunks,
};
