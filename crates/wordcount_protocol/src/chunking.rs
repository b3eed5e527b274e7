#![forbid(unsafe_code)]

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use wordcount_domain::ChannelName;

/// Command prefix of every outbound chat line.
pub const LINE_PREFIX: &str = "PRIVMSG ";

/// Line terminator required by the wire protocol.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Smallest chunk budget handed out. Wide enough for any UTF-8 code point.
pub const MIN_CHUNK_BUDGET: usize = 8;

/// Line limit of classic IRC servers, terminator included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
	#[error("refusing to send an empty message to {channel}")]
	EmptyPayload {
		channel: String,
	},
}

/// Bytes taken by `PRIVMSG <channel> :` plus the terminator.
#[inline]
pub fn framing_len(channel: &ChannelName) -> usize {
	LINE_PREFIX.len() + channel.as_str().len() + 2 + LINE_TERMINATOR.len()
}

/// Payload bytes available per line, or `None` for unlimited lines.
pub fn chunk_budget(channel: &ChannelName, max_line_bytes: Option<usize>) -> Option<usize> {
	let max = max_line_bytes?;
	let budget = max.checked_sub(framing_len(channel)).unwrap_or_default();
	Some(budget.max(MIN_CHUNK_BUDGET))
}

#[inline]
fn is_continuation_byte(b: u8) -> bool {
	(0x80..=0xBF).contains(&b)
}

#[inline]
fn is_split_byte(b: u8) -> bool {
	b == b' ' || b == b'\t'
}

/// Split `payload` into chunks of at most `budget` bytes.
///
/// Splits prefer the last space or tab reachable from the window end; the
/// split character and trailing whitespace are dropped. Without whitespace
/// the split lands on the nearest preceding code point boundary. A single
/// code point wider than `budget` is kept whole.
pub fn split_chunks(payload: &str, budget: Option<usize>) -> Vec<&str> {
	let Some(budget) = budget else {
		return vec![payload];
	};
	let budget = budget.max(1);

	let bytes = payload.as_bytes();
	let len = bytes.len();
	if len <= budget {
		return vec![payload];
	}

	let mut chunks = Vec::with_capacity(len / budget + 1);
	let mut index = 0;

	while index < len {
		let mut next = index + budget;
		if next >= len {
			let rest = &payload[index..];
			if !rest.trim_matches(|c: char| c.is_ascii_whitespace()).is_empty() {
				chunks.push(rest);
			}
			break;
		}

		match (index..=next).rev().find(|&i| is_split_byte(bytes[i])) {
			Some(at) => {
				let chunk = payload[index..at].trim_end_matches(|c: char| c.is_ascii_whitespace());
				if !chunk.is_empty() {
					chunks.push(chunk);
				}
				next = at + 1;
			}
			None => {
				while next > index && is_continuation_byte(bytes[next]) {
					next -= 1;
				}
				if next == index {
					next = index + budget;
					while next < len && is_continuation_byte(bytes[next]) {
						next += 1;
					}
				}
				chunks.push(&payload[index..next]);
			}
		}

		index = next;
	}

	chunks
}

/// Replace characters that would terminate or corrupt a protocol line.
fn sanitize(payload: &str) -> Cow<'_, str> {
	if payload.contains(['\r', '\n', '\0']) {
		Cow::Owned(payload.replace(['\r', '\n', '\0'], " "))
	} else {
		Cow::Borrowed(payload)
	}
}

/// Append one framed line into the provided buffer.
pub fn encode_line_into(buf: &mut BytesMut, channel: &ChannelName, chunk: &str) {
	buf.reserve(framing_len(channel) + chunk.len());
	buf.put_slice(LINE_PREFIX.as_bytes());
	buf.put_slice(channel.as_str().as_bytes());
	buf.put_slice(b" :");
	buf.put_slice(chunk.as_bytes());
	buf.put_slice(LINE_TERMINATOR);
}

/// Chunk text of a line produced by [`encode_line_into`] for `channel`.
pub fn line_payload<'a>(channel: &ChannelName, line: &'a [u8]) -> Option<&'a str> {
	let rest = line.strip_prefix(LINE_PREFIX.as_bytes())?;
	let rest = rest.strip_prefix(channel.as_str().as_bytes())?;
	let rest = rest.strip_prefix(b" :".as_slice())?;
	let chunk = rest.strip_suffix(LINE_TERMINATOR)?;
	std::str::from_utf8(chunk).ok()
}

/// Encode a reply into the fewest wire lines that respect `max_line_bytes`.
pub fn encode_lines(
	channel: &ChannelName,
	payload: &str,
	max_line_bytes: Option<usize>,
) -> Result<Vec<Bytes>, EncodeError> {
	let payload = sanitize(payload);
	if payload.trim().is_empty() {
		return Err(EncodeError::EmptyPayload {
			channel: channel.to_string(),
		});
	}

	let chunks = split_chunks(&payload, chunk_budget(channel, max_line_bytes));

	let mut lines = Vec::with_capacity(chunks.len());
	for chunk in chunks {
		let mut buf = BytesMut::new();
		encode_line_into(&mut buf, channel, chunk);
		lines.push(buf.freeze());
	}

	Ok(lines)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn channel(name: &str) -> ChannelName {
		ChannelName::new(name).expect("valid channel")
	}

	#[test]
	fn framing_counts_prefix_channel_separator_and_terminator() {
		assert_eq!(framing_len(&channel("#ab")), 15);
		assert_eq!(chunk_budget(&channel("#ab"), Some(40)), Some(25));
		assert_eq!(chunk_budget(&channel("#ab"), None), None);
	}

	#[test]
	fn budget_clamps_when_framing_eats_the_limit() {
		assert_eq!(chunk_budget(&channel("#ab"), Some(15)), Some(MIN_CHUNK_BUDGET));
		assert_eq!(chunk_budget(&channel("#ab"), Some(3)), Some(MIN_CHUNK_BUDGET));
	}

	#[test]
	fn tiny_budgets_still_fit_wide_code_points() {
		let budget = chunk_budget(&channel("#ab"), Some(17));
		assert_eq!(budget, Some(MIN_CHUNK_BUDGET));

		let chunks = split_chunks("😀😀😀", budget);
		assert_eq!(chunks, vec!["😀😀", "😀"]);
		assert!(chunks.iter().all(|c| c.len() <= MIN_CHUNK_BUDGET));
	}

	#[test]
	fn splits_on_last_space_in_window() {
		let chunks = split_chunks("hello world foo bar", Some(11));
		assert_eq!(chunks, vec!["hello world", "foo bar"]);
	}

	#[test]
	fn space_just_past_window_yields_full_chunk() {
		let chunks = split_chunks("abcde fghij", Some(5));
		assert_eq!(chunks, vec!["abcde", "fghij"]);
	}

	#[test]
	fn trims_whitespace_before_split_point() {
		let chunks = split_chunks("abc  \t def ghi", Some(7));
		assert_eq!(chunks, vec!["abc", "def ghi"]);
	}

	#[test]
	fn hard_split_respects_code_points() {
		let payload = "ééééé";
		let chunks = split_chunks(payload, Some(3));
		assert_eq!(chunks, vec!["é", "é", "é", "é", "é"]);
	}

	#[test]
	fn code_point_wider_than_budget_is_kept_whole() {
		let chunks = split_chunks("😀😀", Some(2));
		assert_eq!(chunks, vec!["😀", "😀"]);
	}

	#[test]
	fn unlimited_mode_emits_one_chunk() {
		let payload = "x".repeat(10_000);
		assert_eq!(split_chunks(&payload, None), vec![payload.as_str()]);
	}

	#[test]
	fn encode_lines_frames_each_chunk() {
		let lines = encode_lines(&channel("#ab"), "one two", None).expect("encode");
		assert_eq!(lines, vec![Bytes::from_static(b"PRIVMSG #ab :one two\r\n")]);
	}

	#[test]
	fn encode_lines_replaces_line_breaks() {
		let lines = encode_lines(&channel("#ab"), "one\r\nQUIT", None).expect("encode");
		assert_eq!(lines, vec![Bytes::from_static(b"PRIVMSG #ab :one  QUIT\r\n")]);
	}

	#[test]
	fn line_payload_strips_framing() {
		let ch = channel("#ab");
		let lines = encode_lines(&ch, "one two", None).expect("encode");
		assert_eq!(line_payload(&ch, &lines[0]), Some("one two"));
		assert_eq!(line_payload(&channel("#other"), &lines[0]), None);
	}

	#[test]
	fn encode_lines_rejects_empty_payload() {
		let err = encode_lines(&channel("#ab"), "  ", Some(100)).unwrap_err();
		assert_eq!(
			err,
			EncodeError::EmptyPayload {
				channel: "#ab".to_string()
			}
		);
	}
}
