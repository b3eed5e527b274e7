#![forbid(unsafe_code)]

use bytes::BytesMut;
use proptest::prelude::*;
use wordcount_domain::ChannelName;
use wordcount_protocol::{chunk_budget, encode_line_into, encode_lines, framing_len, split_chunks};

fn channel(name: &str) -> ChannelName {
	ChannelName::new(name).expect("valid channel")
}

/// 100 bytes, no whitespace, mixing 1-, 2-, 3- and 4-byte code points.
fn mixed_payload() -> String {
	let mut s = String::new();
	let pieces = ["a", "é", "€", "😀"];
	let mut i = 0;
	while s.len() < 100 {
		let piece = pieces[i % pieces.len()];
		if s.len() + piece.len() > 100 {
			s.push('z');
		} else {
			s.push_str(piece);
		}
		i += 1;
	}
	s
}

#[test]
fn forty_byte_lines_split_only_at_code_point_boundaries() {
	let ch = channel("#ab");
	assert_eq!(framing_len(&ch), 15);

	let payload = mixed_payload();
	assert_eq!(payload.len(), 100);

	let lines = encode_lines(&ch, &payload, Some(40)).expect("encode_lines");
	assert!(lines.len() >= 4, "expected at least 4 lines, got {}", lines.len());

	let mut rebuilt = String::new();
	for line in &lines {
		assert!(line.len() <= 40, "line too long: {}", line.len());
		let text = std::str::from_utf8(line).expect("line is valid UTF-8");
		let chunk = text
			.strip_prefix("PRIVMSG #ab :")
			.and_then(|s| s.strip_suffix("\r\n"))
			.expect("framed line");
		assert!(chunk.len() <= 25);
		rebuilt.push_str(chunk);
	}

	assert_eq!(rebuilt, payload);
}

#[test]
fn fitting_payload_is_one_line() {
	let ch = channel("#chan");
	let lines = encode_lines(&ch, "Word-counts within the last 5min: cat: 2", Some(512)).expect("encode");
	assert_eq!(lines.len(), 1);
	assert_eq!(&lines[0][..], b"PRIVMSG #chan :Word-counts within the last 5min: cat: 2\r\n");
}

#[test]
fn prefers_whitespace_over_hard_split() {
	let ch = channel("#ab");
	let payload = "cat: 12, dog: 10, bird: 7, fish: 3, horse: 1";
	let lines = encode_lines(&ch, payload, Some(40)).expect("encode");

	for line in &lines {
		let text = std::str::from_utf8(line).expect("utf8");
		let chunk = &text["PRIVMSG #ab :".len()..text.len() - 2];
		assert!(!chunk.ends_with(' '));
		assert!(!chunk.starts_with(' '));
	}
	assert_eq!(lines.len(), 2);
}

#[test]
fn encode_line_into_appends() {
	let ch = channel("#ab");
	let mut buf = BytesMut::new();
	encode_line_into(&mut buf, &ch, "one");
	encode_line_into(&mut buf, &ch, "two");
	assert_eq!(&buf[..], b"PRIVMSG #ab :one\r\nPRIVMSG #ab :two\r\n");
}

proptest! {
	#[test]
	fn chunks_fit_budget_and_keep_content(payload in "\\PC{0,200}", budget in 8usize..64) {
		let chunks = split_chunks(&payload, Some(budget));

		for chunk in &chunks {
			prop_assert!(chunk.len() <= budget);
			prop_assert!(!chunk.is_empty() || payload.is_empty());
		}

		let kept: String = chunks.concat().chars().filter(|c| !c.is_ascii_whitespace()).collect();
		let expected: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
		prop_assert_eq!(kept, expected);
	}

	#[test]
	fn budget_never_below_floor(name in "[a-z]{1,20}", max in 0usize..64) {
		let ch = channel(&name);
		let budget = chunk_budget(&ch, Some(max)).expect("limited");
		prop_assert!(budget >= 8);
		if max >= framing_len(&ch) + 8 {
			prop_assert_eq!(budget, max - framing_len(&ch));
		} else {
			prop_assert_eq!(budget, 8);
		}
	}
}
