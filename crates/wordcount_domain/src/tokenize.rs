#![forbid(unsafe_code)]

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// A word starts with a word character (or a dash directly followed by one)
/// and continues with word characters and dashes.
static WORD_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?:-\w|\w)[-\w]*").expect("word pattern compiles"));

/// Extract word tokens in their original spelling.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
	WORD_PATTERN.find_iter(text).map(|m| m.as_str())
}

/// Canonical form used for matching: NFC composition, then lower-case.
pub fn normalize_word(word: &str) -> String {
	word.nfc().collect::<String>().to_lowercase()
}

/// Extract tokens already normalized for storage.
pub fn tokenize_normalized(text: &str) -> Vec<String> {
	tokenize(text).map(normalize_word).collect()
}

/// Parse a token as a base-10 integer.
///
/// Accepts an optional leading `-` and ASCII digits, with single `_`
/// separators allowed between digits (`1_000`).
pub fn parse_integer_token(token: &str) -> Option<i64> {
	let (negative, digits) = match token.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, token.strip_prefix('+').unwrap_or(token)),
	};

	if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
		return None;
	}

	let mut value: i64 = 0;
	for b in digits.bytes() {
		match b {
			b'_' => continue,
			b'0'..=b'9' => {
				let d = i64::from(b - b'0');
				value = if negative {
					value.checked_mul(10)?.checked_sub(d)?
				} else {
					value.checked_mul(10)?.checked_add(d)?
				};
			}
			_ => return None,
		}
	}

	Some(value)
}
