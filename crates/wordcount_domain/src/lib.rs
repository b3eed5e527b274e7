#![forbid(unsafe_code)]

pub mod duration;
pub mod tokenize;

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

pub use duration::{DurationError, format_duration, parse_duration};
pub use tokenize::{normalize_word, parse_integer_token, tokenize, tokenize_normalized};

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Normalized chat channel name (`#` prefixed, lower-case).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct ChannelName(String);

impl ChannelName {
	/// Normalize and validate a channel name; `Foo` and `#foo` are the same channel.
	pub fn new(name: impl AsRef<str>) -> Result<Self, ParseIdError> {
		let name = name.as_ref().trim();
		if name.is_empty() {
			return Err(ParseIdError::Empty);
		}

		let mut normalized = name.to_lowercase();
		if !normalized.starts_with('#') {
			normalized.insert(0, '#');
		}

		if normalized.len() == 1 {
			return Err(ParseIdError::Empty);
		}

		if normalized
			.chars()
			.any(|c| c.is_whitespace() || c.is_control() || c == ',' || c == ':')
		{
			return Err(ParseIdError::InvalidFormat(format!("illegal channel name: {name}")));
		}

		Ok(Self(normalized))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for ChannelName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for ChannelName {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ChannelName::new(s)
	}
}

impl TryFrom<String> for ChannelName {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		ChannelName::new(value)
	}
}

impl From<ChannelName> for String {
	fn from(value: ChannelName) -> Self {
		value.0
	}
}

impl AsRef<str> for ChannelName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// One observed word use. `word` is always in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountEvent {
	pub user: String,
	pub word: String,
	/// Unix seconds.
	pub timestamp: i64,
}

impl CountEvent {
	pub fn new(user: impl Into<String>, word: impl Into<String>, timestamp: i64) -> Self {
		Self {
			user: user.into(),
			word: word.into(),
			timestamp,
		}
	}

	/// Whether this event can be stored (non-empty user and word).
	pub fn is_valid(&self) -> bool {
		!self.user.is_empty() && !self.word.is_empty()
	}
}
