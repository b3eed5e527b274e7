#![forbid(unsafe_code)]

//! Human-readable durations such as `1h 5min 30sec`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
	#[error("empty duration")]
	Empty,

	#[error("invalid duration: {0}")]
	Invalid(String),

	#[error("unknown duration unit {unit:?} in {text:?}")]
	UnknownUnit {
		unit: String,
		text: String,
	},

	#[error("duration out of range: {0}")]
	Overflow(String),
}

fn unit_scale(unit: &str) -> Option<i64> {
	match unit.to_ascii_lowercase().as_str() {
		"" | "s" | "sec" | "secs" | "second" | "seconds" => Some(1),
		"m" | "min" | "mins" | "minute" | "minutes" => Some(60),
		"h" | "hour" | "hours" => Some(3600),
		_ => None,
	}
}

/// Parse a duration into seconds.
///
/// The input is a sequence of `<number><unit>` groups with optional
/// whitespace anywhere between tokens; the groups are summed. A number
/// without a unit counts as seconds.
pub fn parse_duration(text: &str) -> Result<i64, DurationError> {
	if text.is_empty() {
		return Err(DurationError::Empty);
	}

	let mut rest = text;
	let mut total: i64 = 0;

	while !rest.is_empty() {
		let s = rest.trim_start();

		let digits_len = s.bytes().take_while(u8::is_ascii_digit).count();
		if digits_len == 0 {
			return Err(DurationError::Invalid(text.to_string()));
		}
		let (digits, s) = s.split_at(digits_len);

		let s = s.trim_start();
		let unit_len = s.bytes().take_while(u8::is_ascii_alphabetic).count();
		let (unit, s) = s.split_at(unit_len);

		rest = s.trim_start();

		let scale = unit_scale(unit).ok_or_else(|| DurationError::UnknownUnit {
			unit: unit.to_string(),
			text: text.to_string(),
		})?;

		let value: i64 = digits
			.parse()
			.map_err(|_| DurationError::Overflow(text.to_string()))?;

		total = value
			.checked_mul(scale)
			.and_then(|v| total.checked_add(v))
			.ok_or_else(|| DurationError::Overflow(text.to_string()))?;
	}

	Ok(total)
}

/// Format seconds as `1h 5min 30sec`, omitting zero components.
pub fn format_duration(seconds: i64) -> String {
	if seconds == 0 {
		return "0sec".to_string();
	}

	let magnitude = seconds.unsigned_abs();
	let hours = magnitude / 3600;
	let minutes = (magnitude % 3600) / 60;
	let secs = magnitude % 60;

	let mut parts = Vec::with_capacity(3);
	if hours > 0 {
		parts.push(format!("{hours}h"));
	}
	if minutes > 0 {
		parts.push(format!("{minutes}min"));
	}
	if secs > 0 {
		parts.push(format!("{secs}sec"));
	}

	let out = parts.join(" ");
	if seconds < 0 { format!("-{out}") } else { out }
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn parses_combined_groups() {
		assert_eq!(parse_duration("1h 30min"), Ok(5400));
		assert_eq!(parse_duration("90s"), Ok(90));
		assert_eq!(parse_duration("5m 30s"), Ok(330));
		assert_eq!(parse_duration("5m30s"), Ok(330));
		assert_eq!(parse_duration(" 2 hours 1 second "), Ok(7201));
	}

	#[test]
	fn bare_number_is_seconds() {
		assert_eq!(parse_duration("300"), Ok(300));
		assert_eq!(parse_duration("1 2"), Ok(3));
	}

	#[test]
	fn units_are_case_insensitive() {
		assert_eq!(parse_duration("1H"), Ok(3600));
		assert_eq!(parse_duration("2Min"), Ok(120));
		assert_eq!(parse_duration("3SECS"), Ok(3));
	}

	#[test]
	fn rejects_bad_input() {
		assert_eq!(parse_duration(""), Err(DurationError::Empty));
		assert!(matches!(parse_duration("   "), Err(DurationError::Invalid(_))));
		assert!(matches!(parse_duration("abc"), Err(DurationError::Invalid(_))));
		assert!(matches!(parse_duration("5d"), Err(DurationError::UnknownUnit { .. })));
		assert!(matches!(parse_duration("5min x"), Err(DurationError::Invalid(_))));
		assert!(matches!(parse_duration("-5"), Err(DurationError::Invalid(_))));
		assert!(matches!(
			parse_duration("99999999999999999999"),
			Err(DurationError::Overflow(_))
		));
		assert!(matches!(
			parse_duration("9223372036854775807h"),
			Err(DurationError::Overflow(_))
		));
	}

	#[test]
	fn formats_components() {
		assert_eq!(format_duration(0), "0sec");
		assert_eq!(format_duration(59), "59sec");
		assert_eq!(format_duration(60), "1min");
		assert_eq!(format_duration(3600), "1h");
		assert_eq!(format_duration(3930), "1h 5min 30sec");
		assert_eq!(format_duration(3601), "1h 1sec");
		assert_eq!(format_duration(-90), "-1min 30sec");
		assert_eq!(format_duration(i64::MIN), "-2562047788015215h 30min 8sec");
	}

	proptest! {
		#[test]
		fn format_then_parse_roundtrips(secs in 0i64..=i64::MAX / 2) {
			prop_assert_eq!(parse_duration(&format_duration(secs)), Ok(secs));
		}
	}
}
