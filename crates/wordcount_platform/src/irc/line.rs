#![forbid(unsafe_code)]

use crate::{ChannelRole, Roles};

/// A parsed protocol line: `[@tags] [:<prefix>] <command> [<params>] [:<trailing>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
	pub prefix: Option<String>,
	pub command: String,
	pub params: Vec<String>,
}

impl IrcLine {
	/// Parse one raw line; message tags are skipped.
	pub fn parse(line: &str) -> Option<Self> {
		let mut line = line.trim_end_matches(['\r', '\n']);

		if line.starts_with('@') {
			let (_, rest) = line.split_once(' ')?;
			line = rest.trim_start();
		}

		if line.is_empty() {
			return None;
		}

		let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
			let (prefix, rest) = stripped.split_once(' ')?;
			(Some(prefix.to_string()), rest)
		} else {
			(None, line)
		};

		let (params_part, trailing) = match rest.find(" :") {
			Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
			None => match rest.strip_prefix(':') {
				Some(t) => ("", Some(t)),
				None => (rest, None),
			},
		};

		let mut parts = params_part.split_whitespace();
		let command = parts.next()?.to_ascii_uppercase();
		let mut params: Vec<String> = parts.map(str::to_string).collect();
		if let Some(t) = trailing {
			params.push(t.to_string());
		}

		Some(Self { prefix, command, params })
	}

	/// Nickname part of the prefix (`nick!user@host` → `nick`).
	pub fn nick(&self) -> Option<&str> {
		let prefix = self.prefix.as_deref()?;
		let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
		(!nick.is_empty()).then_some(nick)
	}

	pub fn param(&self, idx: usize) -> Option<&str> {
		self.params.get(idx).map(String::as_str)
	}
}

fn role_for_mode(mode: char) -> Option<ChannelRole> {
	match mode {
		'o' => Some(ChannelRole::Operator),
		'a' => Some(ChannelRole::Admin),
		'q' => Some(ChannelRole::Owner),
		_ => None,
	}
}

/// Modes that consume a nick argument in a channel `MODE` line.
fn mode_takes_nick(mode: char) -> bool {
	matches!(mode, 'o' | 'a' | 'q' | 'h' | 'v')
}

/// Decode role grants from `MODE <channel> <modes> [<nick>...]` params.
pub fn decode_role_changes(params: &[String]) -> Vec<(String, ChannelRole, bool)> {
	let mut out = Vec::new();
	let Some(modes) = params.get(1) else {
		return out;
	};

	let mut args = params.iter().skip(2);
	let mut granted = true;
	for mode in modes.chars() {
		match mode {
			'+' => granted = true,
			'-' => granted = false,
			m if mode_takes_nick(m) => {
				let Some(nick) = args.next() else {
					break;
				};
				if let Some(role) = role_for_mode(m) {
					out.push((nick.clone(), role, granted));
				}
			}
			_ => {}
		}
	}

	out
}

/// Decode a NAMES reply entry list (`@op +voice nick`).
pub fn decode_names(names: &str) -> Vec<(String, Roles)> {
	names
		.split_whitespace()
		.filter_map(|entry| {
			let nick_start = entry.find(|c| !matches!(c, '~' | '&' | '@' | '%' | '+'))?;
			let (prefixes, nick) = entry.split_at(nick_start);
			Some((nick.to_string(), Roles::from_prefixes(prefixes)))
		})
		.collect()
}
