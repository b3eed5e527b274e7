#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use wordcount_domain::{ChannelName, CountEvent, ParseIdError};

use super::counting::{ChannelDefaults, ChannelState};

/// The only state format understood.
pub const STATE_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum StateError {
	#[error("read state file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("parse state file: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("unsupported state version: {0}")]
	UnsupportedVersion(String),

	#[error("illegal default period: {0}")]
	IllegalDefaultPeriod(i64),

	#[error("illegal gcinterval: {0}")]
	IllegalGcInterval(i64),

	#[error("illegal period for channel {channel}: {period}")]
	IllegalPeriod { channel: String, period: i64 },

	#[error("illegal result limit for {scope}: 0")]
	IllegalResultLimit { scope: String },

	#[error("channel {name:?} appears more than once in channel_data")]
	DuplicateChannel { name: String },

	#[error("illegal channel name {name:?}: {source}")]
	IllegalChannel {
		name: String,
		#[source]
		source: ParseIdError,
	},

	#[error("illegal counts-row for channel {channel}: {row}")]
	IllegalRow { channel: String, row: String },

	#[error("counts for channel {channel} go back in time at row {index}")]
	OutOfOrder { channel: String, index: usize },
}

/// On-disk state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
	pub version: String,
	#[serde(default)]
	pub channels: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_period: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gcinterval: Option<i64>,
	#[serde(default)]
	pub default_minint: Option<i64>,
	#[serde(default)]
	pub default_maxint: Option<i64>,
	#[serde(default)]
	pub default_result_limit: Option<usize>,
	#[serde(default)]
	pub channel_data: BTreeMap<String, PersistedChannel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedChannel {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub period: Option<i64>,
	#[serde(default)]
	pub minint: Option<i64>,
	#[serde(default)]
	pub maxint: Option<i64>,
	#[serde(default)]
	pub result_limit: Option<usize>,
	/// `[user, word, timestamp]` rows, oldest first.
	#[serde(default)]
	pub counts: Vec<Value>,
}

impl PersistedChannel {
	pub fn from_state(state: &ChannelState) -> Self {
		Self {
			period: Some(state.period),
			minint: state.min_int,
			maxint: state.max_int,
			result_limit: state.result_limit,
			counts: state
				.events()
				.map(|e| serde_json::json!([e.user, e.word, e.timestamp]))
				.collect(),
		}
	}
}

/// State that passed validation and can be applied as a whole.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
	pub channels: Vec<ChannelName>,
	pub default_period: Option<i64>,
	pub gc_interval: Option<i64>,
	pub default_min_int: Option<i64>,
	pub default_max_int: Option<i64>,
	pub default_result_limit: Option<usize>,
	pub channel_data: Vec<(ChannelName, ChannelState)>,
}

fn channel_name(name: &str) -> Result<ChannelName, StateError> {
	ChannelName::new(name).map_err(|source| StateError::IllegalChannel {
		name: name.to_string(),
		source,
	})
}

fn parse_row(channel: &str, row: &Value) -> Result<CountEvent, StateError> {
	let illegal = || StateError::IllegalRow {
		channel: channel.to_string(),
		row: row.to_string(),
	};

	let fields = row.as_array().filter(|f| f.len() == 3).ok_or_else(illegal)?;
	let (Some(user), Some(word), Some(timestamp)) = (fields[0].as_str(), fields[1].as_str(), fields[2].as_i64()) else {
		return Err(illegal());
	};

	let event = CountEvent::new(user, word, timestamp);
	if !event.is_valid() {
		return Err(illegal());
	}
	Ok(event)
}

impl PersistedState {
	/// Validate every field; any malformed part rejects the whole document.
	pub fn validate(self, defaults: ChannelDefaults) -> Result<LoadedState, StateError> {
		if self.version != STATE_VERSION {
			return Err(StateError::UnsupportedVersion(self.version));
		}

		if let Some(period) = self.default_period
			&& period <= 0
		{
			return Err(StateError::IllegalDefaultPeriod(period));
		}

		if let Some(interval) = self.gcinterval
			&& interval <= 0
		{
			return Err(StateError::IllegalGcInterval(interval));
		}

		if self.default_result_limit == Some(0) {
			return Err(StateError::IllegalResultLimit {
				scope: "default_result_limit".to_string(),
			});
		}

		let default_period = self.default_period.unwrap_or(defaults.period);

		let channels = self
			.channels
			.iter()
			.map(|c| channel_name(c))
			.collect::<Result<Vec<_>, _>>()?;

		let mut seen = HashSet::with_capacity(self.channel_data.len());
		let mut channel_data = Vec::with_capacity(self.channel_data.len());
		for (name, data) in &self.channel_data {
			let channel = channel_name(name)?;
			if !seen.insert(channel.clone()) {
				return Err(StateError::DuplicateChannel { name: name.clone() });
			}

			if data.result_limit == Some(0) {
				return Err(StateError::IllegalResultLimit { scope: name.clone() });
			}

			let period = data.period.unwrap_or(default_period);
			if period <= 0 {
				return Err(StateError::IllegalPeriod {
					channel: name.clone(),
					period,
				});
			}

			let mut events = Vec::with_capacity(data.counts.len());
			for (index, row) in data.counts.iter().enumerate() {
				let event = parse_row(name, row)?;
				if let Some(prev) = events.last().map(|e: &CountEvent| e.timestamp)
					&& event.timestamp < prev
				{
					return Err(StateError::OutOfOrder {
						channel: name.clone(),
						index,
					});
				}
				events.push(event);
			}

			let channel_defaults = ChannelDefaults {
				period,
				min_int: data.minint,
				max_int: data.maxint,
				result_limit: data.result_limit,
			};
			channel_data.push((channel, ChannelState::from_parts(channel_defaults, events)));
		}

		Ok(LoadedState {
			channels,
			default_period: self.default_period,
			gc_interval: self.gcinterval,
			default_min_int: self.default_minint,
			default_max_int: self.default_maxint,
			default_result_limit: self.default_result_limit,
			channel_data,
		})
	}
}

/// Read and validate the state file; `Ok(None)` when it does not exist.
pub fn load_state(path: &Path, defaults: ChannelDefaults) -> Result<Option<LoadedState>, StateError> {
	let text = match fs::read_to_string(path) {
		Ok(text) => text,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(source) => {
			return Err(StateError::Io {
				path: path.to_path_buf(),
				source,
			});
		}
	};

	info!(path = %path.display(), "loading state");
	let raw: PersistedState = serde_json::from_str(&text)?;
	raw.validate(defaults).map(Some)
}

/// Write the state atomically: a sibling temp file renamed over `path`.
pub fn save_state(path: &Path, state: &PersistedState) -> anyhow::Result<()> {
	use anyhow::Context as _;

	let json = serde_json::to_vec_pretty(state).context("serialize state")?;

	let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	tmp_name.push(".tmp");
	let tmp = path.with_file_name(tmp_name);

	fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
	fs::rename(&tmp, path).with_context(|| format!("rename {} to {}", tmp.display(), path.display()))?;

	info!(path = %path.display(), "state saved");
	Ok(())
}
