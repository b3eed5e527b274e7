#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use tracing::{info, warn};
use wordcount_domain::{ChannelName, parse_duration};
use wordcount_platform::SecretString;
use wordcount_util::endpoint::ServerEndpoint;

use crate::bot::counting::ChannelDefaults;

pub const DEFAULT_HOST: &str = "irc.twitch.tv:6667";
pub const DEFAULT_PERIOD_SECS: i64 = 5 * 60;
pub const DEFAULT_GC_INTERVAL_SECS: i64 = 10 * 60;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 512;
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// Default config path: `~/.wordcount/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".wordcount").join("config.toml"))
}

/// Load the bot config from TOML and `WORDCOUNT_*` env overrides.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<WordcountConfig> {
	let mut file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	apply_env_overrides(&mut file_cfg, |key| std::env::var(key).ok());

	WordcountConfig::from_file(file_cfg)
}

/// Fully validated process configuration.
#[derive(Debug, Clone)]
pub struct WordcountConfig {
	pub irc: IrcSettings,
	pub bot: BotSettings,
	/// State file; no persistence when unset.
	pub state_path: Option<PathBuf>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

/// Connection settings for the chat server.
#[derive(Debug, Clone)]
pub struct IrcSettings {
	pub endpoint: ServerEndpoint,
	pub nickname: String,
	pub password: Option<SecretString>,
}

/// Settings owned by the bot's event loop; some are changed at runtime by
/// privileged commands and persisted on shutdown.
#[derive(Debug, Clone)]
pub struct BotSettings {
	pub home_channel: Option<ChannelName>,
	/// Channels joined on connect, home channel excluded.
	pub join_channels: Vec<ChannelName>,
	pub default_period: i64,
	pub gc_interval: i64,
	/// Maximum outbound line length in bytes; `None` sends replies whole.
	pub max_message_bytes: Option<usize>,
	pub default_min_int: Option<i64>,
	pub default_max_int: Option<i64>,
	pub default_result_limit: Option<usize>,
	/// Lower-cased global admin nicks.
	pub admins: BTreeSet<String>,
	/// Lower-cased nicks whose messages are dropped.
	pub ignored: BTreeSet<String>,
}

impl Default for BotSettings {
	fn default() -> Self {
		Self {
			home_channel: None,
			join_channels: Vec::new(),
			default_period: DEFAULT_PERIOD_SECS,
			gc_interval: DEFAULT_GC_INTERVAL_SECS,
			max_message_bytes: Some(DEFAULT_MAX_MESSAGE_LENGTH),
			default_min_int: None,
			default_max_int: None,
			default_result_limit: Some(DEFAULT_RESULT_LIMIT),
			admins: BTreeSet::new(),
			ignored: BTreeSet::new(),
		}
	}
}

impl BotSettings {
	/// Replace the join list, keeping first-seen order and dropping the home channel.
	pub fn set_join_channels(&mut self, channels: impl IntoIterator<Item = ChannelName>) {
		let mut seen = BTreeSet::new();
		self.join_channels = channels
			.into_iter()
			.filter(|ch| Some(ch) != self.home_channel.as_ref())
			.filter(|ch| seen.insert(ch.clone()))
			.collect();
	}

	pub fn is_admin(&self, nick: &str) -> bool {
		self.admins.contains(&nick.to_lowercase())
	}

	pub fn is_ignored(&self, nick: &str) -> bool {
		self.ignored.contains(&nick.to_lowercase())
	}

	pub fn is_home(&self, channel: &ChannelName) -> bool {
		self.home_channel.as_ref() == Some(channel)
	}

	/// Values a newly tracked channel starts with.
	pub fn channel_defaults(&self) -> ChannelDefaults {
		ChannelDefaults {
			period: self.default_period,
			min_int: self.default_min_int,
			max_int: self.default_max_int,
			result_limit: self.default_result_limit,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	host: Option<String>,
	nickname: Option<String>,
	password: Option<String>,
	home_channel: Option<String>,

	default_period: Option<i64>,
	#[serde(alias = "gcinterval")]
	gc_interval: Option<i64>,
	max_message_length: Option<usize>,

	default_min_int: Option<i64>,
	default_max_int: Option<i64>,
	default_result_limit: Option<usize>,

	#[serde(default)]
	admins: Vec<String>,
	#[serde(default)]
	ignore: Vec<String>,
	#[serde(default)]
	channels: Vec<String>,

	state: Option<String>,
	metrics_bind: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
	v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn nick_set(nicks: Vec<String>) -> BTreeSet<String> {
	nicks
		.into_iter()
		.map(|n| n.trim().to_lowercase())
		.filter(|n| !n.is_empty())
		.collect()
}

impl WordcountConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let host = non_empty(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string());
		let endpoint = ServerEndpoint::parse(&host).map_err(|e| anyhow!(e)).context("config: host")?;

		let nickname = non_empty(file.nickname).ok_or_else(|| anyhow!("config: nickname is required"))?;

		let home_channel = non_empty(file.home_channel)
			.map(|name| ChannelName::new(&name).with_context(|| format!("config: home_channel {name:?}")))
			.transpose()?;

		let default_period = file.default_period.unwrap_or(DEFAULT_PERIOD_SECS);
		if default_period <= 0 {
			return Err(anyhow!("config: default_period must be positive (got {default_period})"));
		}

		let gc_interval = file.gc_interval.unwrap_or(DEFAULT_GC_INTERVAL_SECS);
		if gc_interval <= 0 {
			return Err(anyhow!("config: gc_interval must be positive (got {gc_interval})"));
		}

		if file.default_result_limit == Some(0) {
			return Err(anyhow!("config: default_result_limit must be positive"));
		}

		let max_message_bytes = match file.max_message_length.unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH) {
			0 => None,
			n => Some(n),
		};

		if let (Some(min), Some(max)) = (file.default_min_int, file.default_max_int)
			&& min > max
		{
			warn!(min, max, "config: default_min_int > default_max_int; integer counts will be empty");
		}

		let channels = file
			.channels
			.iter()
			.filter(|c| !c.trim().is_empty())
			.map(|c| ChannelName::new(c).with_context(|| format!("config: channel {c:?}")))
			.collect::<anyhow::Result<Vec<_>>>()?;

		let mut bot = BotSettings {
			home_channel,
			join_channels: Vec::new(),
			default_period,
			gc_interval,
			max_message_bytes,
			default_min_int: file.default_min_int,
			default_max_int: file.default_max_int,
			default_result_limit: file.default_result_limit.or(Some(DEFAULT_RESULT_LIMIT)),
			admins: nick_set(file.admins),
			ignored: nick_set(file.ignore),
		};
		bot.set_join_channels(channels);

		Ok(Self {
			irc: IrcSettings {
				endpoint,
				nickname,
				password: non_empty(file.password).map(SecretString::new),
			},
			bot,
			state_path: non_empty(file.state).map(PathBuf::from),
			metrics_bind: non_empty(file.metrics_bind),
		})
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn split_list(v: &str) -> Vec<String> {
	v.split(',')
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
		.collect()
}

fn apply_env_overrides(cfg: &mut FileConfig, env: impl Fn(&str) -> Option<String>) {
	let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(v) = var("WORDCOUNT_HOST") {
		cfg.host = Some(v);
		info!("config: host overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_NICKNAME") {
		cfg.nickname = Some(v);
		info!("config: nickname overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_PASSWORD") {
		cfg.password = Some(v);
		info!("config: password overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_HOME_CHANNEL") {
		cfg.home_channel = Some(v);
		info!("config: home_channel overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_DEFAULT_PERIOD") {
		match parse_duration(&v) {
			Ok(secs) => {
				cfg.default_period = Some(secs);
				info!(secs, "config: default_period overridden by env");
			}
			Err(e) => warn!(error = %e, "config: ignoring invalid WORDCOUNT_DEFAULT_PERIOD"),
		}
	}

	if let Some(v) = var("WORDCOUNT_GC_INTERVAL") {
		match parse_duration(&v) {
			Ok(secs) => {
				cfg.gc_interval = Some(secs);
				info!(secs, "config: gc_interval overridden by env");
			}
			Err(e) => warn!(error = %e, "config: ignoring invalid WORDCOUNT_GC_INTERVAL"),
		}
	}

	if let Some(v) = var("WORDCOUNT_MAX_MESSAGE_LENGTH")
		&& let Ok(len) = v.parse::<usize>()
	{
		cfg.max_message_length = Some(len);
		info!(len, "config: max_message_length overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_DEFAULT_MIN_INT")
		&& let Ok(min) = v.parse::<i64>()
	{
		cfg.default_min_int = Some(min);
		info!(min, "config: default_min_int overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_DEFAULT_MAX_INT")
		&& let Ok(max) = v.parse::<i64>()
	{
		cfg.default_max_int = Some(max);
		info!(max, "config: default_max_int overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_DEFAULT_RESULT_LIMIT")
		&& let Ok(limit) = v.parse::<usize>()
	{
		cfg.default_result_limit = Some(limit);
		info!(limit, "config: default_result_limit overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_ADMINS") {
		cfg.admins = split_list(&v);
		info!(count = cfg.admins.len(), "config: admins overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_IGNORE") {
		cfg.ignore = split_list(&v);
		info!(count = cfg.ignore.len(), "config: ignore overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_CHANNELS") {
		cfg.channels = split_list(&v);
		info!(count = cfg.channels.len(), "config: channels overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_STATE") {
		cfg.state = Some(v);
		info!("config: state overridden by env");
	}

	if let Some(v) = var("WORDCOUNT_METRICS_BIND") {
		cfg.metrics_bind = Some(v);
		info!("config: metrics_bind overridden by env");
	}
}
