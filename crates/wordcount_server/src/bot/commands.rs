#![forbid(unsafe_code)]

use std::fmt::Display;

use anyhow::anyhow;
use wordcount_domain::{ChannelName, format_duration, parse_duration, parse_integer_token};
use wordcount_platform::TransportControl;

use super::counting::{ChannelState, CountReport};
use super::dispatch::{COMMAND_PREFIX, CommandError, CommandRegistry, CommandSpec, Invocation, PermissionScope, Tier};
use super::runtime::Bot;

const UNBOUNDED: &str = "unbounded";
const UNLIMITED: &str = "unlimited";

const GENERAL: &[CommandSpec] = &[
	CommandSpec {
		name: "count",
		min_args: 0,
		max_args: None,
		params: &["words"],
		permission: PermissionScope::Public,
		help: &[
			"Count given words or if none given all words.",
			"Every word is only counted once per user.",
		],
		handler: cmd_count,
	},
	CommandSpec {
		name: "countint",
		min_args: 0,
		max_args: Some(2),
		params: &["min", "max"],
		permission: PermissionScope::Public,
		help: &[
			"Count integer numbers, optionally only those between min and max.",
			"Every number is only counted once per user.",
		],
		handler: cmd_countint,
	},
	CommandSpec {
		name: "count1",
		min_args: 0,
		max_args: Some(0),
		params: &[],
		permission: PermissionScope::Public,
		help: &[
			"Count all one-letter words.",
			"Every word is only counted once per user.",
		],
		handler: cmd_count1,
	},
	CommandSpec {
		name: "clearcount",
		min_args: 0,
		max_args: Some(0),
		params: &[],
		permission: PermissionScope::CurrentChannel,
		help: &["Clear all counts of this channel. Only allowed for operators etc."],
		handler: cmd_clearcount,
	},
	CommandSpec {
		name: "countperiod",
		min_args: 0,
		max_args: None,
		params: &["time"],
		permission: PermissionScope::CurrentChannel,
		help: &[
			"Get or set the period in which words are counted for this channel.",
			"The time can be given in hours, minutes or seconds, e.g.: 1h, 5min, 300sec, or 5m 30s",
		],
		handler: cmd_countperiod,
	},
	CommandSpec {
		name: "countminint",
		min_args: 0,
		max_args: Some(1),
		params: &["value"],
		permission: PermissionScope::CurrentChannel,
		help: &["Get or set the smallest integer !countint counts in this channel, or \"unbounded\"."],
		handler: cmd_countminint,
	},
	CommandSpec {
		name: "countmaxint",
		min_args: 0,
		max_args: Some(1),
		params: &["value"],
		permission: PermissionScope::CurrentChannel,
		help: &["Get or set the largest integer !countint counts in this channel, or \"unbounded\"."],
		handler: cmd_countmaxint,
	},
	CommandSpec {
		name: "countresultlimit",
		min_args: 0,
		max_args: Some(1),
		params: &["value"],
		permission: PermissionScope::CurrentChannel,
		help: &[
			"Get or set how many entries count reports show, or \"unlimited\".",
			"Operators always get the full report.",
		],
		handler: cmd_countresultlimit,
	},
	CommandSpec {
		name: "countleave",
		min_args: 0,
		max_args: Some(0),
		params: &[],
		permission: PermissionScope::CurrentChannel,
		help: &["Make the bot leave this channel. Only allowed for operators of this channel."],
		handler: cmd_countleave,
	},
];

const HOME_ONLY: &[CommandSpec] = &[
	CommandSpec {
		name: "commands",
		min_args: 0,
		max_args: Some(0),
		params: &[],
		permission: PermissionScope::Public,
		help: &["Show the list of commands."],
		handler: cmd_commands,
	},
	CommandSpec {
		name: "help",
		min_args: 0,
		max_args: Some(1),
		params: &["command"],
		permission: PermissionScope::Public,
		help: &["Show help to given command."],
		handler: cmd_help,
	},
	CommandSpec {
		name: "join",
		min_args: 1,
		max_args: Some(1),
		params: &["channel"],
		permission: PermissionScope::ArgumentChannel(0),
		help: &["Make the bot join the given channel. Only allowed for operators of the given channel."],
		handler: cmd_join,
	},
	CommandSpec {
		name: "leave",
		min_args: 1,
		max_args: Some(1),
		params: &["channel"],
		permission: PermissionScope::ArgumentChannel(0),
		help: &["Make the bot leave the given channel. Only allowed for operators of the given channel."],
		handler: cmd_leave,
	},
	CommandSpec {
		name: "gcinterval",
		min_args: 0,
		max_args: None,
		params: &["time"],
		permission: PermissionScope::HomeChannel,
		help: &["Get or set the interval of the count cleanup. Bot admins only."],
		handler: cmd_gcinterval,
	},
	CommandSpec {
		name: "channels",
		min_args: 0,
		max_args: Some(0),
		params: &[],
		permission: PermissionScope::HomeChannel,
		help: &["List all channels joined by the bot. Bot admins only."],
		handler: cmd_channels,
	},
];

/// The full command table.
pub fn registry() -> CommandRegistry {
	let mut registry = CommandRegistry::new();
	for spec in GENERAL {
		registry.register(Tier::General, *spec);
	}
	for spec in HOME_ONLY {
		registry.register(Tier::HomeOnly, *spec);
	}
	registry
}

/// Truncate for non-privileged callers and send.
fn report_counts<K: Ord + Display>(
	bot: &mut Bot,
	inv: &Invocation<'_>,
	mut report: CountReport<K>,
) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	let state = bot.store.get_or_create(inv.channel, defaults);
	let (period, limit) = (state.period, state.result_limit);

	if let Some(limit) = limit
		&& !bot.is_allowed(inv.caller, Some(inv.channel))
	{
		report.truncate(limit);
	}

	bot.answer(inv, &report.render(period))
}

fn cmd_count(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	let report = bot.store.count_words(inv.channel, defaults, inv.args, inv.now);
	report_counts(bot, inv, report)
}

fn parse_int_arg(arg: Option<&&str>) -> Result<Option<i64>, CommandError> {
	arg.map(|text| parse_integer_token(text).ok_or_else(|| CommandError::illegal("integer", *text)))
		.transpose()
}

fn cmd_countint(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let min = parse_int_arg(inv.args.first())?;
	let max = parse_int_arg(inv.args.get(1))?;

	let defaults = bot.settings.channel_defaults();
	let report = bot.store.count_integers(inv.channel, defaults, min, max, inv.now);
	report_counts(bot, inv, report)
}

fn cmd_count1(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	let report = bot.store.count_single_characters(inv.channel, defaults, inv.now);
	report_counts(bot, inv, report)
}

fn cmd_clearcount(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let rows = bot.store.clear(inv.channel);
	let reply = if rows == 1 {
		"Deleted 1 row.".to_string()
	} else {
		format!("Deleted {rows} rows.")
	};
	bot.answer(inv, &reply)
}

/// Parse a positive duration from all arguments joined by spaces.
fn parse_positive_duration(args: &[&str], what: &'static str) -> Result<i64, CommandError> {
	let text = args.join(" ");
	match parse_duration(&text) {
		Ok(secs) if secs > 0 => Ok(secs),
		_ => Err(CommandError::illegal(what, text)),
	}
}

fn cmd_countperiod(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	if inv.args.is_empty() {
		let period = bot.store.get_or_create(inv.channel, defaults).period;
		return bot.answer(inv, &format!("@{}: count period = {}", inv.caller, format_duration(period)));
	}

	let period = parse_positive_duration(inv.args, "count period")?;
	bot.store.get_or_create(inv.channel, defaults).period = period;
	bot.answer(
		inv,
		&format!("@{}: changed count period to {}", inv.caller, format_duration(period)),
	)
}

fn show_bound(value: Option<i64>) -> String {
	value.map_or_else(|| UNBOUNDED.to_string(), |v| v.to_string())
}

fn parse_bound(text: &str, what: &'static str) -> Result<Option<i64>, CommandError> {
	if text.eq_ignore_ascii_case(UNBOUNDED) {
		return Ok(None);
	}
	parse_integer_token(text)
		.map(Some)
		.ok_or_else(|| CommandError::illegal(what, text))
}

/// Shared get/set flow of the per-channel integer bounds.
fn bound_command(
	bot: &mut Bot,
	inv: &Invocation<'_>,
	what: &'static str,
	field: fn(&mut ChannelState) -> &mut Option<i64>,
) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	let reply = match inv.args.first() {
		None => {
			let value = *field(bot.store.get_or_create(inv.channel, defaults));
			format!("@{}: {what} = {}", inv.caller, show_bound(value))
		}
		Some(text) => {
			let value = parse_bound(text, what)?;
			*field(bot.store.get_or_create(inv.channel, defaults)) = value;
			format!("@{}: changed {what} to {}", inv.caller, show_bound(value))
		}
	};
	bot.answer(inv, &reply)
}

fn min_int_of(state: &mut ChannelState) -> &mut Option<i64> {
	&mut state.min_int
}

fn max_int_of(state: &mut ChannelState) -> &mut Option<i64> {
	&mut state.max_int
}

fn cmd_countminint(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	bound_command(bot, inv, "minint", min_int_of)
}

fn cmd_countmaxint(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	bound_command(bot, inv, "maxint", max_int_of)
}

fn show_limit(value: Option<usize>) -> String {
	value.map_or_else(|| UNLIMITED.to_string(), |v| v.to_string())
}

fn cmd_countresultlimit(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let defaults = bot.settings.channel_defaults();
	let reply = match inv.args.first() {
		None => {
			let limit = bot.store.get_or_create(inv.channel, defaults).result_limit;
			format!("@{}: result limit = {}", inv.caller, show_limit(limit))
		}
		Some(text) => {
			let limit = if text.eq_ignore_ascii_case(UNLIMITED) {
				None
			} else {
				match text.parse::<usize>() {
					Ok(n) if n > 0 => Some(n),
					_ => return Err(CommandError::illegal("result limit", *text)),
				}
			};
			bot.store.get_or_create(inv.channel, defaults).result_limit = limit;
			format!("@{}: changed result limit to {}", inv.caller, show_limit(limit))
		}
	};
	bot.answer(inv, &reply)
}

fn leave_channel(bot: &mut Bot, channel: ChannelName) -> Result<(), CommandError> {
	if bot.settings.is_home(&channel) {
		return Err(CommandError::CannotLeaveHome);
	}
	bot.push(TransportControl::Part { channel });
	Ok(())
}

fn cmd_countleave(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	leave_channel(bot, inv.channel.clone())
}

fn target_channel(inv: &Invocation<'_>) -> Result<ChannelName, CommandError> {
	inv.target
		.clone()
		.ok_or_else(|| CommandError::Fault(anyhow!("!{} ran without a resolved target channel", inv.command)))
}

fn cmd_commands(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let list = |tier| {
		bot.registry
			.names(tier)
			.map(|name| format!("{COMMAND_PREFIX}{name}"))
			.collect::<Vec<_>>()
			.join(", ")
	};

	let mut reply = format!("@{}: Commands: {}", inv.caller, list(Tier::General));
	if let Some(home) = &bot.settings.home_channel {
		reply.push_str(&format!(" {home}-only commands: {}", list(Tier::HomeOnly)));
	}
	bot.answer(inv, &reply)
}

fn cmd_help(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let Some(command) = inv.args.first() else {
		return bot.answer(
			inv,
			&format!(
				"@{}: type !commands for a list of commands or !help <command> for help to !command.",
				inv.caller
			),
		);
	};

	let name = command.strip_prefix(COMMAND_PREFIX).unwrap_or(command);
	let in_home = bot.settings.is_home(inv.channel);
	let Some(spec) = bot.registry.resolve(name, in_home) else {
		return bot.answer(inv, &format!("@{}: No such command !{name}", inv.caller));
	};

	bot.answer(inv, &spec.usage())?;
	for line in spec.help {
		bot.answer(inv, line)?;
	}
	Ok(())
}

fn cmd_join(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let channel = target_channel(inv)?;
	bot.push(TransportControl::Join { channel });
	Ok(())
}

fn cmd_leave(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	leave_channel(bot, target_channel(inv)?)
}

fn cmd_gcinterval(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	if inv.args.is_empty() {
		let interval = bot.sweep.interval();
		return bot.answer(inv, &format!("@{}: gcinterval = {}", inv.caller, format_duration(interval)));
	}

	let interval = parse_positive_duration(inv.args, "gcinterval")?;
	bot.settings.gc_interval = interval;
	bot.sweep.set_interval(interval);
	bot.answer(
		inv,
		&format!("@{}: gcinterval changed to {}", inv.caller, format_duration(interval)),
	)
}

fn cmd_channels(bot: &mut Bot, inv: &Invocation<'_>) -> Result<(), CommandError> {
	let channels = bot
		.membership
		.joined()
		.map(ChannelName::as_str)
		.collect::<Vec<_>>()
		.join(", ");
	bot.answer(inv, &format!("Joined channels: {channels}"))
}
