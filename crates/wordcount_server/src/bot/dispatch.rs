#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use thiserror::Error;
use wordcount_domain::ChannelName;

use super::runtime::Bot;

/// Marker that starts a command line.
pub const COMMAND_PREFIX: char = '!';

/// Errors a command reports back to its caller. `Fault` is the exception:
/// it is logged and sent to the home channel instead.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error("Not enough arguments. !{command} takes at least {min} argument(s).")]
	NotEnoughArguments { command: String, min: usize },

	#[error("Too many arguments. !{command} takes no more than {max} argument(s).")]
	TooManyArguments { command: String, max: usize },

	#[error("You don't have permissions to do that.")]
	PermissionDenied,

	#[error("Illegal {what}: {text}")]
	Illegal { what: &'static str, text: String },

	#[error("Cannot leave home channel.")]
	CannotLeaveHome,

	#[error(transparent)]
	Fault(#[from] anyhow::Error),
}

impl CommandError {
	pub fn illegal(what: &'static str, text: impl Into<String>) -> Self {
		Self::Illegal {
			what,
			text: text.into(),
		}
	}
}

/// Channel whose operators may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
	/// Anyone.
	Public,
	/// The channel the command was sent in.
	CurrentChannel,
	/// The channel named by the positional argument at this index.
	ArgumentChannel(usize),
	/// The home channel; only admins when no home channel is configured.
	HomeChannel,
}

/// Which registry tier a command lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	General,
	HomeOnly,
}

/// A resolved command invocation handed to a handler.
#[derive(Debug)]
pub struct Invocation<'a> {
	pub channel: &'a ChannelName,
	pub caller: &'a str,
	pub command: &'static str,
	pub args: &'a [&'a str],
	/// Channel resolved from an `ArgumentChannel` scope.
	pub target: Option<ChannelName>,
	pub now: i64,
}

pub type Handler = fn(&mut Bot, &Invocation<'_>) -> Result<(), CommandError>;

/// Declared signature of a command.
#[derive(Clone, Copy)]
pub struct CommandSpec {
	pub name: &'static str,
	pub min_args: usize,
	/// `None` for variadic commands.
	pub max_args: Option<usize>,
	/// Parameter names for the usage line; a variadic command's last name is
	/// the repeated one.
	pub params: &'static [&'static str],
	pub permission: PermissionScope,
	pub help: &'static [&'static str],
	pub handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommandSpec")
			.field("name", &self.name)
			.field("min_args", &self.min_args)
			.field("max_args", &self.max_args)
			.field("permission", &self.permission)
			.finish_non_exhaustive()
	}
}

impl CommandSpec {
	/// `Usage: !name <required> [optional] [repeated...]`.
	pub fn usage(&self) -> String {
		let mut usage = format!("Usage: {COMMAND_PREFIX}{}", self.name);
		for (idx, param) in self.params.iter().enumerate() {
			let variadic = self.max_args.is_none() && idx + 1 == self.params.len();
			if variadic {
				usage.push_str(&format!(" [{param}...]"));
			} else if idx < self.min_args {
				usage.push_str(&format!(" <{param}>"));
			} else {
				usage.push_str(&format!(" [{param}]"));
			}
		}
		usage
	}

	/// Validate the argument count against the declaration.
	pub fn check_arity(&self, argc: usize) -> Result<(), CommandError> {
		if let Some(max) = self.max_args
			&& argc > max
		{
			return Err(CommandError::TooManyArguments {
				command: self.name.to_string(),
				max,
			});
		}
		if argc < self.min_args {
			return Err(CommandError::NotEnoughArguments {
				command: self.name.to_string(),
				min: self.min_args,
			});
		}
		Ok(())
	}
}

/// Two-tier command table: home-only commands shadow general ones in the
/// home channel and are unreachable elsewhere.
#[derive(Debug, Default, Clone)]
pub struct CommandRegistry {
	general: BTreeMap<&'static str, CommandSpec>,
	home_only: BTreeMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, tier: Tier, spec: CommandSpec) {
		let table = match tier {
			Tier::General => &mut self.general,
			Tier::HomeOnly => &mut self.home_only,
		};
		table.insert(spec.name, spec);
	}

	pub fn resolve(&self, name: &str, in_home: bool) -> Option<CommandSpec> {
		if in_home && let Some(spec) = self.home_only.get(name) {
			return Some(*spec);
		}
		self.general.get(name).copied()
	}

	/// Command names of a tier in sorted order.
	pub fn names(&self, tier: Tier) -> impl Iterator<Item = &'static str> + '_ {
		let table = match tier {
			Tier::General => &self.general,
			Tier::HomeOnly => &self.home_only,
		};
		table.keys().copied()
	}
}

/// Split a `!name arg...` line into name and arguments; `None` for plain text
/// or a bare marker.
pub fn parse_command_line(text: &str) -> Option<(&str, Vec<&str>)> {
	let rest = text.strip_prefix(COMMAND_PREFIX)?;
	let mut parts = rest.split_whitespace();
	if rest.starts_with(char::is_whitespace) {
		return None;
	}
	let name = parts.next()?;
	Some((name, parts.collect()))
}

/// Whether a message is addressed to the dispatcher rather than counted.
pub fn is_command(text: &str) -> bool {
	text.starts_with(COMMAND_PREFIX)
}
