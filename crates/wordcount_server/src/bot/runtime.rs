#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, error, info, warn};
use wordcount_domain::{ChannelName, tokenize};
use wordcount_platform::{
	InboundMessage, Membership, TransportControl, TransportControlTx, TransportEvent, TransportEventRx,
};
use wordcount_protocol::{encode_lines, line_payload};

use super::commands;
use super::counting::CountStore;
use super::dispatch::{CommandError, CommandRegistry, Invocation, PermissionScope, is_command, parse_command_line};
use super::state::{LoadedState, PersistedChannel, PersistedState, STATE_VERSION};
use super::sweep::SweepScheduler;
use crate::config::BotSettings;
use crate::util::time::unix_secs_now;

/// Delay before replying to a command the bot's own account sent in a channel
/// where it is not an operator.
pub const SELF_REPLY_DELAY: Duration = Duration::from_secs(1);

const RECENT_OUTBOUND_CAPACITY: usize = 64;

/// Transport work produced while handling an event.
#[derive(Debug)]
pub enum Outbound {
	Now(TransportControl),
	Delayed { after: Duration, control: TransportControl },
}

/// All bot state. Owned by the event loop; never shared.
pub struct Bot {
	pub(super) settings: BotSettings,
	pub(super) store: CountStore,
	pub(super) membership: Membership,
	pub(super) sweep: SweepScheduler,
	pub(super) registry: CommandRegistry,
	outbox: Vec<Outbound>,
	recent_outbound: VecDeque<(ChannelName, String)>,
	connected: bool,
}

impl Bot {
	pub fn new(settings: BotSettings) -> Self {
		let sweep = SweepScheduler::new(settings.gc_interval);
		Self {
			settings,
			store: CountStore::new(),
			membership: Membership::new(),
			sweep,
			registry: commands::registry(),
			outbox: Vec::new(),
			recent_outbound: VecDeque::with_capacity(RECENT_OUTBOUND_CAPACITY),
			connected: false,
		}
	}

	#[cfg(test)]
	pub fn settings(&self) -> &BotSettings {
		&self.settings
	}

	#[cfg(test)]
	pub fn store(&self) -> &CountStore {
		&self.store
	}

	#[cfg(test)]
	pub fn membership(&self) -> &Membership {
		&self.membership
	}

	pub fn sweep(&self) -> &SweepScheduler {
		&self.sweep
	}

	/// Take everything queued for the transport since the last call.
	pub fn take_outbox(&mut self) -> Vec<Outbound> {
		std::mem::take(&mut self.outbox)
	}

	/// Apply previously persisted state on top of the configured settings.
	pub fn restore(&mut self, state: LoadedState) {
		if let Some(period) = state.default_period {
			self.settings.default_period = period;
		}
		if let Some(interval) = state.gc_interval {
			self.settings.gc_interval = interval;
			self.sweep.set_interval(interval);
		}
		if state.default_min_int.is_some() {
			self.settings.default_min_int = state.default_min_int;
		}
		if state.default_max_int.is_some() {
			self.settings.default_max_int = state.default_max_int;
		}
		if state.default_result_limit.is_some() {
			self.settings.default_result_limit = state.default_result_limit;
		}
		if !state.channels.is_empty() {
			self.settings.set_join_channels(state.channels);
		}

		let channels = state.channel_data.len();
		for (channel, data) in state.channel_data {
			self.store.insert(channel, data);
		}
		if self.store.has_events() {
			self.sweep.arm(unix_secs_now());
		}
		info!(channels, joins = self.settings.join_channels.len(), "state restored");
	}

	/// Snapshot for the state file.
	pub fn snapshot(&self) -> PersistedState {
		let channels: Vec<String> = if self.connected {
			self.membership.joined().map(|c| c.to_string()).collect()
		} else {
			self.settings.home_channel.iter().chain(&self.settings.join_channels).map(|c| c.to_string()).collect()
		};

		PersistedState {
			version: STATE_VERSION.to_string(),
			channels,
			default_period: Some(self.settings.default_period),
			gcinterval: Some(self.sweep.interval()),
			default_minint: self.settings.default_min_int,
			default_maxint: self.settings.default_max_int,
			default_result_limit: self.settings.default_result_limit,
			channel_data: self
				.store
				.iter()
				.map(|(channel, state)| (channel.to_string(), PersistedChannel::from_state(state)))
				.collect(),
		}
	}

	pub fn handle_event(&mut self, event: TransportEvent, now: i64) {
		let own_change = self.membership.apply(&event);

		match event {
			TransportEvent::Connected { nickname } => {
				info!(%nickname, "connected; joining channels");
				self.connected = true;
				let joins: Vec<ChannelName> = self
					.settings
					.home_channel
					.iter()
					.chain(&self.settings.join_channels)
					.cloned()
					.collect();
				for channel in joins {
					self.push(TransportControl::Join { channel });
				}
			}
			TransportEvent::Joined { channel, .. } if own_change == Some(true) => {
				info!(%channel, "joined channel");
				let report_to = self.settings.home_channel.clone().unwrap_or_else(|| channel.clone());
				self.say(&report_to, &format!("Joined to {channel}."));
			}
			TransportEvent::Parted { channel, .. } if own_change == Some(false) => {
				info!(%channel, "parted channel");
				self.store.remove(&channel);
				if let Some(home) = self.settings.home_channel.clone() {
					self.say(&home, &format!("Parted from {channel}."));
				}
			}
			TransportEvent::Message(msg) => self.handle_message(msg, now),
			TransportEvent::Status(status) => {
				if !status.connected {
					self.connected = false;
				}
				match &status.last_error {
					Some(err) => warn!(transport = status.transport, detail = %status.detail, error = %err, "transport status"),
					None => debug!(transport = status.transport, connected = status.connected, detail = %status.detail, "transport status"),
				}
			}
			_ => {}
		}
	}

	fn is_own_nick(&self, nick: &str) -> bool {
		self.membership.own_nick().is_some_and(|own| own.eq_ignore_ascii_case(nick))
	}

	/// Drop an inbound copy of something the bot itself just sent.
	fn is_echo(&mut self, msg: &InboundMessage) -> bool {
		if !self.is_own_nick(&msg.author) {
			return false;
		}
		let pos = self
			.recent_outbound
			.iter()
			.position(|(ch, text)| *ch == msg.channel && *text == msg.text);
		match pos {
			Some(pos) => {
				self.recent_outbound.remove(pos);
				true
			}
			None => false,
		}
	}

	pub fn handle_message(&mut self, msg: InboundMessage, now: i64) {
		if self.settings.is_ignored(&msg.author) {
			debug!(author = %msg.author, "dropping message from ignored user");
			return;
		}

		if self.is_echo(&msg) {
			debug!(channel = %msg.channel, "dropping echo of own reply");
			return;
		}

		if is_command(&msg.text) {
			self.dispatch(&msg.channel, &msg.author, &msg.text, now);
			return;
		}

		let defaults = self.settings.channel_defaults();
		let mut recorded = 0u64;
		for word in tokenize(&msg.text) {
			if self.store.record(&msg.channel, defaults, &msg.author, word, now) {
				recorded += 1;
			}
		}

		if recorded > 0 {
			metrics::counter!("wordcount_events_recorded_total").increment(recorded);
			self.sweep.arm(now);
		}
	}

	/// Whether `caller` is a global admin or privileged in `channel`.
	pub fn is_allowed(&self, caller: &str, channel: Option<&ChannelName>) -> bool {
		if self.settings.is_admin(caller) {
			return true;
		}
		channel.is_some_and(|ch| self.membership.is_privileged(ch, caller))
	}

	/// Resolve, validate and run one command line.
	pub fn dispatch(&mut self, channel: &ChannelName, caller: &str, text: &str, now: i64) {
		let Some((name, args)) = parse_command_line(text) else {
			return;
		};

		let in_home = self.settings.is_home(channel);
		let Some(spec) = self.registry.resolve(name, in_home) else {
			debug!(%channel, command = %name, "ignoring unknown command");
			return;
		};

		metrics::counter!("wordcount_commands_total", "command" => spec.name).increment(1);

		let mut inv = Invocation {
			channel,
			caller,
			command: spec.name,
			args: &args,
			target: None,
			now,
		};

		let result = spec
			.check_arity(args.len())
			.and_then(|()| self.authorize(spec.permission, &mut inv))
			.and_then(|()| (spec.handler)(self, &inv));

		match result {
			Ok(()) => {}
			Err(CommandError::Fault(err)) => self.report_fault(&inv, &err),
			Err(err) => {
				let reply = format!("@{caller}: {err}");
				if let Err(e) = self.answer(&inv, &reply) {
					warn!(%channel, command = spec.name, error = %e, "failed to deliver command error");
				}
			}
		}
	}

	fn authorize(&self, scope: PermissionScope, inv: &mut Invocation<'_>) -> Result<(), CommandError> {
		let allowed = match scope {
			PermissionScope::Public => true,
			PermissionScope::CurrentChannel => self.is_allowed(inv.caller, Some(inv.channel)),
			PermissionScope::ArgumentChannel(idx) => {
				let raw = inv.args.get(idx).copied().unwrap_or_default();
				let target = ChannelName::new(raw).map_err(|_| CommandError::illegal("channel", raw))?;
				let allowed = self.is_allowed(inv.caller, Some(&target));
				inv.target = Some(target);
				allowed
			}
			PermissionScope::HomeChannel => self.is_allowed(inv.caller, self.settings.home_channel.as_ref()),
		};

		if allowed {
			Ok(())
		} else {
			Err(CommandError::PermissionDenied)
		}
	}

	fn report_fault(&mut self, inv: &Invocation<'_>, err: &anyhow::Error) {
		metrics::counter!("wordcount_command_failures_total", "command" => inv.command).increment(1);
		error!(
			channel = %inv.channel,
			command = inv.command,
			caller = inv.caller,
			error = %format!("{err:#}"),
			"command failed"
		);

		if let Some(home) = self.settings.home_channel.clone() {
			let text = format!(
				"Error processing command !{} in channel {} performed by {}: {err}",
				inv.command, inv.channel, inv.caller
			);
			self.say(&home, &text);
		}
	}

	/// Reply to an invocation. Replies to the bot's own account are delayed
	/// unless the bot is an operator of the channel.
	pub fn answer(&mut self, inv: &Invocation<'_>, text: &str) -> Result<(), CommandError> {
		let defer = self.is_own_nick(inv.caller)
			&& !self
				.membership
				.own_nick()
				.zip(self.membership.channel(inv.channel))
				.is_some_and(|(own, roster)| roster.is_oper(own));

		let control = self.encode(inv.channel, text).context("encode reply")?;
		if defer {
			self.outbox.push(Outbound::Delayed {
				after: SELF_REPLY_DELAY,
				control,
			});
		} else {
			self.outbox.push(Outbound::Now(control));
		}
		Ok(())
	}

	/// Send a notice that is not a reply to anyone.
	pub fn say(&mut self, channel: &ChannelName, text: &str) {
		match self.encode(channel, text) {
			Ok(control) => self.push(control),
			Err(e) => warn!(%channel, error = %e, "dropping unsendable message"),
		}
	}

	fn encode(&mut self, channel: &ChannelName, text: &str) -> anyhow::Result<TransportControl> {
		info!(%channel, message = %text, "send");
		let lines = encode_lines(channel, text, self.settings.max_message_bytes)?;

		for line in &lines {
			if let Some(chunk) = line_payload(channel, line) {
				if self.recent_outbound.len() == RECENT_OUTBOUND_CAPACITY {
					self.recent_outbound.pop_front();
				}
				self.recent_outbound.push_back((channel.clone(), chunk.to_string()));
			}
		}

		Ok(TransportControl::SendLines {
			channel: channel.clone(),
			lines,
		})
	}

	pub(super) fn push(&mut self, control: TransportControl) {
		self.outbox.push(Outbound::Now(control));
	}

	/// Trim all channels to their windows and drop channels the bot left.
	pub fn run_sweep(&mut self, now: i64) -> usize {
		let membership = &self.membership;
		let removed = self.store.sweep(now, self.connected, |ch| membership.is_joined(ch));
		self.sweep.complete(now, self.store.has_events());

		metrics::counter!("wordcount_sweep_rows_removed_total").increment(removed as u64);
		if removed == 1 {
			info!("sweep: deleted 1 row");
		} else {
			info!(rows = removed, "sweep: deleted rows");
		}
		removed
	}

	/// Run the sweep if its time has come.
	pub fn run_due_sweep(&mut self, now: i64) -> Option<usize> {
		self.sweep.is_due(now).then(|| self.run_sweep(now))
	}
}

async fn flush_outbox(bot: &mut Bot, control_tx: &TransportControlTx) {
	for item in bot.take_outbox() {
		match item {
			Outbound::Now(control) => {
				if control_tx.send(control).await.is_err() {
					warn!("transport control channel closed; dropping outbound work");
				}
			}
			Outbound::Delayed { after, control } => {
				let tx = control_tx.clone();
				tokio::spawn(async move {
					tokio::time::sleep(after).await;
					if tx.send(control).await.is_err() {
						debug!("transport gone before delayed send");
					}
				});
			}
		}
	}
}

async fn sleep_or_pending(wait: Option<Duration>) {
	match wait {
		Some(wait) => tokio::time::sleep(wait).await,
		None => std::future::pending().await,
	}
}

/// Drive the bot until `shutdown` completes or the transport goes away.
pub async fn run_event_loop<F>(
	bot: &mut Bot,
	mut events_rx: TransportEventRx,
	control_tx: TransportControlTx,
	shutdown: F,
) where
	F: Future<Output = ()>,
{
	tokio::pin!(shutdown);

	loop {
		flush_outbox(bot, &control_tx).await;
		let sweep_wait = bot.sweep().wait_time(unix_secs_now());

		tokio::select! {
			event = events_rx.recv() => {
				let Some(event) = event else {
					warn!("transport event channel closed; stopping event loop");
					break;
				};
				bot.handle_event(event, unix_secs_now());
			}

			_ = sleep_or_pending(sweep_wait) => {
				bot.run_due_sweep(unix_secs_now());
			}

			_ = &mut shutdown => {
				info!("shutdown requested");
				break;
			}
		}
	}

	flush_outbox(bot, &control_tx).await;
}
