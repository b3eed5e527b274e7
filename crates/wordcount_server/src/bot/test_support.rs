#![forbid(unsafe_code)]

use wordcount_domain::ChannelName;
use wordcount_platform::{ChannelRole, InboundMessage, TransportControl, TransportEvent};
use wordcount_protocol::line_payload;

use super::runtime::{Bot, Outbound};
use crate::config::BotSettings;

pub const NOW: i64 = 1_700_000_000;
pub const BOT_NICK: &str = "countbot";

pub fn ch(name: &str) -> ChannelName {
	ChannelName::new(name).expect("valid channel")
}

/// Home `#home`, one extra channel `#chan`, global admin `admin`.
pub fn settings() -> BotSettings {
	let mut settings = BotSettings {
		home_channel: Some(ch("#home")),
		max_message_bytes: None,
		..BotSettings::default()
	};
	settings.set_join_channels([ch("#chan")]);
	settings.admins.insert("admin".to_string());
	settings
}

pub fn connect(bot: &mut Bot, channels: &[&str]) {
	bot.handle_event(
		TransportEvent::Connected {
			nickname: BOT_NICK.to_string(),
		},
		NOW,
	);
	for channel in channels {
		bot.handle_event(
			TransportEvent::Joined {
				channel: ch(channel),
				nick: BOT_NICK.to_string(),
			},
			NOW,
		);
	}
	bot.take_outbox();
}

/// A bot that is connected and sits in `#home` and `#chan`.
pub fn connected_bot() -> Bot {
	let mut bot = Bot::new(settings());
	connect(&mut bot, &["#home", "#chan"]);
	bot
}

pub fn say_at(bot: &mut Bot, channel: &str, author: &str, text: &str, now: i64) {
	bot.handle_event(TransportEvent::Message(InboundMessage::new(ch(channel), author, text)), now);
}

pub fn say(bot: &mut Bot, channel: &str, author: &str, text: &str) {
	say_at(bot, channel, author, text, NOW);
}

pub fn grant_op(bot: &mut Bot, channel: &str, nick: &str) {
	bot.handle_event(
		TransportEvent::RoleChanged {
			channel: ch(channel),
			nick: nick.to_string(),
			role: ChannelRole::Operator,
			granted: true,
		},
		NOW,
	);
}

/// Channel and text of a `SendLines` control.
pub fn sent_text(control: &TransportControl) -> Option<(ChannelName, String)> {
	let TransportControl::SendLines { channel, lines } = control else {
		return None;
	};
	let text = lines
		.iter()
		.filter_map(|line| line_payload(channel, line))
		.collect::<Vec<_>>()
		.join("\n");
	Some((channel.clone(), text))
}

fn control_of(item: &Outbound) -> &TransportControl {
	match item {
		Outbound::Now(control) | Outbound::Delayed { control, .. } => control,
	}
}

/// Drain the outbox into `(channel, text)` pairs of the messages sent.
pub fn sent(bot: &mut Bot) -> Vec<(ChannelName, String)> {
	bot.take_outbox()
		.iter()
		.filter_map(|item| sent_text(control_of(item)))
		.collect()
}

/// Drain the outbox into message texts, ignoring their channel.
pub fn replies(bot: &mut Bot) -> Vec<String> {
	sent(bot).into_iter().map(|(_, text)| text).collect()
}
