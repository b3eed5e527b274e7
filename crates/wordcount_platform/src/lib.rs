#![forbid(unsafe_code)]

pub mod irc;
pub mod membership;

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;
use wordcount_domain::ChannelName;

pub use membership::{ChannelRoster, Membership, Roles};

/// Bot → transport control message.
#[derive(Debug)]
pub enum TransportControl {
	/// Join a channel.
	Join {
		channel: ChannelName,
	},

	/// Part a channel.
	Part {
		channel: ChannelName,
	},

	/// Write already framed protocol lines.
	SendLines {
		channel: ChannelName,
		lines: Vec<Bytes>,
	},

	/// Request a graceful shutdown.
	Shutdown,
}

/// Channel standing that grants command privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
	Operator,
	Admin,
	Owner,
}

/// Transport → bot event message.
#[derive(Debug, Clone)]
pub enum TransportEvent {
	/// Registration finished; `nickname` is the identity the server accepted.
	Connected {
		nickname: String,
	},

	/// A chat message addressed to a channel.
	Message(InboundMessage),

	/// Someone (possibly the bot) joined a channel.
	Joined {
		channel: ChannelName,
		nick: String,
	},

	/// Someone (possibly the bot) left a channel.
	Parted {
		channel: ChannelName,
		nick: String,
	},

	/// A channel role was granted or revoked.
	RoleChanged {
		channel: ChannelName,
		nick: String,
		role: ChannelRole,
		granted: bool,
	},

	/// Member list snapshot chunk with role prefixes already decoded.
	Names {
		channel: ChannelName,
		members: Vec<(String, Roles)>,
	},

	/// Connection status update.
	Status(TransportStatus),
}

/// Inbound channel message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
	pub channel: ChannelName,
	pub author: String,
	pub text: String,
	pub received_at: SystemTime,
}

impl InboundMessage {
	pub fn new(channel: ChannelName, author: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			channel,
			author: author.into(),
			text: text.into(),
			received_at: SystemTime::now(),
		}
	}
}

/// Transport status event.
#[derive(Debug, Clone)]
pub struct TransportStatus {
	pub transport: &'static str,
	pub connected: bool,
	pub detail: String,
	pub last_error: Option<String>,
	pub time: SystemTime,
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

/// Helper types for wiring transports.
pub type TransportControlTx = mpsc::Sender<TransportControl>;
pub type TransportControlRx = mpsc::Receiver<TransportControl>;
pub type TransportEventTx = mpsc::Sender<TransportEvent>;
pub type TransportEventRx = mpsc::Receiver<TransportEvent>;

/// Trait representing a runnable chat transport.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync + 'static {
	/// Short transport name for logs.
	fn name(&self) -> &'static str;

	/// Run the transport until shutdown or fatal error.
	async fn run(self: Box<Self>, control_rx: TransportControlRx, events_tx: TransportEventTx) -> anyhow::Result<()>;
}

/// Build a standard bounded channel pair.
pub fn bounded_transport_channels(
	control_capacity: usize,
	events_capacity: usize,
) -> (TransportControlTx, TransportControlRx, TransportEventTx, TransportEventRx) {
	let (control_tx, control_rx) = mpsc::channel(control_capacity);
	let (events_tx, events_rx) = mpsc::channel(events_capacity);
	(control_tx, control_rx, events_tx, events_rx)
}

/// Build a status event.
pub fn status(transport: &'static str, connected: bool, detail: impl Into<String>) -> TransportEvent {
	TransportEvent::Status(TransportStatus {
		transport,
		connected,
		detail: detail.into(),
		last_error: None,
		time: SystemTime::now(),
	})
}

/// Build an error status event.
pub fn status_error(transport: &'static str, detail: impl Into<String>, err: impl fmt::Display) -> TransportEvent {
	TransportEvent::Status(TransportStatus {
		transport,
		connected: false,
		detail: detail.into(),
		last_error: Some(err.to_string()),
		time: SystemTime::now(),
	})
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}
