#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, info, trace, warn};
use wordcount_domain::ChannelName;
use wordcount_util::endpoint::ServerEndpoint;

use super::line::{IrcLine, decode_names, decode_role_changes};
use crate::{
	ChatTransport, InboundMessage, SecretString, TransportControl, TransportControlRx, TransportEvent, TransportEventTx,
	new_session_id, status, status_error,
};

/// Transport name used in status events and logs.
pub const IRC_TRANSPORT: &str = "irc";

/// Capability that makes Twitch send JOIN/PART/MODE/NAMES.
pub const TWITCH_MEMBERSHIP_CAP: &str = "twitch.tv/membership";

/// IRC transport configuration.
#[derive(Debug, Clone)]
pub struct IrcConfig {
	pub endpoint: ServerEndpoint,
	pub nickname: String,
	pub password: Option<SecretString>,
	pub request_membership: bool,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
}

impl IrcConfig {
	pub fn new(endpoint: ServerEndpoint, nickname: impl Into<String>) -> Self {
		Self {
			endpoint,
			nickname: nickname.into(),
			password: None,
			request_membership: true,
			reconnect_min_delay: Duration::from_secs(1),
			reconnect_max_delay: Duration::from_secs(60),
		}
	}
}

/// Plain-TCP IRC transport (Twitch chat compatible).
pub struct IrcAdapter {
	cfg: IrcConfig,
}

enum SessionEnd {
	Shutdown,
	Disconnected(anyhow::Error),
}

impl IrcAdapter {
	pub fn new(cfg: IrcConfig) -> Self {
		Self { cfg }
	}

	async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> anyhow::Result<()> {
		let data = format!("{line}\r\n");
		writer.write_all(data.as_bytes()).await.context("write line")?;
		writer.flush().await.context("flush")?;
		Ok(())
	}

	async fn emit(events_tx: &TransportEventTx, event: TransportEvent) -> anyhow::Result<()> {
		events_tx
			.send(event)
			.await
			.map_err(|_| anyhow!("transport event channel closed"))
	}

	async fn register(&self, writer: &mut OwnedWriteHalf) -> anyhow::Result<()> {
		if let Some(password) = &self.cfg.password {
			Self::write_line(writer, &format!("PASS {}", password.expose())).await?;
		}
		Self::write_line(writer, &format!("NICK {}", self.cfg.nickname)).await?;
		Self::write_line(writer, &format!("USER {} 0 * :{}", self.cfg.nickname, self.cfg.nickname)).await?;
		Ok(())
	}

	async fn handle_line(
		&self,
		raw: &str,
		writer: &mut OwnedWriteHalf,
		events_tx: &TransportEventTx,
	) -> anyhow::Result<()> {
		let Some(line) = IrcLine::parse(raw) else {
			return Ok(());
		};

		match line.command.as_str() {
			"PING" => {
				let token = line.param(0).unwrap_or_default();
				Self::write_line(writer, &format!("PONG :{token}")).await?;
			}
			"001" => {
				let nickname = line.param(0).unwrap_or(&self.cfg.nickname).to_string();
				info!(%nickname, "irc transport registered");
				if self.cfg.request_membership {
					Self::write_line(writer, &format!("CAP REQ :{TWITCH_MEMBERSHIP_CAP}")).await?;
				}
				Self::emit(events_tx, TransportEvent::Connected { nickname }).await?;
			}
			"433" => {
				warn!(nickname = %self.cfg.nickname, "irc: nickname in use");
				Self::emit(
					events_tx,
					status_error(IRC_TRANSPORT, "nickname in use", &self.cfg.nickname),
				)
				.await?;
			}
			"ERROR" => {
				let detail = line.params.join(" ");
				warn!(error = %detail, "irc: server error");
				Self::emit(events_tx, status_error(IRC_TRANSPORT, "server error", detail)).await?;
			}
			"PRIVMSG" => {
				let (Some(nick), Some(target), Some(text)) = (line.nick(), line.param(0), line.param(1)) else {
					return Ok(());
				};
				if !target.starts_with('#') {
					debug!(from = %nick, "irc: ignoring private message");
					return Ok(());
				}
				let Ok(channel) = ChannelName::new(target) else {
					return Ok(());
				};
				Self::emit(
					events_tx,
					TransportEvent::Message(InboundMessage::new(channel, nick, text)),
				)
				.await?;
			}
			"JOIN" | "PART" => {
				let (Some(nick), Some(target)) = (line.nick(), line.param(0)) else {
					return Ok(());
				};
				let Ok(channel) = ChannelName::new(target) else {
					return Ok(());
				};
				let nick = nick.to_string();
				let event = if line.command == "JOIN" {
					TransportEvent::Joined { channel, nick }
				} else {
					TransportEvent::Parted { channel, nick }
				};
				Self::emit(events_tx, event).await?;
			}
			"KICK" => {
				let (Some(target), Some(victim)) = (line.param(0), line.param(1)) else {
					return Ok(());
				};
				let Ok(channel) = ChannelName::new(target) else {
					return Ok(());
				};
				Self::emit(
					events_tx,
					TransportEvent::Parted {
						channel,
						nick: victim.to_string(),
					},
				)
				.await?;
			}
			"MODE" => {
				let Some(Ok(channel)) = line.param(0).filter(|t| t.starts_with('#')).map(ChannelName::new) else {
					return Ok(());
				};
				for (nick, role, granted) in decode_role_changes(&line.params) {
					Self::emit(
						events_tx,
						TransportEvent::RoleChanged {
							channel: channel.clone(),
							nick,
							role,
							granted,
						},
					)
					.await?;
				}
			}
			"353" => {
				let (Some(target), Some(names)) = (line.param(2), line.param(3)) else {
					return Ok(());
				};
				let Ok(channel) = ChannelName::new(target) else {
					return Ok(());
				};
				Self::emit(
					events_tx,
					TransportEvent::Names {
						channel,
						members: decode_names(names),
					},
				)
				.await?;
			}
			other => {
				trace!(command = %other, "irc: unhandled command");
			}
		}

		Ok(())
	}

	async fn handle_control(&self, cmd: TransportControl, writer: &mut OwnedWriteHalf) -> anyhow::Result<bool> {
		match cmd {
			TransportControl::Join { channel } => {
				debug!(%channel, "irc: joining");
				Self::write_line(writer, &format!("JOIN {channel}")).await?;
			}
			TransportControl::Part { channel } => {
				debug!(%channel, "irc: parting");
				Self::write_line(writer, &format!("PART {channel}")).await?;
			}
			TransportControl::SendLines { channel, lines } => {
				for line in &lines {
					writer.write_all(line).await.context("write chat line")?;
				}
				writer.flush().await.context("flush")?;
				metrics::counter!("wordcount_lines_sent_total").increment(lines.len() as u64);
				trace!(%channel, lines = lines.len(), "irc: sent chat lines");
			}
			TransportControl::Shutdown => {
				info!("irc transport received Shutdown");
				let _ = Self::write_line(writer, "QUIT :shutting down").await;
				return Ok(false);
			}
		}
		Ok(true)
	}

	async fn run_session(
		&self,
		stream: TcpStream,
		control_rx: &mut TransportControlRx,
		events_tx: &TransportEventTx,
	) -> SessionEnd {
		let (reader, mut writer) = stream.into_split();
		let mut reader = BufReader::new(reader);

		if let Err(e) = self.register(&mut writer).await {
			return SessionEnd::Disconnected(e);
		}

		let mut buf = Vec::with_capacity(1024);
		loop {
			tokio::select! {
				read = reader.read_until(b'\n', &mut buf) => {
					match read {
						Ok(0) => return SessionEnd::Disconnected(anyhow!("connection closed by server")),
						Ok(_) => {
							let raw = String::from_utf8_lossy(&buf).into_owned();
							buf.clear();
							if let Err(e) = self.handle_line(&raw, &mut writer, events_tx).await {
								return SessionEnd::Disconnected(e);
							}
						}
						Err(e) => return SessionEnd::Disconnected(anyhow!(e).context("read from server")),
					}
				}

				cmd = control_rx.recv() => {
					let Some(cmd) = cmd else {
						info!("irc transport control channel closed; shutting down");
						return SessionEnd::Shutdown;
					};
					match self.handle_control(cmd, &mut writer).await {
						Ok(true) => {}
						Ok(false) => return SessionEnd::Shutdown,
						Err(e) => return SessionEnd::Disconnected(e),
					}
				}
			}
		}
	}

	/// Sleep before reconnecting; returns `false` when shutdown was requested.
	async fn wait_before_reconnect(&self, delay: Duration, control_rx: &mut TransportControlRx) -> bool {
		let sleep = tokio::time::sleep(delay);
		tokio::pin!(sleep);

		loop {
			tokio::select! {
				_ = &mut sleep => return true,
				cmd = control_rx.recv() => match cmd {
					None | Some(TransportControl::Shutdown) => return false,
					Some(TransportControl::SendLines { channel, lines }) => {
						warn!(%channel, lines = lines.len(), "irc transport offline; dropping outbound lines");
					}
					Some(other) => {
						debug!(?other, "irc transport offline; ignoring control");
					}
				}
			}
		}
	}
}

#[async_trait]
impl ChatTransport for IrcAdapter {
	fn name(&self) -> &'static str {
		IRC_TRANSPORT
	}

	async fn run(self: Box<Self>, mut control_rx: TransportControlRx, events_tx: TransportEventTx) -> anyhow::Result<()> {
		let session_id = new_session_id();
		let addr = self.cfg.endpoint.hostport();
		let mut delay = self.cfg.reconnect_min_delay;

		loop {
			info!(%addr, nickname = %self.cfg.nickname, %session_id, "irc transport connecting");

			match TcpStream::connect(&addr).await {
				Ok(stream) => {
					let _ = events_tx.try_send(status(IRC_TRANSPORT, true, format!("connected to {addr}")));
					match self.run_session(stream, &mut control_rx, &events_tx).await {
						SessionEnd::Shutdown => break,
						SessionEnd::Disconnected(e) => {
							warn!(%addr, error = %e, "irc transport disconnected");
							let _ = events_tx.try_send(status_error(IRC_TRANSPORT, "disconnected", &e));
							delay = self.cfg.reconnect_min_delay;
						}
					}
				}
				Err(e) => {
					warn!(%addr, error = %e, "irc transport connect failed");
					let _ = events_tx.try_send(status_error(IRC_TRANSPORT, "connect failed", &e));
				}
			}

			if events_tx.is_closed() {
				info!("irc transport event channel closed; shutting down");
				break;
			}

			debug!(delay_ms = delay.as_millis(), "irc transport reconnect backoff");
			if !self.wait_before_reconnect(delay, &mut control_rx).await {
				break;
			}
			delay = (delay * 2).min(self.cfg.reconnect_max_delay);
		}

		let _ = events_tx.try_send(status(IRC_TRANSPORT, false, "irc transport offline"));
		Ok(())
	}
}
