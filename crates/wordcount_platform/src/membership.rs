#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use wordcount_domain::ChannelName;

use crate::{ChannelRole, TransportEvent};

/// Roles a member holds in one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
	pub operator: bool,
	pub admin: bool,
	pub owner: bool,
}

impl Roles {
	/// Decode NAMES prefixes (`~` owner, `&` admin, `@` operator).
	pub fn from_prefixes(prefixes: &str) -> Self {
		let mut roles = Roles::default();
		for c in prefixes.chars() {
			match c {
				'~' => roles.owner = true,
				'&' => roles.admin = true,
				'@' => roles.operator = true,
				_ => {}
			}
		}
		roles
	}

	pub fn set(&mut self, role: ChannelRole, granted: bool) {
		match role {
			ChannelRole::Operator => self.operator = granted,
			ChannelRole::Admin => self.admin = granted,
			ChannelRole::Owner => self.owner = granted,
		}
	}

	pub fn is_privileged(&self) -> bool {
		self.operator || self.admin || self.owner
	}
}

/// Known member roles of one joined channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelRoster {
	roles: HashMap<String, Roles>,
}

impl ChannelRoster {
	pub fn roles(&self, nick: &str) -> Roles {
		self.roles.get(&nick.to_lowercase()).copied().unwrap_or_default()
	}

	pub fn is_oper(&self, nick: &str) -> bool {
		self.roles(nick).operator
	}

	pub fn is_admin(&self, nick: &str) -> bool {
		self.roles(nick).admin
	}

	pub fn is_owner(&self, nick: &str) -> bool {
		self.roles(nick).owner
	}

	/// Operator, admin or owner.
	pub fn is_privileged(&self, nick: &str) -> bool {
		self.roles(nick).is_privileged()
	}

	fn set_role(&mut self, nick: &str, role: ChannelRole, granted: bool) {
		let key = nick.to_lowercase();
		let entry = self.roles.entry(key.clone()).or_default();
		entry.set(role, granted);
		if !entry.is_privileged() {
			self.roles.remove(&key);
		}
	}

	fn set_roles(&mut self, nick: &str, roles: Roles) {
		let key = nick.to_lowercase();
		if roles.is_privileged() {
			self.roles.insert(key, roles);
		} else {
			self.roles.remove(&key);
		}
	}

	fn forget(&mut self, nick: &str) {
		self.roles.remove(&nick.to_lowercase());
	}
}

/// Channels the bot is in, with the member roles the transport reported.
#[derive(Debug, Clone, Default)]
pub struct Membership {
	own_nick: Option<String>,
	channels: BTreeMap<ChannelName, ChannelRoster>,
}

impl Membership {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn own_nick(&self) -> Option<&str> {
		self.own_nick.as_deref()
	}

	fn is_own(&self, nick: &str) -> bool {
		self.own_nick.as_deref().is_some_and(|own| own.eq_ignore_ascii_case(nick))
	}

	pub fn is_joined(&self, channel: &ChannelName) -> bool {
		self.channels.contains_key(channel)
	}

	/// Joined channels in name order.
	pub fn joined(&self) -> impl Iterator<Item = &ChannelName> {
		self.channels.keys()
	}

	pub fn channel(&self, channel: &ChannelName) -> Option<&ChannelRoster> {
		self.channels.get(channel)
	}

	/// Whether `nick` is operator, admin or owner of a joined channel.
	pub fn is_privileged(&self, channel: &ChannelName, nick: &str) -> bool {
		self.channels.get(channel).is_some_and(|c| c.is_privileged(nick))
	}

	/// Update state from a transport event.
	///
	/// Returns `Some(true)` when the bot itself joined a channel and
	/// `Some(false)` when it left one.
	pub fn apply(&mut self, event: &TransportEvent) -> Option<bool> {
		match event {
			TransportEvent::Connected { nickname } => {
				self.own_nick = Some(nickname.clone());
				self.channels.clear();
				None
			}
			TransportEvent::Joined { channel, nick } => {
				if self.is_own(nick) {
					let newly = !self.channels.contains_key(channel);
					self.channels.entry(channel.clone()).or_default();
					newly.then_some(true)
				} else {
					None
				}
			}
			TransportEvent::Parted { channel, nick } => {
				if self.is_own(nick) {
					self.channels.remove(channel).map(|_| false)
				} else {
					if let Some(roster) = self.channels.get_mut(channel) {
						roster.forget(nick);
					}
					None
				}
			}
			TransportEvent::RoleChanged {
				channel,
				nick,
				role,
				granted,
			} => {
				if let Some(roster) = self.channels.get_mut(channel) {
					roster.set_role(nick, *role, *granted);
				}
				None
			}
			TransportEvent::Names { channel, members } => {
				if let Some(roster) = self.channels.get_mut(channel) {
					for (nick, roles) in members {
						roster.set_roles(nick, *roles);
					}
				}
				None
			}
			TransportEvent::Status(status) => {
				if !status.connected && status.last_error.is_some() {
					self.channels.clear();
				}
				None
			}
			TransportEvent::Message(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ch(name: &str) -> ChannelName {
		ChannelName::new(name).expect("valid channel")
	}

	fn joined_membership() -> Membership {
		let mut m = Membership::new();
		m.apply(&TransportEvent::Connected {
			nickname: "countbot".to_string(),
		});
		assert_eq!(
			m.apply(&TransportEvent::Joined {
				channel: ch("#a"),
				nick: "countbot".to_string(),
			}),
			Some(true)
		);
		m
	}

	#[test]
	fn tracks_own_joins_and_parts() {
		let mut m = joined_membership();
		assert!(m.is_joined(&ch("#a")));

		assert_eq!(
			m.apply(&TransportEvent::Joined {
				channel: ch("#b"),
				nick: "someone".to_string(),
			}),
			None
		);
		assert!(!m.is_joined(&ch("#b")));

		assert_eq!(
			m.apply(&TransportEvent::Parted {
				channel: ch("#a"),
				nick: "CountBot".to_string(),
			}),
			Some(false)
		);
		assert!(!m.is_joined(&ch("#a")));
	}

	#[test]
	fn role_changes_grant_and_revoke_privilege() {
		let mut m = joined_membership();
		m.apply(&TransportEvent::RoleChanged {
			channel: ch("#a"),
			nick: "Mod".to_string(),
			role: ChannelRole::Operator,
			granted: true,
		});
		assert!(m.is_privileged(&ch("#a"), "mod"));
		assert!(m.channel(&ch("#a")).unwrap().is_oper("MOD"));

		m.apply(&TransportEvent::RoleChanged {
			channel: ch("#a"),
			nick: "mod".to_string(),
			role: ChannelRole::Operator,
			granted: false,
		});
		assert!(!m.is_privileged(&ch("#a"), "mod"));
	}

	#[test]
	fn names_prefixes_decode_roles() {
		let mut m = joined_membership();
		m.apply(&TransportEvent::Names {
			channel: ch("#a"),
			members: vec![
				("owner".to_string(), Roles::from_prefixes("~")),
				("admin".to_string(), Roles::from_prefixes("&")),
				("op".to_string(), Roles::from_prefixes("@+")),
				("voice".to_string(), Roles::from_prefixes("+")),
			],
		});

		let roster = m.channel(&ch("#a")).unwrap();
		assert!(roster.is_owner("owner"));
		assert!(roster.is_admin("admin"));
		assert!(roster.is_oper("op"));
		assert!(!roster.is_privileged("voice"));
	}

	#[test]
	fn roles_in_unjoined_channels_are_ignored() {
		let mut m = joined_membership();
		m.apply(&TransportEvent::RoleChanged {
			channel: ch("#elsewhere"),
			nick: "mod".to_string(),
			role: ChannelRole::Owner,
			granted: true,
		});
		assert!(!m.is_privileged(&ch("#elsewhere"), "mod"));
	}
}
