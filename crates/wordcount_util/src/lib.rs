#![forbid(unsafe_code)]

pub mod endpoint {
	/// Default plain-text IRC port.
	pub const DEFAULT_IRC_PORT: u16 = 6667;

	/// Parsed `host:port` (optionally `irc://host:port`) server address.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct ServerEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl ServerEndpoint {
		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Parse a server address; the port defaults to 6667 when omitted.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected host:port)".to_string());
			}

			let rest = s.strip_prefix("irc://").unwrap_or(s);

			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(format!("invalid endpoint (expected host:port without path/query/fragment): {s}"));
			}

			let (host, port) = if rest.starts_with('[') {
				let end = rest
					.find(']')
					.ok_or_else(|| format!("invalid endpoint host (unterminated IPv6 bracket): {s}"))?;
				let host = &rest[..=end];
				let port = match rest[end + 1..].strip_prefix(':') {
					Some(p) => parse_port(p, s)?,
					None if rest.len() == end + 1 => DEFAULT_IRC_PORT,
					None => return Err(format!("invalid endpoint (expected [ipv6]:port): {s}")),
				};
				(host, port)
			} else {
				match rest.rsplit_once(':') {
					Some((host, _)) if host.contains(':') => {
						return Err(format!(
							"invalid endpoint host (IPv6 must be bracketed like [::1]:6667): {s}"
						));
					}
					Some((host, port)) => (host, parse_port(port, s)?),
					None => (rest, DEFAULT_IRC_PORT),
				}
			};

			let host = host.trim();
			if host.is_empty() || host == "[]" {
				return Err(format!("invalid endpoint host (expected host:port): {s}"));
			}

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	fn parse_port(port: &str, original: &str) -> Result<u16, String> {
		let port: u16 = port
			.trim()
			.parse()
			.map_err(|_| format!("invalid endpoint port (expected 1..=65535): {original}"))?;

		if port == 0 {
			return Err(format!("invalid endpoint port (expected 1..=65535): {original}"));
		}

		Ok(port)
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_dns_hostname() {
			let e = ServerEndpoint::parse("irc.twitch.tv:6667").unwrap();
			assert_eq!(e.host, "irc.twitch.tv");
			assert_eq!(e.port, 6667);
			assert_eq!(e.hostport(), "irc.twitch.tv:6667");
		}

		#[test]
		fn accepts_scheme_and_default_port() {
			let e = ServerEndpoint::parse("irc://irc.example.org").unwrap();
			assert_eq!(e.host, "irc.example.org");
			assert_eq!(e.port, DEFAULT_IRC_PORT);
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = ServerEndpoint::parse("[::1]:6697").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.port, 6697);

			let e = ServerEndpoint::parse("[::1]").unwrap();
			assert_eq!(e.port, DEFAULT_IRC_PORT);
		}

		#[test]
		fn rejects_unbracketed_ipv6() {
			let err = ServerEndpoint::parse("::1:6667").unwrap_err();
			assert!(err.to_lowercase().contains("ipv6"));
		}

		#[test]
		fn rejects_path_and_bad_port() {
			assert!(ServerEndpoint::parse("irc.example.org:6667/").is_err());
			assert!(ServerEndpoint::parse("irc.example.org:0").is_err());
			assert!(ServerEndpoint::parse("irc.example.org:http").is_err());
			assert!(ServerEndpoint::parse(":6667").is_err());
			assert!(ServerEndpoint::parse("").is_err());
		}
	}
}
